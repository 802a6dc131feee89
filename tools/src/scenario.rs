use character_collision::CharacterBodyProfile;
use character_motor_rigid::{MovementConfig, SurfaceState};
use clap::ValueEnum;
use engine_core::observability;
use physics_rapier::{interaction_groups, layers, PhysicsWorld};
use player_controller::{DirectInputAdapter, PlayerController, PlayerFrame, RawInput};
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::{ColliderBuilder, Real, RigidBodyBuilder, RigidBodyHandle};

const GRAVITY: Real = -9.81;
const PLATFORM_AMPLITUDE: Real = 2.0;
const PLATFORM_FREQUENCY: Real = 0.5;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScenarioKind {
    Flat,
    Ramp,
    Platform,
    Wall,
    Gap,
}

pub struct Scenario {
    pub world: PhysicsWorld,
    pub spawn: Point<Real>,
    platform: Option<RigidBodyHandle>,
    elapsed: Real,
}

impl Scenario {
    pub fn build(kind: ScenarioKind, profile: &CharacterBodyProfile) -> Self {
        let mut world = PhysicsWorld::new(Vector::new(0.0, GRAVITY, 0.0));
        let mut platform = None;
        match kind {
            ScenarioKind::Flat => {
                insert_slab(&mut world, Vector::new(0.0, -0.1, 0.0), Vector::new(20.0, 0.1, 20.0));
            }
            ScenarioKind::Ramp => {
                insert_slab(&mut world, Vector::new(0.0, -0.1, 0.0), Vector::new(20.0, 0.1, 20.0));
                let ramp = ColliderBuilder::cuboid(2.0, 0.1, 4.0)
                    .rotation(Vector::new(25.0_f32.to_radians(), 0.0, 0.0))
                    .translation(Vector::new(0.0, 1.6, -6.0))
                    .collision_groups(interaction_groups(layers::STANDABLE, layers::ALL))
                    .build();
                world.insert_static_collider(ramp);
            }
            ScenarioKind::Platform => {
                let (handle, _) = world.insert_body(
                    RigidBodyBuilder::kinematic_position_based()
                        .translation(Vector::new(0.0, -0.1, 0.0))
                        .build(),
                    ColliderBuilder::cuboid(2.0, 0.1, 2.0)
                        .collision_groups(interaction_groups(layers::STANDABLE, layers::ALL))
                        .build(),
                );
                platform = Some(handle);
            }
            ScenarioKind::Wall => {
                insert_slab(&mut world, Vector::new(0.0, -0.1, 0.0), Vector::new(20.0, 0.1, 20.0));
                let wall = ColliderBuilder::cuboid(4.0, 3.0, 0.2)
                    .translation(Vector::new(0.0, 3.0, -3.0))
                    .collision_groups(interaction_groups(layers::CLIMBABLE, layers::ALL))
                    .build();
                world.insert_static_collider(wall);
            }
            ScenarioKind::Gap => {
                insert_slab(&mut world, Vector::new(0.0, -0.1, 0.0), Vector::new(2.0, 0.1, 3.0));
                insert_slab(&mut world, Vector::new(0.0, -0.25, -6.5), Vector::new(2.0, 0.1, 3.0));
            }
        }
        Self {
            world,
            spawn: Point::new(0.0, profile.foot_offset() - 0.005, 0.0),
            platform,
            elapsed: 0.0,
        }
    }

    /// Drives animated bodies; call once per tick before stepping the world.
    pub fn advance(&mut self, dt: Real) {
        self.elapsed += dt;
        if let Some(platform) = self.platform {
            let x = PLATFORM_AMPLITUDE * (PLATFORM_FREQUENCY * self.elapsed).sin();
            self.world
                .set_kinematic_translation(platform, Vector::new(x, -0.1, 0.0));
        }
    }
}

fn insert_slab(world: &mut PhysicsWorld, center: Vector<Real>, half_extents: Vector<Real>) {
    let slab = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
        .translation(center)
        .collision_groups(interaction_groups(layers::STANDABLE, layers::ALL))
        .build();
    world.insert_static_collider(slab);
}

#[derive(Clone, Copy, Debug)]
pub struct SimulationOptions {
    pub scenario: ScenarioKind,
    pub ticks: u32,
    pub dt: Real,
    pub move_axis: [Real; 2],
    pub jump_at: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct SimulationSummary {
    pub ticks: u32,
    pub airborne_ticks: u32,
    pub ground_ticks: u32,
    pub steep_ticks: u32,
    pub climbing_ticks: u32,
    pub jumps: u32,
    pub snaps: u32,
    pub start: Point<Real>,
    pub end: Point<Real>,
    pub max_height: Real,
    pub final_state: Option<SurfaceState>,
}

impl SimulationSummary {
    fn new(start: Point<Real>) -> Self {
        Self {
            ticks: 0,
            airborne_ticks: 0,
            ground_ticks: 0,
            steep_ticks: 0,
            climbing_ticks: 0,
            jumps: 0,
            snaps: 0,
            start,
            end: start,
            max_height: start.y,
            final_state: None,
        }
    }

    fn record(&mut self, frame: &PlayerFrame) {
        self.ticks += 1;
        match frame.state {
            SurfaceState::Airborne => self.airborne_ticks += 1,
            SurfaceState::Ground => self.ground_ticks += 1,
            SurfaceState::Steep => self.steep_ticks += 1,
            SurfaceState::Climbing => self.climbing_ticks += 1,
        }
        if frame.report.jumped {
            self.jumps += 1;
        }
        if frame.report.snapped {
            self.snaps += 1;
        }
        self.max_height = self.max_height.max(frame.position.y);
        self.final_state = Some(frame.state);
    }
}

pub fn run_simulation(
    options: SimulationOptions,
    config: MovementConfig,
    mut trace: impl FnMut(u32, &PlayerFrame),
) -> Result<SimulationSummary, String> {
    let profile = CharacterBodyProfile::humanoid_default();
    let mut scenario = Scenario::build(options.scenario, &profile);
    let mut player = PlayerController::new(
        DirectInputAdapter,
        config,
        profile,
        &mut scenario.world,
        scenario.spawn,
    );
    scenario.world.step(options.dt);

    let mut summary = SimulationSummary::new(scenario.spawn);
    player.apply_raw_input(RawInput {
        move_x: options.move_axis[0],
        move_y: options.move_axis[1],
        jump: false,
    });
    for tick in 0..options.ticks {
        if options.jump_at == Some(tick) {
            player.latch().request_jump();
        }
        let Some(frame) = player.tick(&mut scenario.world, options.dt) else {
            let message = format!("character body lost at tick {}", tick);
            observability::set_sticky_error(message.clone());
            return Err(message);
        };
        summary.record(&frame);
        trace(tick, &frame);
        scenario.advance(options.dt);
        scenario.world.step(options.dt);
    }
    if let Some(state) = player.body().state(&scenario.world) {
        summary.end = state.position;
    }
    Ok(summary)
}
