//! Player controller composition (input latch + movement motor + character body).
#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use character_collision::{CharacterBody, CharacterBodyProfile};
use character_motor_rigid::settings::yaw_rotation;
use character_motor_rigid::{
    MovementConfig, MovementController, StepContext, StepReport, SurfaceState,
};
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::{Real, RigidBodyHandle};

#[derive(Clone, Copy, Debug, Default)]
pub struct RawInput {
    pub move_x: Real,
    pub move_y: Real,
    pub jump: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputIntent {
    pub move_axis: [Real; 2],
    pub jump: bool,
}

pub trait InputAdapter {
    fn intent(&mut self, raw: RawInput) -> InputIntent;
}

#[derive(Default)]
pub struct DirectInputAdapter;

impl DirectInputAdapter {
    fn normalize_axis(axis: [Real; 2]) -> [Real; 2] {
        if !axis[0].is_finite() || !axis[1].is_finite() {
            return [0.0, 0.0];
        }
        let len = (axis[0] * axis[0] + axis[1] * axis[1]).sqrt();
        if len > 1.0 {
            [axis[0] / len, axis[1] / len]
        } else {
            axis
        }
    }
}

impl InputAdapter for DirectInputAdapter {
    fn intent(&mut self, raw: RawInput) -> InputIntent {
        InputIntent {
            move_axis: Self::normalize_axis([raw.move_x, raw.move_y]),
            jump: raw.jump,
        }
    }
}

#[derive(Default)]
struct LatchCell {
    move_bits: AtomicU64,
    jump: AtomicBool,
}

/// Lock-free handoff of input intent from any thread to the simulation tick.
///
/// The move axis is level-triggered and persists until overwritten; a jump request is
/// consumed by the next `drain`.
#[derive(Clone, Default)]
pub struct IntentLatch {
    cell: Arc<LatchCell>,
}

impl IntentLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_move(&self, axis: [Real; 2]) {
        let bits = (axis[0].to_bits() as u64) | ((axis[1].to_bits() as u64) << 32);
        self.cell.move_bits.store(bits, Ordering::Release);
    }

    pub fn request_jump(&self) {
        self.cell.jump.store(true, Ordering::Release);
    }

    pub fn peek_move(&self) -> [Real; 2] {
        let bits = self.cell.move_bits.load(Ordering::Acquire);
        [
            Real::from_bits(bits as u32),
            Real::from_bits((bits >> 32) as u32),
        ]
    }

    pub fn drain(&self) -> InputIntent {
        InputIntent {
            move_axis: self.peek_move(),
            jump: self.cell.jump.swap(false, Ordering::AcqRel),
        }
    }

    pub fn clear(&self) {
        self.cell.move_bits.store(0, Ordering::Release);
        self.cell.jump.store(false, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PlayerFrame {
    pub position: Point<Real>,
    pub velocity: Vector<Real>,
    pub state: SurfaceState,
    pub contact_count: usize,
    pub report: StepReport<RigidBodyHandle>,
}

pub struct PlayerController<A: InputAdapter> {
    input: A,
    latch: IntentLatch,
    motor: MovementController<RigidBodyHandle>,
    body: CharacterBody,
}

impl<A: InputAdapter> PlayerController<A> {
    pub fn new(
        input: A,
        config: MovementConfig,
        profile: CharacterBodyProfile,
        world: &mut PhysicsWorld,
        position: Point<Real>,
    ) -> Self {
        Self {
            input,
            latch: IntentLatch::new(),
            motor: MovementController::new(config),
            body: CharacterBody::spawn(world, profile, position),
        }
    }

    /// Handle for feeding intent from input or network threads.
    pub fn latch(&self) -> IntentLatch {
        self.latch.clone()
    }

    pub fn controller(&self) -> &MovementController<RigidBodyHandle> {
        &self.motor
    }

    pub fn controller_mut(&mut self) -> &mut MovementController<RigidBodyHandle> {
        &mut self.motor
    }

    pub fn body(&self) -> &CharacterBody {
        &self.body
    }

    pub fn apply_raw_input(&mut self, raw: RawInput) {
        let intent = self.input.intent(raw);
        self.latch.set_move(intent.move_axis);
        if intent.jump {
            self.latch.request_jump();
        }
    }

    /// `None` disables the reference frame and uses world axes.
    pub fn set_input_reference_yaw(&mut self, yaw_deg: Option<Real>) {
        self.motor
            .set_input_reference_frame(yaw_deg.map(yaw_rotation));
    }

    /// Runs one motor step against the contacts of the last world step; call before `world.step`.
    pub fn tick(&mut self, world: &mut PhysicsWorld, dt: Real) -> Option<PlayerFrame> {
        let mut state = self.body.state(world)?;
        let intent = self.latch.drain();
        self.motor.submit_move_intent(intent.move_axis);
        if intent.jump {
            self.motor.request_jump();
        }

        let up_axis = world.up_axis();
        let contact_count = self.body.report_contacts(world, &mut self.motor, up_axis);
        let report = {
            let physics = self.body.physics(world);
            self.motor.step(
                &physics,
                &mut state,
                StepContext::from_gravity(dt, world.gravity),
            )
        };
        self.body.write_velocity(world, report.velocity);
        Some(PlayerFrame {
            position: state.position,
            velocity: report.velocity,
            state: report.state,
            contact_count,
            report,
        })
    }

    pub fn teleport(&mut self, world: &mut PhysicsWorld, position: Point<Real>) -> bool {
        if !self.body.teleport(world, position) {
            return false;
        }
        self.motor.reset_state();
        true
    }

    /// Drops pending intent and all motor history; the body is left where it is.
    pub fn reset(&mut self) {
        self.latch.clear();
        self.motor.reset_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use physics_rapier::{interaction_groups, layers};
    use rapier3d::prelude::*;

    const DT: Real = 1.0 / 60.0;

    fn build_floor(world: &mut PhysicsWorld) {
        let floor = ColliderBuilder::cuboid(20.0, 0.1, 20.0)
            .translation(vector![0.0, -0.1, 0.0])
            .collision_groups(interaction_groups(layers::STANDABLE, layers::ALL))
            .build();
        world.insert_static_collider(floor);
    }

    fn spawn_on_floor(world: &mut PhysicsWorld) -> PlayerController<DirectInputAdapter> {
        let profile = CharacterBodyProfile::humanoid_default();
        let controller = PlayerController::new(
            DirectInputAdapter,
            MovementConfig::default(),
            profile,
            world,
            point![0.0, profile.foot_offset() - 0.005, 0.0],
        );
        world.step(DT);
        controller
    }

    fn run(world: &mut PhysicsWorld, player: &mut PlayerController<DirectInputAdapter>, ticks: usize) -> Option<PlayerFrame> {
        let mut last = None;
        for _ in 0..ticks {
            last = player.tick(world, DT);
            world.step(DT);
        }
        last
    }

    fn position(world: &PhysicsWorld, player: &PlayerController<DirectInputAdapter>) -> Point<Real> {
        player
            .body()
            .state(world)
            .map(|state| state.position)
            .unwrap_or_else(Point::origin)
    }

    #[test]
    fn direct_adapter_clamps_axis() {
        let mut adapter = DirectInputAdapter;
        let intent = adapter.intent(RawInput {
            move_x: 3.0,
            move_y: 4.0,
            jump: true,
        });
        assert!((intent.move_axis[0] - 0.6).abs() < 1.0e-6);
        assert!((intent.move_axis[1] - 0.8).abs() < 1.0e-6);
        assert!(intent.jump);
        let intent = adapter.intent(RawInput {
            move_x: Real::NAN,
            ..Default::default()
        });
        assert_eq!(intent.move_axis, [0.0, 0.0]);
    }

    #[test]
    fn latch_carries_intent_across_threads() {
        let latch = IntentLatch::new();
        let writer = latch.clone();
        std::thread::spawn(move || {
            writer.set_move([-0.25, 0.5]);
            writer.request_jump();
        })
        .join()
        .expect("writer thread");

        let intent = latch.drain();
        assert_eq!(intent.move_axis, [-0.25, 0.5]);
        assert!(intent.jump);
        let intent = latch.drain();
        assert_eq!(intent.move_axis, [-0.25, 0.5]);
        assert!(!intent.jump);
        latch.clear();
        assert_eq!(latch.drain(), InputIntent::default());
    }

    #[test]
    fn walks_forward_on_flat_ground() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let mut player = spawn_on_floor(&mut world);
        let start = position(&world, &player);

        player.apply_raw_input(RawInput {
            move_y: 1.0,
            ..Default::default()
        });
        let frame = run(&mut world, &mut player, 120).expect("frame");

        let end = position(&world, &player);
        assert_eq!(frame.state, SurfaceState::Ground);
        assert!(frame.contact_count > 0);
        assert!(end.z < start.z - 3.0);
        assert!(end.x.abs() < 0.1);
        assert!((end.y - start.y).abs() < 0.1);
        assert!((frame.velocity.z + 6.0).abs() < 0.5);
    }

    #[test]
    fn jump_lifts_off_the_floor() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let mut player = spawn_on_floor(&mut world);
        run(&mut world, &mut player, 20);
        let start = position(&world, &player);

        player.apply_raw_input(RawInput {
            jump: true,
            ..Default::default()
        });
        let frame = player.tick(&mut world, DT).expect("frame");
        world.step(DT);
        assert!(frame.report.jumped);
        assert!(frame.velocity.y > 4.0);

        run(&mut world, &mut player, 15);
        assert!(position(&world, &player).y > start.y + 0.5);
        assert_eq!(player.controller().want_to_jump(), 0.0);
    }

    #[test]
    fn rides_a_moving_platform() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let (platform, _) = world.insert_body(
            RigidBodyBuilder::kinematic_position_based()
                .translation(vector![0.0, -0.1, 0.0])
                .build(),
            ColliderBuilder::cuboid(3.0, 0.1, 3.0).build(),
        );
        let mut player = spawn_on_floor(&mut world);
        let start = position(&world, &player);

        let mut platform_x = 0.0;
        let mut frame = None;
        for _ in 0..90 {
            frame = player.tick(&mut world, DT);
            platform_x += 1.0 * DT;
            world.set_kinematic_translation(platform, vector![platform_x, -0.1, 0.0]);
            world.step(DT);
        }

        let frame = frame.expect("frame");
        assert_eq!(frame.report.connected_body, Some(platform));
        assert!((frame.report.connection_velocity.x - 1.0).abs() < 0.05);
        let end = position(&world, &player);
        assert!((end.x - start.x - platform_x).abs() < 0.3);
    }

    #[test]
    fn rests_on_a_walkable_ramp() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let angle: Real = 30.0_f32.to_radians();
        let ramp = ColliderBuilder::cuboid(6.0, 0.1, 6.0)
            .rotation(vector![0.0, 0.0, angle])
            .build();
        world.insert_static_collider(ramp);

        let profile = CharacterBodyProfile::humanoid_default();
        let normal = vector![-angle.sin(), angle.cos(), 0.0];
        let sphere_center = normal * (0.1 + profile.capsule_radius - 0.005);
        let center = sphere_center + vector![0.0, profile.capsule_height * 0.5, 0.0];
        let mut player = PlayerController::new(
            DirectInputAdapter,
            MovementConfig::default(),
            profile,
            &mut world,
            Point::from(center),
        );
        world.step(DT);
        let start = position(&world, &player);

        let frame = run(&mut world, &mut player, 60).expect("frame");
        assert_eq!(frame.state, SurfaceState::Ground);
        assert!((frame.report.contact_normal - normal).norm() < 0.05);
        assert!((position(&world, &player) - start).norm() < 0.15);
    }

    #[test]
    fn teleport_and_reset_clear_history() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let mut player = spawn_on_floor(&mut world);
        player.apply_raw_input(RawInput {
            move_x: 1.0,
            jump: true,
            ..Default::default()
        });
        run(&mut world, &mut player, 5);

        assert!(player.teleport(&mut world, point![2.0, 4.0, 0.0]));
        assert_eq!(player.controller().connected_body(), None);
        assert_eq!(player.controller().state(), SurfaceState::Airborne);

        player.reset();
        assert_eq!(player.latch().drain(), InputIntent::default());
        assert_eq!(player.controller().move_input(), [0.0, 0.0]);
    }

    #[test]
    fn reference_yaw_rotates_forward() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let mut player = spawn_on_floor(&mut world);
        player.set_input_reference_yaw(Some(90.0));
        player.apply_raw_input(RawInput {
            move_y: 1.0,
            ..Default::default()
        });
        run(&mut world, &mut player, 60);
        let end = position(&world, &player);
        assert!(end.x > 2.0);
        assert!(end.z.abs() < 0.2);
    }
}
