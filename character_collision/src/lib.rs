//! Rapier-backed character body and the physics queries the movement motor consumes.
//!
//! The character is a dynamic capsule with locked rotations; the motor owns gravity and
//! velocity, Rapier owns collision response.
#![forbid(unsafe_code)]

use character_motor_rigid::{BodyInfo, BodyState, MovementController, MovementPhysics, ProbeHit};
use engine_core::logging;
use physics_rapier::{interaction_groups, layers, PhysicsWorld};
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::{
    CoefficientCombineRule, ColliderBuilder, ColliderHandle, QueryFilter, Real,
    RigidBodyBuilder, RigidBodyHandle,
};

#[derive(Clone, Copy, Debug)]
pub struct CharacterBodyProfile {
    /// Capsule radius in meters.
    pub capsule_radius: Real,
    /// Capsule cylinder height in meters (distance between sphere centers).
    pub capsule_height: Real,
    pub density: Real,
    /// Layers the capsule belongs to.
    pub memberships: u32,
    /// Layers the capsule collides with.
    pub filter: u32,
    /// Contact points separated by more than this are not reported to the motor.
    pub contact_skin: Real,
    /// The ground probe starts this far above the capsule bottom.
    pub probe_skin: Real,
}

impl CharacterBodyProfile {
    pub fn humanoid_default() -> Self {
        Self {
            capsule_radius: 0.4,
            capsule_height: 1.0,
            density: 1.0,
            memberships: layers::CHARACTER,
            filter: layers::ALL,
            contact_skin: 0.01,
            probe_skin: 0.05,
        }
    }

    /// Distance from the capsule center to its lowest point.
    pub fn foot_offset(&self) -> Real {
        self.capsule_height * 0.5 + self.capsule_radius
    }
}

impl Default for CharacterBodyProfile {
    fn default() -> Self {
        Self::humanoid_default()
    }
}

pub struct CharacterBody {
    profile: CharacterBodyProfile,
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

impl CharacterBody {
    pub fn spawn(world: &mut PhysicsWorld, profile: CharacterBodyProfile, position: Point<Real>) -> Self {
        let body = RigidBodyBuilder::dynamic()
            .translation(position.coords)
            .gravity_scale(0.0)
            .lock_rotations()
            .can_sleep(false)
            .ccd_enabled(true)
            .build();
        let collider = ColliderBuilder::capsule_y(profile.capsule_height * 0.5, profile.capsule_radius)
            .density(profile.density)
            .friction(0.0)
            .friction_combine_rule(CoefficientCombineRule::Min)
            .restitution(0.0)
            .restitution_combine_rule(CoefficientCombineRule::Min)
            .collision_groups(interaction_groups(profile.memberships, profile.filter))
            .build();
        let (body, collider) = world.insert_body(body, collider);
        Self {
            profile,
            body,
            collider,
        }
    }

    pub fn profile(&self) -> CharacterBodyProfile {
        self.profile
    }

    pub fn body_handle(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn collider_handle(&self) -> ColliderHandle {
        self.collider
    }

    /// Snapshot of the body for one motor step.
    pub fn state(&self, world: &PhysicsWorld) -> Option<BodyState> {
        let Some(body) = world.body(self.body) else {
            logging::warn(format!("character body {:?} is no longer in the world", self.body));
            return None;
        };
        let mass = world
            .colliders()
            .get(self.collider)
            .map(|collider| collider.mass())
            .unwrap_or_else(|| body.mass());
        Some(BodyState {
            position: Point::from(*body.translation()),
            velocity: *body.linvel(),
            mass,
            is_kinematic: body.is_kinematic(),
        })
    }

    pub fn write_velocity(&self, world: &mut PhysicsWorld, velocity: Vector<Real>) -> bool {
        match world.body_mut(self.body) {
            Some(body) => {
                body.set_linvel(velocity, true);
                true
            }
            None => {
                logging::warn(format!("cannot write velocity to stale body {:?}", self.body));
                false
            }
        }
    }

    /// Feeds every touching contact from the last world step into the motor.
    pub fn report_contacts(
        &self,
        world: &PhysicsWorld,
        controller: &mut MovementController<RigidBodyHandle>,
        up_axis: Vector<Real>,
    ) -> usize {
        let samples = world.contacts_with(self.collider, self.profile.contact_skin);
        for sample in &samples {
            controller.report_contact(sample.normal, up_axis, sample.other_body);
        }
        samples.len()
    }

    pub fn teleport(&self, world: &mut PhysicsWorld, position: Point<Real>) -> bool {
        let Some(body) = world.body_mut(self.body) else {
            return false;
        };
        body.set_translation(position.coords, true);
        body.set_linvel(Vector::zeros(), true);
        true
    }

    pub fn physics<'a>(&self, world: &'a PhysicsWorld) -> RapierMovementPhysics<'a> {
        RapierMovementPhysics {
            world,
            exclude: Some(self.body),
            probe_offset: (self.profile.foot_offset() - self.profile.probe_skin).max(0.0),
            probe_skin: self.profile.probe_skin.max(0.0),
        }
    }
}

/// Read-only view of a Rapier world answering motor queries.
pub struct RapierMovementPhysics<'a> {
    world: &'a PhysicsWorld,
    exclude: Option<RigidBodyHandle>,
    probe_offset: Real,
    probe_skin: Real,
}

impl<'a> RapierMovementPhysics<'a> {
    /// Probes start at the query origin and nothing is excluded.
    pub fn new(world: &'a PhysicsWorld) -> Self {
        Self {
            world,
            exclude: None,
            probe_offset: 0.0,
            probe_skin: 0.0,
        }
    }
}

impl MovementPhysics for RapierMovementPhysics<'_> {
    type Body = RigidBodyHandle;

    fn cast_probe(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        layer_mask: u32,
    ) -> Option<ProbeHit<RigidBodyHandle>> {
        let direction = direction.try_normalize(1.0e-6)?;
        let mut filter = QueryFilter::new()
            .exclude_sensors()
            .groups(interaction_groups(layers::ALL, layer_mask));
        if let Some(body) = self.exclude {
            filter = filter.exclude_rigid_body(body);
        }
        let start = origin + direction * self.probe_offset;
        let hit = self
            .world
            .cast_ray(start, direction, max_distance + self.probe_skin, filter)?;
        Some(ProbeHit {
            normal: hit.normal,
            body: hit.body,
            distance: (hit.distance - self.probe_skin).max(0.0),
        })
    }

    fn body_info(&self, body: RigidBodyHandle) -> Option<BodyInfo> {
        let body = self.world.body(body)?;
        Some(BodyInfo {
            mass: body.mass(),
            is_kinematic: body.is_kinematic(),
        })
    }

    fn platform_local_point(&self, body: RigidBodyHandle, world: Point<Real>) -> Option<Point<Real>> {
        let body = self.world.body(body)?;
        Some(body.position().inverse_transform_point(&world))
    }

    fn platform_world_point(&self, body: RigidBodyHandle, local: Point<Real>) -> Option<Point<Real>> {
        let body = self.world.body(body)?;
        Some(body.position() * local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use character_motor_rigid::{MovementConfig, StepContext, SurfaceState};
    use rapier3d::prelude::*;

    const DT: Real = 1.0 / 60.0;

    fn build_floor(world: &mut PhysicsWorld) {
        let floor = ColliderBuilder::cuboid(5.0, 0.1, 5.0)
            .translation(vector![0.0, -0.1, 0.0])
            .collision_groups(interaction_groups(layers::STANDABLE, layers::ALL))
            .build();
        world.insert_static_collider(floor);
    }

    #[test]
    fn probe_starts_at_the_feet_and_skips_the_character() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let profile = CharacterBodyProfile::humanoid_default();
        let character = CharacterBody::spawn(&mut world, profile, point![0.0, profile.foot_offset() + 0.2, 0.0]);
        world.step(DT);

        let state = character.state(&world).expect("character state");
        let physics = character.physics(&world);
        let hit = physics
            .cast_probe(state.position, -Vector::y(), 0.5, layers::STANDABLE)
            .expect("floor below feet");
        assert!(hit.body.is_none());
        assert!(hit.normal.y > 0.99);
        assert!((hit.distance - 0.2).abs() < 0.02);

        assert!(physics
            .cast_probe(state.position, -Vector::y(), 0.1, layers::STANDABLE)
            .is_none());
        assert!(physics
            .cast_probe(state.position, -Vector::y(), 0.5, layers::CLIMBABLE)
            .is_none());
    }

    #[test]
    fn resting_character_reports_ground() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        build_floor(&mut world);
        let profile = CharacterBodyProfile::humanoid_default();
        let character = CharacterBody::spawn(&mut world, profile, point![0.0, profile.foot_offset() - 0.005, 0.0]);
        let mut controller = MovementController::new(MovementConfig::default());
        world.step(DT);

        let up = world.up_axis();
        assert!(character.report_contacts(&world, &mut controller, up) > 0);
        let mut state = character.state(&world).expect("character state");
        assert!(state.mass > 0.0);
        let report = controller.step(
            &character.physics(&world),
            &mut state,
            StepContext::from_gravity(DT, world.gravity),
        );
        assert_eq!(report.state, SurfaceState::Ground);
        assert!(report.contact_normal.y > 0.99);
        assert!(character.write_velocity(&mut world, report.velocity));
    }

    #[test]
    fn platform_points_follow_kinematic_pose() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let (platform, _) = world.insert_body(
            RigidBodyBuilder::kinematic_position_based()
                .translation(vector![1.0, 0.0, 0.0])
                .build(),
            ColliderBuilder::cuboid(1.0, 0.1, 1.0).build(),
        );
        world.step(DT);

        let rider = point![1.5, 1.0, 0.0];
        let local = RapierMovementPhysics::new(&world)
            .platform_local_point(platform, rider)
            .expect("platform pose");
        assert!((local - point![0.5, 1.0, 0.0]).norm() < 1.0e-5);

        world.set_kinematic_translation(platform, vector![2.0, 0.0, 0.0]);
        world.step(DT);
        let physics = RapierMovementPhysics::new(&world);
        let moved = physics.platform_world_point(platform, local).expect("platform pose");
        assert!((moved - point![2.5, 1.0, 0.0]).norm() < 1.0e-5);
        let info = physics.body_info(platform).expect("platform info");
        assert!(info.is_kinematic);
    }

    #[test]
    fn teleport_clears_velocity() {
        let mut world = PhysicsWorld::new(vector![0.0, -9.81, 0.0]);
        let character = CharacterBody::spawn(
            &mut world,
            CharacterBodyProfile::humanoid_default(),
            point![0.0, 3.0, 0.0],
        );
        character.write_velocity(&mut world, vector![1.0, 2.0, 3.0]);
        assert!(character.teleport(&mut world, point![4.0, 5.0, 6.0]));
        let state = character.state(&world).expect("character state");
        assert_eq!(state.position, point![4.0, 5.0, 6.0]);
        assert_eq!(state.velocity, Vector::zeros());
        assert!(!state.is_kinematic);
    }
}
