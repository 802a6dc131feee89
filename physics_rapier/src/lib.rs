//! Rapier integration entrypoints and shared world setup.
#![forbid(unsafe_code)]

use rapier3d::prelude::*;

/// Collision layer bits shared by scene colliders and movement probes.
pub mod layers {
    pub const DEFAULT: u32 = 1 << 0;
    pub const STANDABLE: u32 = 1 << 1;
    pub const CLIMBABLE: u32 = 1 << 2;
    pub const CHARACTER: u32 = 1 << 3;
    pub const ALL: u32 = u32::MAX;
}

pub fn interaction_groups(memberships: u32, filter: u32) -> InteractionGroups {
    InteractionGroups::new(
        Group::from_bits_truncate(memberships),
        Group::from_bits_truncate(filter),
    )
}

#[derive(Clone, Copy, Debug)]
pub struct RayHit {
    pub collider: ColliderHandle,
    pub body: Option<RigidBodyHandle>,
    pub normal: Vector<Real>,
    pub distance: Real,
}

/// One contact point seen from a given collider; the normal points toward that collider.
#[derive(Clone, Copy, Debug)]
pub struct ContactSample {
    pub normal: Vector<Real>,
    pub other_collider: ColliderHandle,
    pub other_body: Option<RigidBodyHandle>,
    pub depth: Real,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn query_pipeline(&self) -> &QueryPipeline {
        &self.query_pipeline
    }

    pub fn narrow_phase(&self) -> &NarrowPhase {
        &self.narrow_phase
    }

    pub fn up_axis(&self) -> Vector<Real> {
        if self.gravity.norm_squared() > 1.0e-6 {
            -self.gravity.normalize()
        } else {
            Vector::y()
        }
    }

    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &physics_hooks,
            &event_handler,
        );
        self.query_pipeline.update(&self.colliders);
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.colliders.insert(collider)
    }

    pub fn insert_body(
        &mut self,
        body: RigidBody,
        collider: Collider,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = self.bodies.insert(body);
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        (body, collider)
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    /// Moves a kinematic body to `translation` over the next step.
    pub fn set_kinematic_translation(
        &mut self,
        handle: RigidBodyHandle,
        translation: Vector<Real>,
    ) -> bool {
        match self.bodies.get_mut(handle) {
            Some(body) if body.is_kinematic() => {
                body.set_next_kinematic_translation(translation);
                true
            }
            _ => false,
        }
    }

    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        filter: QueryFilter,
    ) -> Option<RayHit> {
        let direction = direction.try_normalize(1.0e-6)?;
        let ray = Ray::new(origin, direction);
        let (collider, hit) = self.query_pipeline.cast_ray_and_get_normal(
            &self.bodies,
            &self.colliders,
            &ray,
            max_distance,
            true,
            filter,
        )?;
        let body = self.colliders.get(collider).and_then(|c| c.parent());
        Some(RayHit {
            collider,
            body,
            normal: hit.normal,
            distance: hit.time_of_impact,
        })
    }

    /// Touching contact points of `collider` from the last step.
    pub fn contacts_with(&self, collider: ColliderHandle, max_separation: Real) -> Vec<ContactSample> {
        let mut samples = Vec::new();
        for pair in self.narrow_phase.contact_pairs_with(collider) {
            if !pair.has_any_active_contact {
                continue;
            }
            let (other_collider, flip) = if pair.collider1 == collider {
                (pair.collider2, true)
            } else {
                (pair.collider1, false)
            };
            let other_body = self.colliders.get(other_collider).and_then(|c| c.parent());
            for manifold in &pair.manifolds {
                let normal = if flip {
                    -manifold.data.normal
                } else {
                    manifold.data.normal
                };
                for point in &manifold.points {
                    if point.dist > max_separation {
                        continue;
                    }
                    samples.push(ContactSample {
                        normal,
                        other_collider,
                        other_body,
                        depth: -point.dist,
                    });
                }
            }
        }
        samples
    }
}
