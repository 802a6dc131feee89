//! Narrow physics surface consumed by the motor.

use std::fmt;

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

/// Rigid body state read and written by the motor once per tick.
#[derive(Clone, Copy, Debug)]
pub struct BodyState {
    pub position: Point<Real>,
    pub velocity: Vector<Real>,
    pub mass: Real,
    pub is_kinematic: bool,
}

impl BodyState {
    pub fn new(position: Point<Real>, mass: Real) -> Self {
        Self {
            position,
            velocity: Vector::zeros(),
            mass,
            is_kinematic: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyInfo {
    pub mass: Real,
    pub is_kinematic: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct ProbeHit<B> {
    pub normal: Vector<Real>,
    pub body: Option<B>,
    pub distance: Real,
}

pub trait MovementPhysics {
    type Body: Copy + PartialEq + fmt::Debug;

    /// Nearest hit along `direction` within `max_distance`, limited to colliders in `layer_mask`.
    fn cast_probe(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        layer_mask: u32,
    ) -> Option<ProbeHit<Self::Body>>;

    fn body_info(&self, body: Self::Body) -> Option<BodyInfo>;

    /// Expresses a world point in the body's local frame at its current pose.
    fn platform_local_point(&self, body: Self::Body, world: Point<Real>) -> Option<Point<Real>>;

    /// Moves a local point back to world space at the body's current pose.
    fn platform_world_point(&self, body: Self::Body, local: Point<Real>) -> Option<Point<Real>>;
}
