//! Rigid-body movement motor (contact-driven velocity correction).
#![forbid(unsafe_code)]

pub mod physics;
pub mod settings;
pub mod surface;

use engine_core::logging;
use rapier3d::math::{Point, Rotation, Vector};
use rapier3d::prelude::Real;

pub use physics::{BodyInfo, BodyState, MovementPhysics, ProbeHit};
pub use surface::{
    classify_contact, resolve_surface, ContactClass, ContactSet, SurfaceResolution, SurfaceState,
    SurfaceThresholds, JUMP_GRACE_STEPS,
};

const CLIMB_PULL_FACTOR: Real = 0.9;
const REST_SPEED_SQ: Real = 0.01;

#[derive(Clone, Copy, Debug)]
pub struct MovementConfig {
    pub max_speed: Real,
    pub max_acceleration: Real,
    pub air_max_acceleration: Real,
    pub jump_strength: Real,
    /// Steepest walkable slope in radians.
    pub ground_max_angle: Real,
    pub gravity_scale: Real,
    /// Collision layers the ground snap probe may hit.
    pub standable_layer_mask: u32,
    pub climb_max_speed: Real,
    pub climb_max_acceleration: Real,
    /// Steepest climbable surface in radians; past 90 degrees includes overhangs.
    pub climb_max_angle: Real,
    /// Rotation whose flattened right/forward axes define the move input basis.
    pub input_reference_frame: Option<Rotation<Real>>,
    /// Seconds a jump request stays pending.
    pub jump_buffer_window: Real,
    pub snap_probe_distance: Real,
    /// Snapping is skipped above this fraction of `max_speed`.
    pub snap_speed_fraction: Real,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 6.0,
            max_acceleration: 40.0,
            air_max_acceleration: 8.0,
            jump_strength: 5.0,
            ground_max_angle: 45.0_f32.to_radians(),
            gravity_scale: 1.0,
            standable_layer_mask: u32::MAX,
            climb_max_speed: 2.0,
            climb_max_acceleration: 20.0,
            climb_max_angle: 140.0_f32.to_radians(),
            input_reference_frame: None,
            jump_buffer_window: 0.2,
            snap_probe_distance: 0.5,
            snap_speed_fraction: 0.8,
        }
    }
}

impl MovementConfig {
    pub fn thresholds(&self) -> SurfaceThresholds {
        SurfaceThresholds::from_angles(self.ground_max_angle, self.climb_max_angle)
    }
}

/// Per-tick inputs supplied by the simulation loop.
#[derive(Clone, Copy, Debug)]
pub struct StepContext {
    pub dt: Real,
    pub up_axis: Vector<Real>,
    pub gravity: Vector<Real>,
}

impl StepContext {
    /// Derives the up axis from gravity, falling back to +Y in zero gravity.
    pub fn from_gravity(dt: Real, gravity: Vector<Real>) -> Self {
        let up_axis = if gravity.norm_squared() > 1.0e-6 {
            -gravity.normalize()
        } else {
            Vector::y()
        };
        Self {
            dt,
            up_axis,
            gravity,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct StepReport<B> {
    pub state: SurfaceState,
    pub contact_normal: Vector<Real>,
    pub snapped: bool,
    pub jumped: bool,
    /// Speed added along the jump direction this tick.
    pub jump_speed: Real,
    pub jump_direction: Option<Vector<Real>>,
    pub connected_body: Option<B>,
    pub connection_velocity: Vector<Real>,
    pub velocity: Vector<Real>,
}

pub struct MovementController<B> {
    config: MovementConfig,
    thresholds: SurfaceThresholds,
    move_input: [Real; 2],
    want_to_jump: Real,
    contacts: ContactSet,
    contact_normal: Vector<Real>,
    state: SurfaceState,
    steps_since_last_grounded: u32,
    steps_since_last_jump: u32,
    connected_body: Option<B>,
    previous_connected_body: Option<B>,
    connection_world_position: Point<Real>,
    connection_local_position: Point<Real>,
    connection_velocity: Vector<Real>,
}

impl<B: Copy + PartialEq + std::fmt::Debug> MovementController<B> {
    pub fn new(config: MovementConfig) -> Self {
        Self {
            thresholds: config.thresholds(),
            config,
            move_input: [0.0, 0.0],
            want_to_jump: 0.0,
            contacts: ContactSet::default(),
            contact_normal: Vector::y(),
            state: SurfaceState::Airborne,
            steps_since_last_grounded: 0,
            steps_since_last_jump: 0,
            connected_body: None,
            previous_connected_body: None,
            connection_world_position: Point::origin(),
            connection_local_position: Point::origin(),
            connection_velocity: Vector::zeros(),
        }
    }

    pub fn config(&self) -> MovementConfig {
        self.config
    }

    pub fn set_config(&mut self, config: MovementConfig) {
        self.config = config;
        self.thresholds = config.thresholds();
    }

    pub fn thresholds(&self) -> SurfaceThresholds {
        self.thresholds
    }

    pub fn set_input_reference_frame(&mut self, frame: Option<Rotation<Real>>) {
        self.config.input_reference_frame = frame;
    }

    pub fn reset_state(&mut self) {
        self.move_input = [0.0, 0.0];
        self.want_to_jump = 0.0;
        self.contacts.clear();
        self.contact_normal = Vector::y();
        self.state = SurfaceState::Airborne;
        self.steps_since_last_grounded = 0;
        self.steps_since_last_jump = 0;
        self.connected_body = None;
        self.previous_connected_body = None;
        self.connection_world_position = Point::origin();
        self.connection_local_position = Point::origin();
        self.connection_velocity = Vector::zeros();
    }

    pub fn move_input(&self) -> [Real; 2] {
        self.move_input
    }

    pub fn want_to_jump(&self) -> Real {
        self.want_to_jump
    }

    pub fn contacts(&self) -> &ContactSet {
        &self.contacts
    }

    pub fn contact_normal(&self) -> Vector<Real> {
        self.contact_normal
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn is_grounded(&self) -> bool {
        self.state.is_grounded()
    }

    pub fn steps_since_last_grounded(&self) -> u32 {
        self.steps_since_last_grounded
    }

    pub fn steps_since_last_jump(&self) -> u32 {
        self.steps_since_last_jump
    }

    pub fn connected_body(&self) -> Option<B> {
        self.connected_body
    }

    pub fn previous_connected_body(&self) -> Option<B> {
        self.previous_connected_body
    }

    pub fn submit_move_intent(&mut self, axis: [Real; 2]) {
        self.move_input = clamp_axis(axis);
    }

    pub fn request_jump(&mut self) {
        self.want_to_jump = self.config.jump_buffer_window.max(0.0);
    }

    pub fn report_contact(&mut self, normal: Vector<Real>, up_axis: Vector<Real>, other: Option<B>) {
        let class = classify_contact(normal, up_axis, &self.thresholds);
        if class.ground {
            self.connected_body = other;
        } else {
            if class.steep && self.contacts.ground_count == 0 {
                self.connected_body = other;
            }
            if class.climb {
                self.connected_body = other;
            }
        }
        self.contacts.add(normal, class);
    }

    pub fn step<P: MovementPhysics<Body = B>>(
        &mut self,
        physics: &P,
        body: &mut BodyState,
        ctx: StepContext,
    ) -> StepReport<B> {
        let dt = ctx.dt.max(0.0);
        let up_axis = ctx.up_axis.try_normalize(1.0e-6).unwrap_or_else(Vector::y);
        let mut velocity = body.velocity;

        self.steps_since_last_grounded = self.steps_since_last_grounded.saturating_add(1);
        self.steps_since_last_jump = self.steps_since_last_jump.saturating_add(1);

        let snap = GroundSnap {
            probe_distance: self.config.snap_probe_distance.max(0.0),
            max_speed: self.config.max_speed * self.config.snap_speed_fraction,
            layer_mask: self.config.standable_layer_mask,
            min_ground_dot: self.thresholds.min_ground_dot,
        };
        let snap_allowed = self.steps_since_last_grounded <= 1
            && self.steps_since_last_jump > JUMP_GRACE_STEPS;
        let position = body.position;
        let connected_body = &mut self.connected_body;
        let resolution = resolve_surface(
            &self.contacts,
            &self.thresholds,
            up_axis,
            self.steps_since_last_jump,
            || {
                if !snap_allowed {
                    return None;
                }
                let hit = snap.attempt(physics, position, up_axis, &mut velocity)?;
                *connected_body = hit.body;
                Some(hit.normal)
            },
        );

        if resolution.state.is_grounded() {
            self.steps_since_last_grounded = 0;
        }
        self.log_transition(resolution);
        self.state = resolution.state;
        self.contact_normal = resolution.normal;

        self.update_connection(physics, body, dt);

        let (jump_speed, jump_direction) = self.jump(&mut velocity, up_axis, dt);
        self.apply_gravity(&mut velocity, ctx.gravity, dt);
        self.adjust_velocity(&mut velocity, up_axis, dt);
        body.velocity = velocity;

        let report = StepReport {
            state: self.state,
            contact_normal: self.contact_normal,
            snapped: resolution.snapped,
            jumped: jump_direction.is_some(),
            jump_speed,
            jump_direction,
            connected_body: self.connected_body,
            connection_velocity: self.connection_velocity,
            velocity,
        };
        self.clear_state();
        report
    }

    fn update_connection<P: MovementPhysics<Body = B>>(
        &mut self,
        physics: &P,
        body: &BodyState,
        dt: Real,
    ) {
        let Some(connected) = self.connected_body else {
            return;
        };
        let Some(info) = physics.body_info(connected) else {
            self.connected_body = None;
            return;
        };
        if !info.is_kinematic && info.mass < body.mass {
            return;
        }
        if self.previous_connected_body == Some(connected) && dt > 0.0 {
            if let Some(world) = physics.platform_world_point(connected, self.connection_local_position)
            {
                let movement = world - self.connection_world_position;
                self.connection_velocity = movement / dt;
            }
        }
        match physics.platform_local_point(connected, body.position) {
            Some(local) => {
                self.connection_world_position = body.position;
                self.connection_local_position = local;
            }
            None => self.connected_body = None,
        }
    }

    fn jump(
        &mut self,
        velocity: &mut Vector<Real>,
        up_axis: Vector<Real>,
        dt: Real,
    ) -> (Real, Option<Vector<Real>>) {
        if self.want_to_jump <= 0.0 {
            return (0.0, None);
        }
        self.want_to_jump = (self.want_to_jump - dt).max(0.0);
        let support = if self.state.is_grounded() {
            Some(self.contact_normal)
        } else {
            self.contacts.steep_direction()
        };
        let Some(support) = support else {
            return (0.0, None);
        };
        let direction = (support + up_axis).try_normalize(1.0e-6).unwrap_or(up_axis);
        let mut jump_speed = self.config.jump_strength;
        let aligned_speed = velocity.dot(&direction);
        if aligned_speed > 0.0 {
            jump_speed = (jump_speed - aligned_speed).max(0.0);
        }
        *velocity += direction * jump_speed;
        self.want_to_jump = 0.0;
        self.steps_since_last_jump = 0;
        logging::debug(format!(
            "motor jump from {} (speed {:.3})",
            self.state.as_str(),
            jump_speed
        ));
        (jump_speed, Some(direction))
    }

    fn apply_gravity(&self, velocity: &mut Vector<Real>, gravity: Vector<Real>, dt: Real) {
        let gravity = gravity * self.config.gravity_scale;
        let normal = self.contact_normal;
        match self.state {
            SurfaceState::Climbing => {
                *velocity -= normal * (self.config.climb_max_acceleration * CLIMB_PULL_FACTOR * dt);
            }
            state if state.is_grounded() && velocity.norm_squared() < REST_SPEED_SQ => {
                *velocity += normal * (gravity.dot(&normal) * dt);
            }
            _ => *velocity += gravity * dt,
        }
    }

    fn adjust_velocity(&self, velocity: &mut Vector<Real>, up_axis: Vector<Real>, dt: Real) {
        let normal = self.contact_normal;
        let (acceleration, speed, x_axis, z_axis) = if self.state == SurfaceState::Climbing {
            (
                self.config.climb_max_acceleration,
                self.config.climb_max_speed,
                up_axis.cross(&normal),
                up_axis,
            )
        } else {
            let (right, forward) = input_axes(self.config.input_reference_frame, up_axis);
            let acceleration = if self.state.is_grounded() {
                self.config.max_acceleration
            } else {
                self.config.air_max_acceleration
            };
            (acceleration, self.config.max_speed, right, forward)
        };
        let x_axis = project_direction_on_plane(x_axis, normal);
        let z_axis = project_direction_on_plane(z_axis, normal);

        let relative = *velocity - self.connection_velocity;
        let current_x = relative.dot(&x_axis);
        let current_z = relative.dot(&z_axis);
        let max_speed_change = acceleration.max(0.0) * dt;
        let new_x = move_towards(current_x, self.move_input[0] * speed, max_speed_change);
        let new_z = move_towards(current_z, self.move_input[1] * speed, max_speed_change);
        *velocity += x_axis * (new_x - current_x) + z_axis * (new_z - current_z);
    }

    fn log_transition(&self, resolution: SurfaceResolution) {
        if resolution.snapped {
            logging::debug("motor snapped to ground");
        }
        if resolution.state == self.state {
            return;
        }
        let message = match (self.state.is_grounded(), resolution.state.is_grounded()) {
            (false, true) => format!("motor landed ({})", resolution.state.as_str()),
            (true, false) => "motor left ground".to_string(),
            _ => format!(
                "motor surface {} -> {}",
                self.state.as_str(),
                resolution.state.as_str()
            ),
        };
        logging::debug(message);
    }

    fn clear_state(&mut self) {
        self.contacts.clear();
        self.connection_velocity = Vector::zeros();
        self.previous_connected_body = self.connected_body;
        self.connected_body = None;
    }
}

#[derive(Clone, Copy, Debug)]
struct GroundSnap {
    probe_distance: Real,
    max_speed: Real,
    layer_mask: u32,
    min_ground_dot: Real,
}

impl GroundSnap {
    fn attempt<P: MovementPhysics>(
        &self,
        physics: &P,
        origin: Point<Real>,
        up_axis: Vector<Real>,
        velocity: &mut Vector<Real>,
    ) -> Option<ProbeHit<P::Body>> {
        let speed = velocity.norm();
        if speed > self.max_speed {
            return None;
        }
        let hit = physics.cast_probe(origin, -up_axis, self.probe_distance, self.layer_mask)?;
        if hit.normal.dot(&up_axis) < self.min_ground_dot {
            return None;
        }
        let dot = velocity.dot(&hit.normal);
        if dot > 0.0 {
            if let Some(dir) = (*velocity - hit.normal * dot).try_normalize(1.0e-6) {
                *velocity = dir * speed;
            } else {
                *velocity = Vector::zeros();
            }
        }
        Some(hit)
    }
}

/// Right and forward basis for move input, flattened onto the plane perpendicular to `up_axis`.
pub fn input_axes(
    frame: Option<Rotation<Real>>,
    up_axis: Vector<Real>,
) -> (Vector<Real>, Vector<Real>) {
    let (right, forward) = match frame {
        Some(rotation) => (rotation * Vector::x(), rotation * -Vector::z()),
        None => (Vector::x(), -Vector::z()),
    };
    (
        project_direction_on_plane(right, up_axis),
        project_direction_on_plane(forward, up_axis),
    )
}

pub fn project_direction_on_plane(direction: Vector<Real>, normal: Vector<Real>) -> Vector<Real> {
    (direction - normal * direction.dot(&normal))
        .try_normalize(1.0e-6)
        .unwrap_or_else(Vector::zeros)
}

pub fn move_towards(current: Real, target: Real, max_delta: Real) -> Real {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + delta.signum() * max_delta
    }
}

fn clamp_axis(axis: [Real; 2]) -> [Real; 2] {
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
