//! Contact classification and per-tick surface resolution.

use rapier3d::math::Vector;
use rapier3d::prelude::Real;

/// Steps after a jump during which snapping and climbing stay disabled.
pub const JUMP_GRACE_STEPS: u32 = 2;
const STEEP_MIN_UP_DOT: Real = -0.01;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfaceState {
    #[default]
    Airborne,
    Ground,
    Steep,
    Climbing,
}

impl SurfaceState {
    pub fn is_grounded(self) -> bool {
        !matches!(self, SurfaceState::Airborne)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SurfaceState::Airborne => "airborne",
            SurfaceState::Ground => "ground",
            SurfaceState::Steep => "steep",
            SurfaceState::Climbing => "climbing",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceThresholds {
    pub min_ground_dot: Real,
    pub min_climb_dot: Real,
}

impl SurfaceThresholds {
    pub fn from_angles(ground_max_angle: Real, climb_max_angle: Real) -> Self {
        Self {
            min_ground_dot: ground_max_angle.cos(),
            min_climb_dot: climb_max_angle.cos(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContactClass {
    pub ground: bool,
    pub steep: bool,
    pub climb: bool,
}

pub fn classify_contact(
    normal: Vector<Real>,
    up_axis: Vector<Real>,
    thresholds: &SurfaceThresholds,
) -> ContactClass {
    let up_dot = normal.dot(&up_axis);
    if up_dot >= thresholds.min_ground_dot {
        return ContactClass {
            ground: true,
            ..Default::default()
        };
    }
    ContactClass {
        ground: false,
        steep: up_dot > STEEP_MIN_UP_DOT,
        climb: up_dot >= thresholds.min_climb_dot,
    }
}

/// Contact normals summed over one tick, bucketed by class.
#[derive(Clone, Copy, Debug)]
pub struct ContactSet {
    pub ground_normal: Vector<Real>,
    pub ground_count: u32,
    pub steep_normal: Vector<Real>,
    pub steep_count: u32,
    pub climb_normal: Vector<Real>,
    pub climb_count: u32,
    pub last_climb_normal: Vector<Real>,
}

impl Default for ContactSet {
    fn default() -> Self {
        Self {
            ground_normal: Vector::zeros(),
            ground_count: 0,
            steep_normal: Vector::zeros(),
            steep_count: 0,
            climb_normal: Vector::zeros(),
            climb_count: 0,
            last_climb_normal: Vector::zeros(),
        }
    }
}

impl ContactSet {
    pub fn add(&mut self, normal: Vector<Real>, class: ContactClass) {
        if class.ground {
            self.ground_normal += normal;
            self.ground_count += 1;
        }
        if class.steep {
            self.steep_normal += normal;
            self.steep_count += 1;
        }
        if class.climb {
            self.climb_normal += normal;
            self.climb_count += 1;
            self.last_climb_normal = normal;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ground_count == 0 && self.steep_count == 0 && self.climb_count == 0
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Normalized steep sum, used for wall jumps when nothing else supports the body.
    pub fn steep_direction(&self) -> Option<Vector<Real>> {
        if self.steep_count == 0 {
            return None;
        }
        self.steep_normal.try_normalize(1.0e-6)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceResolution {
    pub state: SurfaceState,
    pub normal: Vector<Real>,
    pub snapped: bool,
}

impl SurfaceResolution {
    pub fn airborne(up_axis: Vector<Real>) -> Self {
        Self {
            state: SurfaceState::Airborne,
            normal: up_axis,
            snapped: false,
        }
    }
}

/// Picks the supporting surface for this tick.
///
/// Order is fixed: climbing, ground contacts, ground snap, steep wedge, airborne.
/// `snap` runs only when neither climbing nor ground contacts apply and returns the
/// probed ground normal on success.
pub fn resolve_surface(
    contacts: &ContactSet,
    thresholds: &SurfaceThresholds,
    up_axis: Vector<Real>,
    steps_since_last_jump: u32,
    snap: impl FnOnce() -> Option<Vector<Real>>,
) -> SurfaceResolution {
    if contacts.climb_count > 0 && steps_since_last_jump > JUMP_GRACE_STEPS {
        let mut normal = contacts
            .climb_normal
            .try_normalize(1.0e-6)
            .unwrap_or(contacts.last_climb_normal);
        // Opposite walls in a corner can sum to something walkable; keep climbing the last wall.
        if contacts.climb_count > 1 && normal.dot(&up_axis) >= thresholds.min_ground_dot {
            normal = contacts.last_climb_normal;
        }
        return SurfaceResolution {
            state: SurfaceState::Climbing,
            normal,
            snapped: false,
        };
    }

    if contacts.ground_count > 0 {
        if let Some(normal) = contacts.ground_normal.try_normalize(1.0e-6) {
            return SurfaceResolution {
                state: SurfaceState::Ground,
                normal,
                snapped: false,
            };
        }
    }

    if let Some(normal) = snap() {
        return SurfaceResolution {
            state: SurfaceState::Ground,
            normal,
            snapped: true,
        };
    }

    if contacts.steep_count > 1 {
        if let Some(normal) = contacts.steep_normal.try_normalize(1.0e-6) {
            if normal.dot(&up_axis) >= thresholds.min_ground_dot {
                return SurfaceResolution {
                    state: SurfaceState::Steep,
                    normal,
                    snapped: false,
                };
            }
        }
    }

    SurfaceResolution::airborne(up_axis)
}
