//! Movement settings file format and validation.

use std::fmt;
use std::path::{Path, PathBuf};

use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

use crate::MovementConfig;

pub const MOVEMENT_SETTINGS_VERSION: u32 = 1;

/// Host-facing movement tuning; angles are in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementSettings {
    pub version: u32,
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub air_max_acceleration: f32,
    pub jump_strength: f32,
    pub ground_max_angle_deg: f32,
    pub gravity_scale: f32,
    pub standable_layer_mask: u32,
    pub climb_max_speed: f32,
    pub climb_max_acceleration: f32,
    pub climb_max_angle_deg: f32,
    #[serde(default)]
    pub input_reference_yaw_deg: Option<f32>,
    #[serde(default = "default_jump_buffer_window")]
    pub jump_buffer_window: f32,
    #[serde(default = "default_snap_probe_distance")]
    pub snap_probe_distance: f32,
    #[serde(default = "default_snap_speed_fraction")]
    pub snap_speed_fraction: f32,
}

fn default_jump_buffer_window() -> f32 {
    MovementConfig::default().jump_buffer_window
}

fn default_snap_probe_distance() -> f32 {
    MovementConfig::default().snap_probe_distance
}

fn default_snap_speed_fraction() -> f32 {
    MovementConfig::default().snap_speed_fraction
}

impl Default for MovementSettings {
    fn default() -> Self {
        let config = MovementConfig::default();
        Self {
            version: MOVEMENT_SETTINGS_VERSION,
            max_speed: config.max_speed,
            max_acceleration: config.max_acceleration,
            air_max_acceleration: config.air_max_acceleration,
            jump_strength: config.jump_strength,
            ground_max_angle_deg: config.ground_max_angle.to_degrees(),
            gravity_scale: config.gravity_scale,
            standable_layer_mask: config.standable_layer_mask,
            climb_max_speed: config.climb_max_speed,
            climb_max_acceleration: config.climb_max_acceleration,
            climb_max_angle_deg: config.climb_max_angle.to_degrees(),
            input_reference_yaw_deg: None,
            jump_buffer_window: config.jump_buffer_window,
            snap_probe_distance: config.snap_probe_distance,
            snap_speed_fraction: config.snap_speed_fraction,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MovementSettingsValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl MovementSettingsValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug)]
pub enum MovementSettingsError {
    Read { path: PathBuf, message: String },
    Parse { path: PathBuf, message: String },
    Invalid { path: PathBuf, errors: Vec<String> },
}

impl fmt::Display for MovementSettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementSettingsError::Read { path, message } => {
                write!(f, "movement settings read failed ({}): {}", path.display(), message)
            }
            MovementSettingsError::Parse { path, message } => {
                write!(f, "movement settings parse failed ({}): {}", path.display(), message)
            }
            MovementSettingsError::Invalid { path, errors } => write!(
                f,
                "movement settings invalid ({}): {}",
                path.display(),
                errors.join("; ")
            ),
        }
    }
}

impl std::error::Error for MovementSettingsError {}

impl MovementSettings {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string(self).map_err(|err| err.to_string())
    }

    pub fn from_config(config: &MovementConfig) -> Self {
        let input_reference_yaw_deg = config.input_reference_frame.map(|rotation| {
            let forward = rotation * -Vector::z();
            forward.x.atan2(-forward.z).to_degrees()
        });
        Self {
            version: MOVEMENT_SETTINGS_VERSION,
            max_speed: config.max_speed,
            max_acceleration: config.max_acceleration,
            air_max_acceleration: config.air_max_acceleration,
            jump_strength: config.jump_strength,
            ground_max_angle_deg: config.ground_max_angle.to_degrees(),
            gravity_scale: config.gravity_scale,
            standable_layer_mask: config.standable_layer_mask,
            climb_max_speed: config.climb_max_speed,
            climb_max_acceleration: config.climb_max_acceleration,
            climb_max_angle_deg: config.climb_max_angle.to_degrees(),
            input_reference_yaw_deg,
            jump_buffer_window: config.jump_buffer_window,
            snap_probe_distance: config.snap_probe_distance,
            snap_speed_fraction: config.snap_speed_fraction,
        }
    }

    pub fn to_config(&self) -> MovementConfig {
        MovementConfig {
            max_speed: self.max_speed,
            max_acceleration: self.max_acceleration,
            air_max_acceleration: self.air_max_acceleration,
            jump_strength: self.jump_strength,
            ground_max_angle: self.ground_max_angle_deg.to_radians(),
            gravity_scale: self.gravity_scale,
            standable_layer_mask: self.standable_layer_mask,
            climb_max_speed: self.climb_max_speed,
            climb_max_acceleration: self.climb_max_acceleration,
            climb_max_angle: self.climb_max_angle_deg.to_radians(),
            input_reference_frame: self.input_reference_yaw_deg.map(yaw_rotation),
            jump_buffer_window: self.jump_buffer_window,
            snap_probe_distance: self.snap_probe_distance,
            snap_speed_fraction: self.snap_speed_fraction,
        }
    }

    pub fn validate(&self) -> MovementSettingsValidation {
        let mut validation = MovementSettingsValidation::default();

        if self.version != MOVEMENT_SETTINGS_VERSION {
            validation
                .errors
                .push(format!("unsupported version {}", self.version));
        }

        for (name, value) in [
            ("max_speed", self.max_speed),
            ("max_acceleration", self.max_acceleration),
            ("air_max_acceleration", self.air_max_acceleration),
            ("jump_strength", self.jump_strength),
            ("climb_max_speed", self.climb_max_speed),
            ("climb_max_acceleration", self.climb_max_acceleration),
            ("jump_buffer_window", self.jump_buffer_window),
            ("snap_probe_distance", self.snap_probe_distance),
            ("snap_speed_fraction", self.snap_speed_fraction),
        ] {
            if !value.is_finite() || value < 0.0 {
                validation
                    .errors
                    .push(format!("{} must be finite and >= 0", name));
            }
        }

        if !self.gravity_scale.is_finite() {
            validation
                .errors
                .push("gravity_scale must be finite".to_string());
        } else if self.gravity_scale < 0.0 {
            validation
                .warnings
                .push("gravity_scale is negative; gravity will push away from ground".to_string());
        }

        let ground = self.ground_max_angle_deg;
        if !ground.is_finite() || !(0.0..=90.0).contains(&ground) {
            validation
                .errors
                .push("ground_max_angle_deg must be within [0, 90]".to_string());
        }
        let climb = self.climb_max_angle_deg;
        if !climb.is_finite() || !(0.0..=180.0).contains(&climb) {
            validation
                .errors
                .push("climb_max_angle_deg must be within [0, 180]".to_string());
        } else if ground.is_finite() && climb < ground {
            validation.errors.push(format!(
                "climb_max_angle_deg {} is below ground_max_angle_deg {}",
                climb, ground
            ));
        } else if climb == ground {
            validation
                .warnings
                .push("climb_max_angle_deg equals ground_max_angle_deg; climbing is disabled".to_string());
        }

        if let Some(yaw) = self.input_reference_yaw_deg {
            if !yaw.is_finite() {
                validation
                    .errors
                    .push("input_reference_yaw_deg must be finite".to_string());
            }
        }

        if self.standable_layer_mask == 0 {
            validation
                .warnings
                .push("standable_layer_mask is empty; ground snapping never hits".to_string());
        }

        if self.snap_speed_fraction > 1.0 {
            validation.warnings.push(format!(
                "snap_speed_fraction {} allows snapping above max_speed",
                self.snap_speed_fraction
            ));
        }

        validation
    }
}

/// Rotation about +Y; yaw 0 faces -Z and positive yaw turns toward +X.
pub fn yaw_rotation(yaw_deg: f32) -> Rotation<Real> {
    Rotation::from_axis_angle(&Vector::y_axis(), -yaw_deg.to_radians())
}

pub fn load_movement_settings(path: &Path) -> Result<MovementSettings, MovementSettingsError> {
    let contents = std::fs::read_to_string(path).map_err(|err| MovementSettingsError::Read {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    let settings =
        MovementSettings::parse_toml(&contents).map_err(|message| MovementSettingsError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
    let validation = settings.validate();
    if !validation.is_ok() {
        return Err(MovementSettingsError::Invalid {
            path: path.to_path_buf(),
            errors: validation.errors,
        });
    }
    for warning in &validation.warnings {
        engine_core::logging::warn(format!(
            "movement settings ({}): {}",
            path.display(),
            warning
        ));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let validation = MovementSettings::default().validate();
        assert!(validation.is_ok(), "{:?}", validation.errors);
        assert!(validation.warnings.is_empty(), "{:?}", validation.warnings);
    }

    #[test]
    fn parses_minimal_document_with_defaults() {
        let text = r#"
version = 1
max_speed = 8.0
max_acceleration = 30.0
air_max_acceleration = 4.0
jump_strength = 6.0
ground_max_angle_deg = 30.0
gravity_scale = 2.0
standable_layer_mask = 3
climb_max_speed = 3.0
climb_max_acceleration = 25.0
climb_max_angle_deg = 120.0
"#;
        let settings = MovementSettings::parse_toml(text).expect("parse");
        assert_eq!(settings.input_reference_yaw_deg, None);
        assert_eq!(settings.jump_buffer_window, 0.2);
        assert_eq!(settings.snap_probe_distance, 0.5);
        let config = settings.to_config();
        assert_eq!(config.standable_layer_mask, 3);
        assert!((config.ground_max_angle - 30.0_f32.to_radians()).abs() < 1.0e-6);
        assert!((config.thresholds().min_ground_dot - 30.0_f32.to_radians().cos()).abs() < 1.0e-6);
    }

    #[test]
    fn rejects_out_of_range_angles() {
        let settings = MovementSettings {
            ground_max_angle_deg: 95.0,
            climb_max_angle_deg: 200.0,
            ..Default::default()
        };
        let validation = settings.validate();
        assert_eq!(validation.errors.len(), 2);

        let settings = MovementSettings {
            ground_max_angle_deg: 60.0,
            climb_max_angle_deg: 40.0,
            ..Default::default()
        };
        assert!(!settings.validate().is_ok());
    }

    #[test]
    fn rejects_negative_speeds() {
        let settings = MovementSettings {
            max_speed: -1.0,
            jump_strength: f32::NAN,
            ..Default::default()
        };
        let validation = settings.validate();
        assert_eq!(validation.errors.len(), 2);
    }

    #[test]
    fn warns_on_empty_layer_mask() {
        let settings = MovementSettings {
            standable_layer_mask: 0,
            ..Default::default()
        };
        let validation = settings.validate();
        assert!(validation.is_ok());
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn reference_yaw_survives_config_conversion() {
        let settings = MovementSettings {
            input_reference_yaw_deg: Some(90.0),
            ..Default::default()
        };
        let config = settings.to_config();
        let frame = config.input_reference_frame.expect("frame");
        let forward = frame * -Vector::z();
        assert!((forward - Vector::x()).norm() < 1.0e-5);
        let back = MovementSettings::from_config(&config);
        let yaw = back.input_reference_yaw_deg.expect("yaw");
        assert!((yaw - 90.0).abs() < 1.0e-3);
    }

    #[test]
    fn toml_output_parses_back() {
        let settings = MovementSettings {
            input_reference_yaw_deg: Some(45.0),
            ..Default::default()
        };
        let text = settings.to_toml().expect("serialize");
        let parsed = MovementSettings::parse_toml(&text).expect("parse");
        assert_eq!(parsed, settings);
    }

    #[test]
    fn load_reports_missing_file() {
        let path = std::env::temp_dir().join("character_motor_rigid_missing_settings.toml");
        let err = load_movement_settings(&path).expect_err("missing file");
        assert!(matches!(err, MovementSettingsError::Read { .. }));
    }
}
