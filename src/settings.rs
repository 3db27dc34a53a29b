//! Simulation tunables, loadable from configuration files.

use serde::Deserialize;

use crate::math::{Real, Vec3};

/// Solver and pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    /// Gauss-Seidel sweeps over all constraints every step.
    pub velocity_iterations: u8,
    /// How many of the last velocity iterations also correct positions.
    ///
    /// Clamped to `velocity_iterations`.
    pub position_iterations: u8,
    /// Fraction of the positional error corrected per position iteration.
    pub baumgarte_factor: Real,
    /// Allowed penetration left uncorrected to keep contacts stable.
    pub linear_slop: Real,
    /// Closing speed below which contacts don't bounce.
    pub min_velocity_for_restitution: Real,
    /// Steps an untouched cache entry survives before eviction.
    pub frames_to_retain_cache: u8,
    /// Displacement in one step above which a body counts as fast moving.
    pub minimal_displacement: Real,
    /// Fraction of the last step rolled back for fast movers so contacts
    /// fire just before penetration.
    pub time_of_impact_bias: Real,
    /// Separation distance below which a pair is reported as proximal.
    pub proximity_epsilon: Real,
    /// Rigid body integration settings.
    pub rigid_body: RigidBodySettings,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            velocity_iterations: 8,
            position_iterations: 3,
            baumgarte_factor: 0.2,
            linear_slop: 0.005,
            min_velocity_for_restitution: 1.0,
            frames_to_retain_cache: 10,
            minimal_displacement: 0.025,
            time_of_impact_bias: 0.01,
            proximity_epsilon: 0.1,
            rigid_body: RigidBodySettings::default(),
        }
    }
}

/// Integrator settings shared by all rigid bodies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RigidBodySettings {
    /// Acceleration applied to every dynamic body each step.
    pub gravity: Vec3,
    /// Velocity kept per second, applied as `linear_damping^dt`.
    pub linear_damping: Real,
    /// Angular velocity kept per second, applied as `angular_damping^dt`.
    pub angular_damping: Real,
    /// Smoothed motion below which a body may fall asleep.
    pub sleep_epsilon: Real,
    /// Upper clamp of the smoothed motion metric.
    pub max_motion: Real,
    /// Motion assigned on wake so a body doesn't instantly sleep again.
    pub least_motion: Real,
}

impl Default for RigidBodySettings {
    fn default() -> Self {
        let sleep_epsilon = 1e-5;

        Self {
            gravity: Vec3::new(0.0, -9.8, 0.0),
            linear_damping: 0.5,
            angular_damping: 0.5,
            sleep_epsilon,
            max_motion: sleep_epsilon * 10.0,
            least_motion: sleep_epsilon * 1.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Settings must deserialize with partial overrides.
    #[test]
    fn test_partial_deserialize() {
        let json = r#"{ "velocity_iterations": 12, "rigid_body": { "sleep_epsilon": 0.001 } }"#;
        let settings: PhysicsSettings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.velocity_iterations, 12);
        assert_eq!(settings.position_iterations, 3);
        assert!((settings.rigid_body.sleep_epsilon - 0.001).abs() < 1e-9);
    }
}
