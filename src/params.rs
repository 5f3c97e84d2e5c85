//! Stabilizer Parameters
//!
//! Physical constants, feedback gains and sampling period shared by the
//! stabilizer and the flexibility models

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{expect_len, ConfigError, StabilizerError};
use crate::phase::SupportPhase;
use crate::state::FlexibilityState;

/// Default sampling period of the control loop [s]
pub const DEFAULT_TIME_PERIOD: f64 = 0.005;

/// Time-invariant physical constants of the flexible-ankle model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalConstants {
    /// Robot mass [kg]
    pub mass: f64,
    /// Gravity [m/s^2]
    pub gravity: f64,
    /// Height of the center of mass above the flexibility [m]
    pub zeta: f64,
}

impl PhysicalConstants {
    /// Create a new set of constants
    pub fn new(mass: f64, gravity: f64, zeta: f64) -> Self {
        Self {
            mass,
            gravity,
            zeta,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("constants.mass", self.mass)?;
        positive("constants.gravity", self.gravity)?;
        // zeta > 0 keeps xi^2 + zeta^2 away from zero in the model.
        positive("constants.zeta", self.zeta)
    }
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            mass: 56.0,
            gravity: 9.81,
            zeta: 0.80,
        }
    }
}

/// Feedback gains applied to a (position, angle, velocity, angular velocity)
/// error tuple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlGains {
    /// Gain on position error
    pub k_p: f64,
    /// Gain on flexibility angle
    pub k_p_theta: f64,
    /// Gain on velocity
    pub k_d: f64,
    /// Gain on flexibility angular velocity
    pub k_d_theta: f64,
}

impl ControlGains {
    /// Create new gains
    pub fn new(k_p: f64, k_p_theta: f64, k_d: f64, k_d_theta: f64) -> Self {
        Self {
            k_p,
            k_p_theta,
            k_d,
            k_d_theta,
        }
    }

    /// Tuned gains for single support
    pub fn single_support() -> Self {
        Self::new(
            177.573_033_176_470_63,
            -29.735_033_684_033_631,
            54.413_552_941_176_476,
            -27.530_842_352_941_178,
        )
    }

    /// Tuned gains for double support
    pub fn double_support() -> Self {
        Self::new(
            82.655_266_588_235_293,
            36.712_572_443_697_468,
            27.206_776_470_588_238,
            -5.765_421_176_470_59,
        )
    }

    /// Build gains from a 4-vector `(k_p, k_p_theta, k_d, k_d_theta)`
    pub fn from_slice(values: &[f64]) -> Result<Self, StabilizerError> {
        expect_len("gains", values, 4)?;
        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.k_p, self.k_p_theta, self.k_d, self.k_d_theta]
    }

    /// Acceleration `-(k_p*pos + k_p_theta*angle + k_d*vel + k_d_theta*rate)`
    pub fn feedback(&self, pos: f64, angle: f64, vel: f64, rate: f64) -> f64 {
        -(self.k_p * pos + self.k_p_theta * angle + self.k_d * vel + self.k_d_theta * rate)
    }

    pub(crate) fn validate(&self, which: &'static str) -> Result<(), ConfigError> {
        if self.to_array().iter().all(|g| g.is_finite()) {
            Ok(())
        } else {
            Err(ConfigError::InvalidGains {
                which,
                reason: "all gains must be finite".to_string(),
            })
        }
    }
}

/// Parameters of the balance stabilizer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerParams {
    /// Sampling period [s]
    pub time_period: f64,
    /// Normal force above which a foot is considered in contact [N]
    pub force_threshold: f64,
    /// Nominal angular stiffness of each ankle flexibility [N.m/rad]
    pub angular_stiffness: f64,
    /// Consecutive failed cycles before the failure is escalated
    pub failure_escalation_cycles: u32,
    /// Gains used in single support
    pub single_support_gains: ControlGains,
    /// Gains used in double support
    pub double_support_gains: ControlGains,
    /// Physical constants shared with the flexibility models
    pub constants: PhysicalConstants,
}

impl StabilizerParams {
    /// Create default parameters matching the tuned humanoid
    pub fn default_params() -> Self {
        Self {
            time_period: DEFAULT_TIME_PERIOD,
            single_support_gains: ControlGains::single_support(),
            double_support_gains: ControlGains::double_support(),
            force_threshold: 20.0,
            angular_stiffness: 425.0,
            failure_escalation_cycles: 10,
            constants: PhysicalConstants::default(),
        }
    }

    /// Parse parameters from a TOML document; missing keys take defaults
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let params: Self = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render the parameters as a TOML document accepted by [`Self::load`]
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_time_period(self.time_period)?;
        self.single_support_gains.validate("single support")?;
        self.double_support_gains.validate("double support")?;
        if !self.force_threshold.is_finite() || self.force_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "force_threshold",
                message: format!("{} must be finite and >= 0", self.force_threshold),
            });
        }
        positive("angular_stiffness", self.angular_stiffness)?;
        if self.failure_escalation_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                field: "failure_escalation_cycles",
                message: "must be greater than zero".to_string(),
            });
        }
        self.constants.validate()
    }

    /// Flexibility state at rest with the nominal stiffness, used to seed
    /// an estimator
    pub fn initial_flexibility_state(&self) -> FlexibilityState {
        FlexibilityState::at_rest(self.angular_stiffness)
    }

    /// Support phase from the normal force under each foot
    pub fn classify_support(&self, left_fz: f64, right_fz: f64) -> SupportPhase {
        SupportPhase::from_normal_forces(left_fz, right_fz, self.force_threshold)
    }
}

impl Default for StabilizerParams {
    fn default() -> Self {
        Self::default_params()
    }
}

/// Reject non-finite, negative or zero sampling periods
pub fn validate_time_period(dt: f64) -> Result<(), ConfigError> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimePeriod(dt))
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            message: format!("{value} must be finite and > 0"),
        })
    }
}
