//! Support phases and their feedback laws
//!
//! Each phase maps the COM error, the flexibility state and the correction
//! held from the previous cycle to a new correction. The laws are pure: the
//! controller commits their result only when the whole cycle succeeds.

use nalgebra::Vector2;

use crate::error::StabilizerError;
use crate::params::ControlGains;
use crate::state::AxisFlexibility;

/// Feet closer than this in the ground plane do not define a support axis [m]
pub const MIN_FOOT_SEPARATION: f64 = 1e-9;

/// Number of feet in contact with the ground
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SupportPhase {
    #[default]
    NoSupport,
    Single,
    Double,
}

impl SupportPhase {
    pub fn index(self) -> u8 {
        match self {
            SupportPhase::NoSupport => 0,
            SupportPhase::Single => 1,
            SupportPhase::Double => 2,
        }
    }

    /// Classify contact from the vertical force measured under each foot
    pub fn from_normal_forces(left_fz: f64, right_fz: f64, threshold: f64) -> Self {
        let contacts = [left_fz, right_fz]
            .iter()
            .filter(|&&fz| fz > threshold)
            .count();
        match contacts {
            0 => SupportPhase::NoSupport,
            1 => SupportPhase::Single,
            _ => SupportPhase::Double,
        }
    }
}

/// Correction carried from one cycle to the next
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Correction {
    /// Corrective COM velocity along x
    pub dx: f64,
    /// Corrective COM velocity along y
    pub dy: f64,
    /// Last corrective acceleration along x
    pub ddx: f64,
    /// Last corrective acceleration along y
    pub ddy: f64,
}

/// Inputs of a phase law, sampled at a single time index
#[derive(Debug, Clone, Copy)]
pub struct PhaseInputs {
    /// Horizontal COM error
    pub com_error: Vector2<f64>,
    pub flex_x: AxisFlexibility,
    pub flex_y: AxisFlexibility,
    /// Horizontal position of the left foot
    pub left_foot: Vector2<f64>,
    /// Horizontal position of the right foot
    pub right_foot: Vector2<f64>,
}

/// Per-axis flexibility angle and rate used by the double support law
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SupportFlexibility {
    pub angle: Vector2<f64>,
    pub rate: Vector2<f64>,
}

/// Result of a phase law
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseOutcome {
    pub correction: Correction,
    /// Intermediate terms, laid out as the first ten debug entries
    pub terms: [f64; 10],
}

/// Phase-independent settings of the laws
#[derive(Debug, Clone, Copy)]
pub struct PhaseLaws {
    pub single_support_gains: ControlGains,
    pub double_support_gains: ControlGains,
    pub time_period: f64,
}

impl PhaseLaws {
    pub fn evaluate(
        &self,
        phase: SupportPhase,
        inputs: &PhaseInputs,
        support_flex: &SupportFlexibility,
        previous: Correction,
    ) -> Result<PhaseOutcome, StabilizerError> {
        match phase {
            SupportPhase::NoSupport => Ok(no_support(inputs, previous)),
            SupportPhase::Single => Ok(self.single_support(inputs, previous)),
            SupportPhase::Double => self.double_support(inputs, support_flex, previous),
        }
    }

    /// Per-axis flexibility feedback, integrated into the held velocity
    fn single_support(&self, inputs: &PhaseInputs, previous: Correction) -> PhaseOutcome {
        let gains = &self.single_support_gains;
        let dt = self.time_period;
        let x = inputs.com_error.x;
        let y = inputs.com_error.y;
        let fx = &inputs.flex_x;
        let fy = &inputs.flex_y;

        let ddx = gains.feedback(x, fx.theta, previous.dx, fx.dtheta);
        let ddy = gains.feedback(y, fy.theta, previous.dy, fy.dtheta);

        PhaseOutcome {
            correction: Correction {
                dx: previous.dx + dt * ddx,
                dy: previous.dy + dt * ddy,
                ddx,
                ddy,
            },
            terms: [
                x,
                fx.theta,
                previous.dx,
                fx.dtheta,
                ddx,
                y,
                fy.theta,
                previous.dy,
                fy.dtheta,
                ddy,
            ],
        }
    }

    /// Flexibility feedback across the line joining the feet, critically
    /// damped regulation along it
    fn double_support(
        &self,
        inputs: &PhaseInputs,
        support_flex: &SupportFlexibility,
        previous: Correction,
    ) -> Result<PhaseOutcome, StabilizerError> {
        let dt = self.time_period;
        let delta = inputs.left_foot - inputs.right_foot;
        let separation = delta.norm();
        if separation.is_nan() || separation <= MIN_FOOT_SEPARATION {
            return Err(StabilizerError::DegenerateSupportAxis { separation });
        }

        // u2 points from the right foot to the left one, u1 is orthogonal.
        let u2 = delta / separation;
        let u1 = Vector2::new(u2.y, -u2.x);
        let error = inputs.com_error;
        let velocity = Vector2::new(previous.dx, previous.dy);

        let theta = -u2.dot(&support_flex.angle);
        let dtheta = -u2.dot(&support_flex.rate);
        let xi = u1.dot(&error);
        let dxi = u1.dot(&velocity);
        let ddxi = self
            .double_support_gains
            .feedback(xi, theta, dxi, dtheta);

        let lat = u2.dot(&error);
        let dlat = u2.dot(&velocity);
        let ddlat = -2.0 * dlat - lat;

        let ddx = ddxi * u1.x;
        let ddy = ddxi * u1.y;

        Ok(PhaseOutcome {
            correction: Correction {
                dx: previous.dx + dt * (ddx + ddlat * u2.x),
                dy: previous.dy + dt * (ddy + ddlat * u2.y),
                ddx,
                ddy,
            },
            terms: [xi, theta, dxi, dtheta, ddxi, lat, 0.0, dlat, 0.0, ddlat],
        })
    }
}

/// Direct cancellation of the COM error, no integration
fn no_support(inputs: &PhaseInputs, previous: Correction) -> PhaseOutcome {
    PhaseOutcome {
        correction: Correction {
            dx: -inputs.com_error.x,
            dy: -inputs.com_error.y,
            ..previous
        },
        terms: [0.0; 10],
    }
}
