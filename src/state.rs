//! Ankle flexibility state representation
//!
//! The state of the flexibility along one horizontal axis is
//! `x = (xi, theta, dxi, dtheta, k_theta)` where
//! - xi: position of the center of mass in a frame rotating with the ankle
//! - theta: rotation angle of that frame with respect to the world frame
//! - dxi, dtheta: their time derivatives
//! - k_theta: angular stiffness of the flexibility

use nalgebra::{SVector, Vector4};

use crate::error::{expect_finite, expect_len, StabilizerError};

pub type StateVector = SVector<f64, 5>;

/// Full flexibility state along one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexibilityState {
    pub xi: f64,
    pub theta: f64,
    pub dxi: f64,
    pub dtheta: f64,
    pub k_theta: f64,
}

impl FlexibilityState {
    pub fn new(xi: f64, theta: f64, dxi: f64, dtheta: f64, k_theta: f64) -> Self {
        Self {
            xi,
            theta,
            dxi,
            dtheta,
            k_theta,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }

    /// Undeformed, motionless flexibility with stiffness `k_theta`
    pub fn at_rest(k_theta: f64) -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, k_theta)
    }

    /// Read a state from a 5-vector as produced by an estimator
    pub fn from_slice(values: &[f64]) -> Result<Self, StabilizerError> {
        expect_len("flexibility state", values, 5)?;
        expect_finite("flexibility state", values)?;
        Ok(Self::new(values[0], values[1], values[2], values[3], values[4]))
    }

    pub fn to_vector(&self) -> StateVector {
        StateVector::new(self.xi, self.theta, self.dxi, self.dtheta, self.k_theta)
    }

    pub fn from_vector(v: &StateVector) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4])
    }

    /// Drop the stiffness component
    pub fn reduced(&self) -> AxisFlexibility {
        AxisFlexibility::new(self.xi, self.theta, self.dxi, self.dtheta)
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

impl Default for FlexibilityState {
    fn default() -> Self {
        Self::zero()
    }
}

/// Flexibility state along one axis without the stiffness estimate, as
/// consumed by the stabilizer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisFlexibility {
    pub xi: f64,
    pub theta: f64,
    pub dxi: f64,
    pub dtheta: f64,
}

impl AxisFlexibility {
    pub fn new(xi: f64, theta: f64, dxi: f64, dtheta: f64) -> Self {
        Self {
            xi,
            theta,
            dxi,
            dtheta,
        }
    }

    /// Read `(xi, theta, dxi, dtheta)` from a 4-vector
    pub fn from_slice(context: &'static str, values: &[f64]) -> Result<Self, StabilizerError> {
        expect_len(context, values, 4)?;
        expect_finite(context, values)?;
        Ok(Self::new(values[0], values[1], values[2], values[3]))
    }

    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.xi, self.theta, self.dxi, self.dtheta)
    }
}
