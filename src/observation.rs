//! Observation of the ankle flexibility
//!
//! ```text
//! y = h(x) = (xi, k_theta * theta)
//! ```
//!
//! The second component is the elastic torque of the flexibility.

use nalgebra::{SMatrix, Vector2};

use crate::error::StabilizerError;
use crate::params::{validate_time_period, DEFAULT_TIME_PERIOD};
use crate::signal::{TimeCache, TimeIndex};
use crate::state::FlexibilityState;
use crate::ConfigError;

pub type ObservationJacobian = SMatrix<f64, 2, 5>;

/// Measurement predicted from a flexibility state
pub fn observe(x: &FlexibilityState) -> Vector2<f64> {
    Vector2::new(x.xi, x.k_theta * x.theta)
}

/// Jacobian of [`observe`] with respect to the state
pub fn observation_jacobian(x: &FlexibilityState) -> ObservationJacobian {
    let mut h = ObservationJacobian::zeros();
    h[(0, 0)] = 1.0;
    h[(1, 1)] = x.k_theta;
    h[(1, 4)] = x.theta;
    h
}

/// Time-indexed evaluation of the observation model for a host loop
#[derive(Debug, Clone)]
pub struct ObservationNode {
    dt: f64,
    observation: TimeCache<Vector2<f64>>,
    jacobian: TimeCache<ObservationJacobian>,
}

impl ObservationNode {
    pub fn new() -> Self {
        Self {
            dt: DEFAULT_TIME_PERIOD,
            observation: TimeCache::new(),
            jacobian: TimeCache::new(),
        }
    }

    /// Sampling period of the host loop; the observation itself does not
    /// depend on it
    pub fn time_period(&self) -> f64 {
        self.dt
    }

    pub fn set_time_period(&mut self, dt: f64) -> Result<(), ConfigError> {
        validate_time_period(dt)?;
        self.dt = dt;
        Ok(())
    }

    pub fn observation(
        &mut self,
        time: TimeIndex,
        state: &[f64],
    ) -> Result<&Vector2<f64>, StabilizerError> {
        self.observation.get_or_try_compute(time, || {
            let x = FlexibilityState::from_slice(state)?;
            Ok(observe(&x))
        })
    }

    pub fn jacobian(
        &mut self,
        time: TimeIndex,
        state: &[f64],
    ) -> Result<&ObservationJacobian, StabilizerError> {
        self.jacobian.get_or_try_compute(time, || {
            let x = FlexibilityState::from_slice(state)?;
            Ok(observation_jacobian(&x))
        })
    }
}

impl Default for ObservationNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_observation_is_position_and_torque() {
        let x = FlexibilityState::new(0.03, 0.01, 0.5, 0.2, 425.0);
        let y = observe(&x);
        assert_eq!(y[0], 0.03);
        assert_eq!(y[1], 4.25);
    }

    #[test]
    fn test_jacobian_entries() {
        let x = FlexibilityState::new(0.03, 0.01, 0.5, 0.2, 425.0);
        let h = observation_jacobian(&x);
        assert_eq!(h[(0, 0)], 1.0);
        assert_eq!(h[(1, 1)], 425.0);
        assert_eq!(h[(1, 4)], 0.01);
        let nonzero = h.iter().filter(|v| **v != 0.0).count();
        assert_eq!(nonzero, 3);
    }

    #[test]
    fn test_node_caches_and_validates() {
        let mut node = ObservationNode::new();
        let y = *node.observation(1, &[0.1, 0.2, 0.0, 0.0, 10.0]).unwrap();
        assert_eq!(y, Vector2::new(0.1, 2.0));
        let cached = *node.observation(1, &[0.0; 5]).unwrap();
        assert_eq!(cached, y);
        assert!(node.observation(2, &[0.0; 3]).is_err());
        assert!(node.jacobian(2, &[f64::NAN, 0.0, 0.0, 0.0, 0.0]).is_err());
        assert!(node.set_time_period(f64::NAN).is_err());
        assert_eq!(node.time_period(), 0.005);
    }

    proptest! {
        #[test]
        fn prop_jacobian_matches_finite_difference(
            xi in -1.0f64..1.0,
            theta in -0.5f64..0.5,
            dxi in -1.0f64..1.0,
            dtheta in -1.0f64..1.0,
            k in 1.0f64..800.0,
        ) {
            let x = FlexibilityState::new(xi, theta, dxi, dtheta, k);
            let h = observation_jacobian(&x);
            let step = 1e-6;
            for col in 0..5 {
                let mut plus = x.to_vector();
                let mut minus = x.to_vector();
                plus[col] += step;
                minus[col] -= step;
                let fd = (observe(&FlexibilityState::from_vector(&plus))
                    - observe(&FlexibilityState::from_vector(&minus)))
                    / (2.0 * step);
                for row in 0..2 {
                    prop_assert!((h[(row, col)] - fd[row]).abs() < 1e-5);
                }
            }
        }
    }
}
