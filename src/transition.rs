//! State transition of the time-discretized ankle flexibility
//!
//! ```text
//! x_{k+1} = f(x_k, u_k),   u_k = d²xi/dt² at step k
//! ```
//!
//! The stiffness `k_theta` follows a random walk, so the noiseless
//! prediction holds it constant.

use nalgebra::SMatrix;

use crate::error::{expect_finite, expect_len, StabilizerError};
use crate::params::{validate_time_period, PhysicalConstants, DEFAULT_TIME_PERIOD};
use crate::signal::{TimeCache, TimeIndex};
use crate::state::FlexibilityState;
use crate::ConfigError;

pub type TransitionJacobian = SMatrix<f64, 5, 5>;

/// Discrete-time flexibility dynamics `f` and its Jacobian
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlexibilityDynamics {
    constants: PhysicalConstants,
    dt: f64,
}

impl FlexibilityDynamics {
    pub fn new(constants: PhysicalConstants, dt: f64) -> Result<Self, ConfigError> {
        constants.validate()?;
        validate_time_period(dt)?;
        Ok(Self { constants, dt })
    }

    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    pub fn time_period(&self) -> f64 {
        self.dt
    }

    /// Change the integration step; an invalid value keeps the current one
    pub fn set_time_period(&mut self, dt: f64) -> Result<(), ConfigError> {
        validate_time_period(dt)?;
        self.dt = dt;
        Ok(())
    }

    /// Euler step of the flexibility dynamics under control `u`
    pub fn predict(&self, x: &FlexibilityState, u: f64) -> FlexibilityState {
        let PhysicalConstants {
            mass: m,
            gravity: g,
            zeta,
        } = self.constants;
        let dt = self.dt;
        let (sin_th, cos_th) = x.theta.sin_cos();
        let d2 = x.xi * x.xi + zeta * zeta;

        let ddtheta = (-x.k_theta * x.theta - m * g * (cos_th * x.xi - sin_th * zeta)
            + m * (zeta * u - 2.0 * x.theta * x.xi * x.dxi))
            / (m * d2);

        FlexibilityState {
            xi: x.xi + dt * x.dxi,
            theta: x.theta + dt * x.dtheta,
            dxi: x.dxi + dt * u,
            dtheta: x.dtheta + dt * ddtheta,
            k_theta: x.k_theta,
        }
    }

    /// Jacobian of [`predict`](Self::predict) with respect to the state,
    /// linearized at a fixed control input
    pub fn jacobian(&self, x: &FlexibilityState) -> TransitionJacobian {
        let PhysicalConstants {
            mass: m,
            gravity: g,
            zeta,
        } = self.constants;
        let dt = self.dt;
        let (sin_th, cos_th) = x.theta.sin_cos();
        let d2 = x.xi * x.xi + zeta * zeta;

        let mut j = TransitionJacobian::zeros();
        j[(0, 0)] = 1.0;
        j[(0, 2)] = dt;
        j[(1, 1)] = 1.0;
        j[(1, 3)] = dt;
        j[(2, 2)] = 1.0;
        j[(3, 0)] = dt * (-g * cos_th - 2.0 * x.dtheta * x.dxi) / d2;
        j[(3, 1)] = dt * (-x.k_theta + m * g * (sin_th * x.xi + cos_th * zeta)) / (m * d2);
        j[(3, 2)] = -2.0 * dt * x.dtheta * x.xi / d2;
        j[(3, 3)] = 1.0 - 2.0 * dt * x.xi * x.dxi / d2;
        j[(3, 4)] = -dt * x.theta / (m * d2);
        j[(4, 4)] = 1.0;
        j
    }
}

/// Time-indexed evaluation of [`FlexibilityDynamics`] for a host loop
#[derive(Debug, Clone)]
pub struct TransitionNode {
    model: FlexibilityDynamics,
    new_state: TimeCache<FlexibilityState>,
    jacobian: TimeCache<TransitionJacobian>,
}

impl TransitionNode {
    pub fn new(constants: PhysicalConstants) -> Result<Self, ConfigError> {
        Ok(Self::from_model(FlexibilityDynamics::new(
            constants,
            DEFAULT_TIME_PERIOD,
        )?))
    }

    pub fn from_model(model: FlexibilityDynamics) -> Self {
        Self {
            model,
            new_state: TimeCache::new(),
            jacobian: TimeCache::new(),
        }
    }

    pub fn model(&self) -> &FlexibilityDynamics {
        &self.model
    }

    pub fn time_period(&self) -> f64 {
        self.model.time_period()
    }

    pub fn set_time_period(&mut self, dt: f64) -> Result<(), ConfigError> {
        self.model.set_time_period(dt)?;
        self.new_state.invalidate();
        self.jacobian.invalidate();
        Ok(())
    }

    /// Predicted state at `time` from a 5-vector state and a 1-vector control
    pub fn new_state(
        &mut self,
        time: TimeIndex,
        state: &[f64],
        control: &[f64],
    ) -> Result<&FlexibilityState, StabilizerError> {
        let model = &self.model;
        self.new_state.get_or_try_compute(time, || {
            let x = FlexibilityState::from_slice(state)?;
            expect_len("control", control, 1)?;
            expect_finite("control", control)?;
            let next = model.predict(&x, control[0]);
            if !next.is_finite() {
                return Err(StabilizerError::NonFinite {
                    context: "predicted flexibility state",
                });
            }
            Ok(next)
        })
    }

    /// Transition Jacobian at `time` for a 5-vector state
    pub fn jacobian(
        &mut self,
        time: TimeIndex,
        state: &[f64],
    ) -> Result<&TransitionJacobian, StabilizerError> {
        let model = &self.model;
        self.jacobian.get_or_try_compute(time, || {
            let x = FlexibilityState::from_slice(state)?;
            Ok(model.jacobian(&x))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn dynamics() -> FlexibilityDynamics {
        FlexibilityDynamics::new(PhysicalConstants::default(), 0.005).unwrap()
    }

    fn finite_difference(model: &FlexibilityDynamics, x: &FlexibilityState, u: f64) -> TransitionJacobian {
        let h = 1e-6;
        let mut j = TransitionJacobian::zeros();
        for col in 0..5 {
            let mut plus = x.to_vector();
            let mut minus = x.to_vector();
            plus[col] += h;
            minus[col] -= h;
            let fp = model
                .predict(&FlexibilityState::from_vector(&plus), u)
                .to_vector();
            let fm = model
                .predict(&FlexibilityState::from_vector(&minus), u)
                .to_vector();
            j.set_column(col, &((fp - fm) / (2.0 * h)));
        }
        j
    }

    #[test]
    fn test_zero_state_is_fixed_point() {
        let next = dynamics().predict(&FlexibilityState::zero(), 0.0);
        assert_eq!(next, FlexibilityState::zero());
    }

    #[test]
    fn test_kinematic_rows() {
        let x = FlexibilityState::new(0.02, 0.01, 0.3, -0.2, 425.0);
        let next = dynamics().predict(&x, 1.5);
        assert_relative_eq!(next.xi, 0.02 + 0.005 * 0.3, epsilon = 1e-15);
        assert_relative_eq!(next.theta, 0.01 - 0.005 * 0.2, epsilon = 1e-15);
        assert_relative_eq!(next.dxi, 0.3 + 0.005 * 1.5, epsilon = 1e-15);
        assert_eq!(next.k_theta, 425.0);
    }

    #[test]
    fn test_angular_acceleration_from_control() {
        // Upright and motionless: only the zeta*u term drives theta.
        let x = FlexibilityState::at_rest(425.0);
        let next = dynamics().predict(&x, 2.0);
        let expected = 0.005 * (56.0 * 0.8 * 2.0) / (56.0 * 0.64);
        assert_relative_eq!(next.dtheta, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobian_structure() {
        let x = FlexibilityState::new(0.05, 0.02, 0.1, 0.3, 400.0);
        let j = dynamics().jacobian(&x);
        assert_eq!(j[(0, 0)], 1.0);
        assert_eq!(j[(0, 2)], 0.005);
        assert_eq!(j[(1, 3)], 0.005);
        assert_eq!(j[(2, 2)], 1.0);
        assert_eq!(j[(4, 4)], 1.0);
        assert_eq!(j[(2, 0)], 0.0);
        assert_eq!(j[(4, 1)], 0.0);
        let d2 = 0.05 * 0.05 + 0.64;
        assert_relative_eq!(j[(3, 4)], -0.005 * 0.02 / (56.0 * d2), epsilon = 1e-15);
        assert_relative_eq!(j[(3, 3)], 1.0 - 2.0 * 0.005 * 0.05 * 0.1 / d2, epsilon = 1e-15);
    }

    #[test]
    fn test_node_caches_per_time_index() {
        let mut node = TransitionNode::new(PhysicalConstants::default()).unwrap();
        let first = *node.new_state(4, &[0.0, 0.0, 0.0, 0.0, 425.0], &[1.0]).unwrap();
        // Same index: inputs are not re-read.
        let cached = *node.new_state(4, &[9.0, 9.0, 9.0, 9.0, 9.0], &[9.0]).unwrap();
        assert_eq!(first, cached);
        let fresh = *node.new_state(5, &[9.0, 0.0, 0.0, 0.0, 425.0], &[0.0]).unwrap();
        assert_eq!(fresh.xi, 9.0);
    }

    #[test]
    fn test_node_rejects_malformed_inputs() {
        let mut node = TransitionNode::new(PhysicalConstants::default()).unwrap();
        assert!(matches!(
            node.new_state(0, &[0.0; 4], &[0.0]),
            Err(StabilizerError::ShapeMismatch { context: "flexibility state", .. })
        ));
        assert!(matches!(
            node.new_state(0, &[0.0; 5], &[0.0, 1.0]),
            Err(StabilizerError::ShapeMismatch { context: "control", .. })
        ));
        assert!(node.jacobian(0, &[0.0; 6]).is_err());
    }

    #[test]
    fn test_node_time_period() {
        let mut node = TransitionNode::new(PhysicalConstants::default()).unwrap();
        assert!(node.set_time_period(-1.0).is_err());
        assert_eq!(node.time_period(), 0.005);
        node.set_time_period(0.01).unwrap();
        let next = *node.new_state(0, &[0.0, 0.0, 1.0, 0.0, 0.0], &[0.0]).unwrap();
        assert_relative_eq!(next.xi, 0.01, epsilon = 1e-15);
    }

    #[test]
    fn test_jacobian_matches_finite_difference_at_upright_rest() {
        let model = dynamics();
        for &(theta, k) in &[(0.0, 425.0), (0.1, 300.0), (-0.3, 500.0)] {
            let x = FlexibilityState::new(0.0, theta, 0.0, 0.0, k);
            let fd = finite_difference(&model, &x, 0.7);
            let j = model.jacobian(&x);
            for r in 0..5 {
                for c in 0..5 {
                    assert_relative_eq!(j[(r, c)], fd[(r, c)], epsilon = 1e-6);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn prop_kinematic_rows_and_stiffness_column_match_finite_difference(
            xi in -0.2f64..0.2,
            theta in -0.5f64..0.5,
            dxi in -1.0f64..1.0,
            dtheta in -1.0f64..1.0,
            k in 100.0f64..800.0,
            u in -5.0f64..5.0,
        ) {
            let model = dynamics();
            let x = FlexibilityState::new(xi, theta, dxi, dtheta, k);
            let fd = finite_difference(&model, &x, u);
            let j = model.jacobian(&x);
            for r in [0usize, 1, 2, 4] {
                for c in 0..5 {
                    prop_assert!((j[(r, c)] - fd[(r, c)]).abs() < 1e-6);
                }
            }
            prop_assert!((j[(3, 4)] - fd[(3, 4)]).abs() < 1e-6);
        }

        #[test]
        fn prop_stiffness_is_held(
            xi in -0.2f64..0.2,
            theta in -0.5f64..0.5,
            k in 0.0f64..800.0,
            u in -5.0f64..5.0,
        ) {
            let next = dynamics().predict(&FlexibilityState::new(xi, theta, 0.0, 0.0, k), u);
            prop_assert_eq!(next.k_theta, k);
        }
    }
}
