//! Simulation harness for the stabilizer
//!
//! Closes the loop between the stabilizer and the flexibility dynamics:
//! both horizontal axes evolve under `f`, the COM error is measured with
//! noise, and an impulse on the ankle along x emulates a push.

use nalgebra::{Matrix4, Translation3};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::controller::{Stabilizer, StabilizerInputs};
use crate::error::StabilizerError;
use crate::params::StabilizerParams;
use crate::phase::SupportPhase;
use crate::signal::TimeIndex;
use crate::state::FlexibilityState;
use crate::transition::FlexibilityDynamics;
use crate::ConfigError;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub steps: usize,
    /// Standard deviation of the COM error measurement noise [m]
    pub sigma_noise: f64,
    /// Initial COM offset along (x, y) [m]
    pub initial_offset: (f64, f64),
    pub impulse_start: usize,
    pub impulse_duration: usize,
    /// Angular acceleration applied to the x-axis flexibility [rad/s^2]
    pub impulse_amplitude: f64,
    /// Phase reported by contact detection for the whole run
    pub phase: SupportPhase,
    /// Half distance between the feet along y [m]
    pub half_foot_spacing: f64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps: 2000,
            sigma_noise: 0.0005,
            initial_offset: (0.0, 0.005),
            impulse_start: 400,
            impulse_duration: 20,
            impulse_amplitude: 0.5,
            phase: SupportPhase::Single,
            half_foot_spacing: 0.095,
            seed: 42,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps == 0 {
            return Err(invalid("steps", "must be greater than zero".to_string()));
        }
        if !self.sigma_noise.is_finite() || self.sigma_noise < 0.0 {
            return Err(invalid(
                "sigma_noise",
                format!("{} must be finite and >= 0", self.sigma_noise),
            ));
        }
        let (x0, y0) = self.initial_offset;
        if !x0.is_finite() || !y0.is_finite() {
            return Err(invalid("initial_offset", format!("({x0}, {y0}) must be finite")));
        }
        if !self.impulse_amplitude.is_finite() {
            return Err(invalid(
                "impulse_amplitude",
                format!("{} must be finite", self.impulse_amplitude),
            ));
        }
        if !self.half_foot_spacing.is_finite() {
            return Err(invalid(
                "half_foot_spacing",
                format!("{} must be finite", self.half_foot_spacing),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: String) -> ConfigError {
    ConfigError::InvalidValue { field, message }
}

/// Simulation results for one time step
#[derive(Debug, Clone)]
pub struct SimStep {
    pub t: f64,
    pub xi_x: f64,
    pub theta_x: f64,
    pub xi_y: f64,
    pub theta_y: f64,
    pub comdot_x: f64,
    pub comdot_y: f64,
    pub ddx: f64,
    pub ddy: f64,
    /// Horizontal distance of the COM from its reference
    pub com_error: f64,
}

/// Run the push-recovery simulation
pub fn run_simulation(
    config: &SimConfig,
    params: StabilizerParams,
) -> Result<Vec<SimStep>, StabilizerError> {
    config.validate()?;
    let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
    let noise_dist = Normal::new(0.0, config.sigma_noise)
        .map_err(|err| invalid("sigma_noise", err.to_string()))?;

    let dt = params.time_period;
    let plant = FlexibilityDynamics::new(params.constants, dt)?;
    let mut stabilizer = Stabilizer::new(params)?;
    stabilizer.start();

    let mut axis_x = params.initial_flexibility_state();
    let mut axis_y = params.initial_flexibility_state();
    axis_x.xi = config.initial_offset.0;
    axis_y.xi = config.initial_offset.1;

    let left_foot = foot_pose(config.half_foot_spacing);
    let right_foot = foot_pose(-config.half_foot_spacing);
    let comdot_ref = [0.0; 3];

    let mut results = Vec::with_capacity(config.steps);

    for step in 0..config.steps {
        let t = step as f64 * dt;

        let delta_com = [
            axis_x.xi + noise_dist.sample(&mut rng),
            axis_y.xi + noise_dist.sample(&mut rng),
            noise_dist.sample(&mut rng),
        ];
        let flex_x = axis_x.reduced().to_vector();
        let flex_y = axis_y.reduced().to_vector();

        let inputs = StabilizerInputs {
            delta_com: &delta_com,
            comdot_ref: &comdot_ref,
            flex_x: flex_x.as_slice(),
            flex_y: flex_y.as_slice(),
            left_foot: &left_foot,
            right_foot: &right_foot,
            phase: config.phase,
        };
        let output = *stabilizer.compute_control_feedback(step as TimeIndex, &inputs)?;
        let comdot = output.comdot_vector();

        results.push(SimStep {
            t,
            xi_x: axis_x.xi,
            theta_x: axis_x.theta,
            xi_y: axis_y.xi,
            theta_y: axis_y.theta,
            comdot_x: comdot.x,
            comdot_y: comdot.y,
            ddx: output.ddx,
            ddy: output.ddy,
            com_error: axis_x.xi.hypot(axis_y.xi),
        });

        // The whole-body solver tracks the commanded COM velocity exactly.
        axis_x = track(&plant, &axis_x, comdot.x, dt);
        axis_y = track(&plant, &axis_y, comdot.y, dt);

        if step >= config.impulse_start && step < config.impulse_start + config.impulse_duration {
            axis_x.dtheta += config.impulse_amplitude * dt;
        }
    }

    Ok(results)
}

fn track(plant: &FlexibilityDynamics, x: &FlexibilityState, velocity: f64, dt: f64) -> FlexibilityState {
    let u = (velocity - x.dxi) / dt;
    plant.predict(x, u)
}

fn foot_pose(y: f64) -> Matrix4<f64> {
    Translation3::new(0.0, y, 0.0).to_homogeneous()
}

/// Calculate RMS error
pub fn rms_error(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = errors.iter().map(|&e| e * e).sum();
    (sum_sq / errors.len() as f64).sqrt()
}

/// Calculate peak error during the impulse
pub fn peak_error_during_impulse(
    results: &[SimStep],
    impulse_start: usize,
    impulse_duration: usize,
    get_error: impl Fn(&SimStep) -> f64,
) -> f64 {
    let end = (impulse_start + impulse_duration).min(results.len());
    results[impulse_start.min(end)..end]
        .iter()
        .map(get_error)
        .fold(0.0f64, f64::max)
}

/// Calculate recovery time (steps after the impulse to reach threshold)
pub fn recovery_time(
    results: &[SimStep],
    impulse_end: usize,
    threshold: f64,
    get_error: impl Fn(&SimStep) -> f64,
) -> usize {
    let start = impulse_end.min(results.len());
    results[start..]
        .iter()
        .position(|step| get_error(step) < threshold)
        .unwrap_or(results.len() - start)
}
