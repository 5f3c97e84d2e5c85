//! Dynamic balance stabilizer
//!
//! Each cycle the stabilizer reads the COM error, the reference COM
//! velocity, the flexibility state along x and y and the foot poses, and
//! produces the COM velocity the whole-body solver should track:
//!
//! ```text
//! comdot = comdotRef + (dx, dy, dz)
//! ```
//!
//! `dx` and `dy` are held from one cycle to the next and updated by the
//! feedback law of the active support phase; `dz = -z` in every phase.

use nalgebra::{DMatrix, Matrix4, Vector2, Vector3};
use tracing::{debug, error, warn};

use crate::command::{Settings, StabilizerHandle};
use crate::error::{expect_finite, expect_len, StabilizerError};
use crate::params::StabilizerParams;
use crate::phase::{Correction, PhaseInputs, PhaseLaws, SupportFlexibility, SupportPhase};
use crate::signal::{TimeCache, TimeIndex};
use crate::state::AxisFlexibility;
use crate::ConfigError;

/// Length of the debug vector
pub const DEBUG_LEN: usize = 11;

/// Inputs of one control cycle, all sampled at the same time index
#[derive(Debug, Clone, Copy)]
pub struct StabilizerInputs<'a> {
    /// COM position error (x, y, z)
    pub delta_com: &'a [f64],
    /// Reference COM velocity (x, y, z)
    pub comdot_ref: &'a [f64],
    /// Flexibility along x: (xi, theta, dxi, dtheta), theta around -y
    pub flex_x: &'a [f64],
    /// Flexibility along y: (xi, theta, dxi, dtheta), theta around x
    pub flex_y: &'a [f64],
    /// Homogeneous pose of the left foot in the world frame
    pub left_foot: &'a Matrix4<f64>,
    /// Homogeneous pose of the right foot in the world frame
    pub right_foot: &'a Matrix4<f64>,
    /// Support phase reported by contact detection
    pub phase: SupportPhase,
}

/// Equality constraint on one component of the COM velocity task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualityBound {
    pub value: f64,
}

/// Result of one control cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilizerOutput {
    /// Corrective COM velocity, one fixed target per axis
    pub comdot: [EqualityBound; 3],
    /// Corrective COM acceleration along x
    pub ddx: f64,
    /// Corrective COM acceleration along y
    pub ddy: f64,
    /// Intermediate terms; the last entry is the phase index
    pub debug: [f64; DEBUG_LEN],
    /// Phase actually applied
    pub phase: SupportPhase,
}

impl StabilizerOutput {
    pub fn comdot_vector(&self) -> Vector3<f64> {
        Vector3::new(
            self.comdot[0].value,
            self.comdot[1].value,
            self.comdot[2].value,
        )
    }
}

/// State persisting between cycles
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerMemory {
    pub correction: Correction,
    pub dz: f64,
    pub debug: [f64; DEBUG_LEN],
}

#[derive(Debug)]
struct ControlCore {
    handle: StabilizerHandle,
    memory: ControllerMemory,
    // Written nowhere after construction; double support projects it.
    support_flex: SupportFlexibility,
    last_phase: Option<SupportPhase>,
    consecutive_failures: u32,
    held: Option<StabilizerOutput>,
}

impl ControlCore {
    fn cycle(&mut self, inputs: &StabilizerInputs<'_>) -> Result<StabilizerOutput, StabilizerError> {
        let settings = self.handle.snapshot();
        match self.evaluate(&settings, inputs) {
            Ok((memory, output)) => {
                if self.last_phase != Some(output.phase) {
                    debug!(from = ?self.last_phase, to = ?output.phase, "support phase changed");
                    self.last_phase = Some(output.phase);
                }
                self.memory = memory;
                self.consecutive_failures = 0;
                self.held = Some(output);
                Ok(output)
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                let failures = self.consecutive_failures;
                if failures >= settings.params.failure_escalation_cycles {
                    error!(failures, %err, "stabilizer failing persistently, holding previous command");
                } else {
                    warn!(failures, %err, "control cycle rejected");
                }
                Err(err)
            }
        }
    }

    fn evaluate(
        &self,
        settings: &Settings,
        inputs: &StabilizerInputs<'_>,
    ) -> Result<(ControllerMemory, StabilizerOutput), StabilizerError> {
        let params = &settings.params;

        expect_len("deltaCom", inputs.delta_com, 3)?;
        expect_finite("deltaCom", inputs.delta_com)?;
        expect_len("comdot", inputs.comdot_ref, 3)?;
        expect_finite("comdot", inputs.comdot_ref)?;
        let flex_x = AxisFlexibility::from_slice("stateFlex_x", inputs.flex_x)?;
        let flex_y = AxisFlexibility::from_slice("stateFlex_y", inputs.flex_y)?;
        expect_finite("leftFootPosition", inputs.left_foot.iter())?;
        expect_finite("rightFootPosition", inputs.right_foot.iter())?;

        let phase = if settings.started {
            inputs.phase
        } else {
            SupportPhase::NoSupport
        };

        let (x, y, z) = (
            inputs.delta_com[0],
            inputs.delta_com[1],
            inputs.delta_com[2],
        );
        let phase_inputs = PhaseInputs {
            com_error: Vector2::new(x, y),
            flex_x,
            flex_y,
            left_foot: ground_position(inputs.left_foot),
            right_foot: ground_position(inputs.right_foot),
        };
        let outcome = laws(params).evaluate(
            phase,
            &phase_inputs,
            &self.support_flex,
            self.memory.correction,
        )?;

        let correction = outcome.correction;
        let dz = -z;
        let comdot = [
            inputs.comdot_ref[0] + correction.dx,
            inputs.comdot_ref[1] + correction.dy,
            inputs.comdot_ref[2] + dz,
        ];
        expect_finite("corrective COM velocity", &comdot)?;

        let mut debug = [0.0; DEBUG_LEN];
        debug[..10].copy_from_slice(&outcome.terms);
        debug[10] = f64::from(phase.index());

        let memory = ControllerMemory {
            correction,
            dz,
            debug,
        };
        let output = StabilizerOutput {
            comdot: comdot.map(|value| EqualityBound { value }),
            ddx: correction.ddx,
            ddy: correction.ddy,
            debug,
            phase,
        };
        Ok((memory, output))
    }
}

fn laws(params: &StabilizerParams) -> PhaseLaws {
    PhaseLaws {
        single_support_gains: params.single_support_gains,
        double_support_gains: params.double_support_gains,
        time_period: params.time_period,
    }
}

/// Horizontal translation of a homogeneous transform
fn ground_position(pose: &Matrix4<f64>) -> Vector2<f64> {
    Vector2::new(pose[(0, 3)], pose[(1, 3)])
}

/// Balance stabilizer for a walking humanoid with flexible ankles
#[derive(Debug)]
pub struct Stabilizer {
    core: ControlCore,
    output: TimeCache<StabilizerOutput>,
    jacobian: TimeCache<DMatrix<f64>>,
}

impl Stabilizer {
    pub fn new(params: StabilizerParams) -> Result<Self, ConfigError> {
        Ok(Self::with_handle(StabilizerHandle::new(params)?))
    }

    /// Build a stabilizer reading its settings from an existing handle
    pub fn with_handle(handle: StabilizerHandle) -> Self {
        Self {
            core: ControlCore {
                handle,
                memory: ControllerMemory::default(),
                support_flex: SupportFlexibility::default(),
                last_phase: None,
                consecutive_failures: 0,
                held: None,
            },
            output: TimeCache::new(),
            jacobian: TimeCache::new(),
        }
    }

    /// Handle for the configuration channel
    pub fn handle(&self) -> StabilizerHandle {
        self.core.handle.clone()
    }

    pub fn start(&self) {
        self.core.handle.start();
    }

    pub fn is_started(&self) -> bool {
        self.core.handle.is_started()
    }

    /// Corrective COM velocity task at `time`.
    ///
    /// Computed once per time index; further calls for the same or an older
    /// index return the latest result without touching the integrator. On error
    /// the integrator keeps its previous value and [`held_command`]
    /// still returns the last good command.
    ///
    /// [`held_command`]: Self::held_command
    pub fn compute_control_feedback(
        &mut self,
        time: TimeIndex,
        inputs: &StabilizerInputs<'_>,
    ) -> Result<&StabilizerOutput, StabilizerError> {
        self.output
            .get_or_try_compute(time, || self.core.cycle(inputs))
    }

    /// COM Jacobian at `time`, passed through unchanged
    pub fn jacobian(
        &mut self,
        time: TimeIndex,
        jcom: &DMatrix<f64>,
    ) -> Result<&DMatrix<f64>, StabilizerError> {
        self.jacobian.get_or_try_compute(time, || {
            if jcom.nrows() != 3 {
                return Err(StabilizerError::ShapeMismatch {
                    context: "Jcom rows",
                    expected: 3,
                    got: jcom.nrows(),
                });
            }
            expect_finite("Jcom", jcom.iter())?;
            Ok(jcom.clone())
        })
    }

    /// Last successfully computed output
    pub fn held_command(&self) -> Option<&StabilizerOutput> {
        self.core.held.as_ref()
    }

    pub fn memory(&self) -> &ControllerMemory {
        &self.core.memory
    }

    pub fn debug(&self) -> &[f64; DEBUG_LEN] {
        &self.core.memory.debug
    }

    pub fn ddx(&self) -> f64 {
        self.core.memory.correction.ddx
    }

    pub fn ddy(&self) -> f64 {
        self.core.memory.correction.ddy
    }

    /// Vertical correction of the last successful cycle
    pub fn dz(&self) -> f64 {
        self.core.memory.dz
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.core.consecutive_failures
    }
}
