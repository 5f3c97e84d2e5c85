//! flexstab - balance stabilization for humanoids with flexible ankles
//!
//! A phase-dependent feedback law turning the COM error and the ankle
//! flexibility state into a corrective COM velocity, and the nonlinear
//! flexibility dynamics `f` and observation `h` (with their Jacobians)
//! consumed by an extended Kalman filter.

pub mod command;
pub mod controller;
pub mod error;
pub mod observation;
pub mod params;
pub mod phase;
pub mod signal;
pub mod sim;
pub mod state;
pub mod transition;

// Re-export main types
pub use command::{Command, CommandReply, StabilizerHandle};
pub use controller::{Stabilizer, StabilizerInputs, StabilizerOutput};
pub use error::{ConfigError, StabilizerError};
pub use observation::ObservationNode;
pub use params::{ControlGains, PhysicalConstants, StabilizerParams};
pub use phase::SupportPhase;
pub use signal::{TimeCache, TimeIndex};
pub use state::{AxisFlexibility, FlexibilityState};
pub use transition::{FlexibilityDynamics, TransitionNode};
