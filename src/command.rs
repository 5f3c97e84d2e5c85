//! Configuration surface of the stabilizer
//!
//! Settings are written through a [`StabilizerHandle`] shared with the
//! controller. The controller copies them once at the start of every cycle,
//! so an update lands either before or after a cycle, never inside one.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::error::StabilizerError;
use crate::params::{validate_time_period, ControlGains, StabilizerParams};
use crate::ConfigError;

/// Settings read by the controller every cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub params: StabilizerParams,
    /// Latched on by [`StabilizerHandle::start`]; there is no way back
    pub started: bool,
}

/// Command accepted by [`StabilizerHandle::execute`]
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTimePeriod(f64),
    GetTimePeriod,
    SetSingleSupportGains(Vec<f64>),
    GetSingleSupportGains,
    SetDoubleSupportGains(Vec<f64>),
    GetDoubleSupportGains,
    Start,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::SetTimePeriod(_) => "setTimePeriod",
            Command::GetTimePeriod => "getTimePeriod",
            Command::SetSingleSupportGains(_) => "setGain1",
            Command::GetSingleSupportGains => "getGain1",
            Command::SetDoubleSupportGains(_) => "setGain2",
            Command::GetDoubleSupportGains => "getGain2",
            Command::Start => "start",
        }
    }
}

/// Reply to a [`Command`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandReply {
    Done,
    Scalar(f64),
    Gains([f64; 4]),
}

/// Shared, serialized access to the stabilizer settings
#[derive(Debug, Clone)]
pub struct StabilizerHandle {
    inner: Arc<RwLock<Settings>>,
}

impl StabilizerHandle {
    pub fn new(params: StabilizerParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Settings {
                params,
                started: false,
            })),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        *self.read()
    }

    pub fn params(&self) -> StabilizerParams {
        self.read().params
    }

    /// Enable support-phase response
    pub fn start(&self) {
        let mut settings = self.write();
        if !settings.started {
            settings.started = true;
            info!("stabilizer started");
        }
    }

    pub fn is_started(&self) -> bool {
        self.read().started
    }

    pub fn time_period(&self) -> f64 {
        self.read().params.time_period
    }

    pub fn set_time_period(&self, dt: f64) -> Result<(), ConfigError> {
        validate_time_period(dt)?;
        self.write().params.time_period = dt;
        info!(time_period = dt, "sampling period updated");
        Ok(())
    }

    pub fn single_support_gains(&self) -> ControlGains {
        self.read().params.single_support_gains
    }

    pub fn set_single_support_gains(&self, values: &[f64]) -> Result<(), StabilizerError> {
        let gains = ControlGains::from_slice(values)?;
        gains.validate("single support")?;
        self.write().params.single_support_gains = gains;
        info!(gains = ?gains.to_array(), "single support gains updated");
        Ok(())
    }

    pub fn double_support_gains(&self) -> ControlGains {
        self.read().params.double_support_gains
    }

    pub fn set_double_support_gains(&self, values: &[f64]) -> Result<(), StabilizerError> {
        let gains = ControlGains::from_slice(values)?;
        gains.validate("double support")?;
        self.write().params.double_support_gains = gains;
        info!(gains = ?gains.to_array(), "double support gains updated");
        Ok(())
    }

    /// Dispatch a configuration command
    pub fn execute(&self, command: Command) -> Result<CommandReply, StabilizerError> {
        debug!(command = command.name(), "executing command");
        let reply = match command {
            Command::SetTimePeriod(dt) => {
                self.set_time_period(dt)?;
                CommandReply::Done
            }
            Command::GetTimePeriod => CommandReply::Scalar(self.time_period()),
            Command::SetSingleSupportGains(values) => {
                self.set_single_support_gains(&values)?;
                CommandReply::Done
            }
            Command::GetSingleSupportGains => {
                CommandReply::Gains(self.single_support_gains().to_array())
            }
            Command::SetDoubleSupportGains(values) => {
                self.set_double_support_gains(&values)?;
                CommandReply::Done
            }
            Command::GetDoubleSupportGains => {
                CommandReply::Gains(self.double_support_gains().to_array())
            }
            Command::Start => {
                self.start();
                CommandReply::Done
            }
        };
        Ok(reply)
    }
}
