//! Error types for the cryogenic control loops.

use srf_core::CoreError;
use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Setpoint ignored: heater is not in manual mode")]
    NotInManualMode,

    #[error("Non-physical value: {what} = {value}")]
    NonPhysical { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}

impl From<CoreError> for ControlError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NonFinite { what, value } => ControlError::NonPhysical { what, value },
            CoreError::InvalidArg { what } => ControlError::InvalidArg { what },
            CoreError::Invariant { what } => ControlError::InvalidArg { what },
        }
    }
}
