//! Error types for component operations.

use srf_core::CoreError;
use thiserror::Error;

/// Errors that can occur during component operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Invalid transition: {what}")]
    InvalidTransition { what: &'static str },

    #[error("A move is already in progress on this stepper")]
    MoveInProgress,

    #[error("Non-physical value: {what} = {value}")]
    NonPhysical { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}

pub type ComponentResult<T> = Result<T, ComponentError>;

impl From<CoreError> for ComponentError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NonFinite { what, value } => ComponentError::NonPhysical { what, value },
            CoreError::InvalidArg { what } => ComponentError::InvalidArg { what },
            CoreError::Invariant { what } => ComponentError::InvalidArg { what },
        }
    }
}
