//! Error types for plant assembly.

use thiserror::Error;

/// Errors encountered while building or driving a simulated plant.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Plant error: {message}")]
    Plant { message: String },
}

pub type SimResult<T> = Result<T, SimError>;

impl From<srf_components::ComponentError> for SimError {
    fn from(e: srf_components::ComponentError) -> Self {
        SimError::Plant {
            message: e.to_string(),
        }
    }
}

impl From<srf_controls::ControlError> for SimError {
    fn from(e: srf_controls::ControlError) -> Self {
        SimError::Plant {
            message: e.to_string(),
        }
    }
}
