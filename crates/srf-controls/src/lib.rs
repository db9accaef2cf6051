//! Cryogenic control loops for srfsim.
//!
//! The liquid-level side of the plant: the helium tank, the JT valve with
//! its slow convergence loop, and the electric heater that trades off
//! against RF heat. The JT loop is the only long-running task in the
//! system; it is coalesced per tank, so concurrent triggers re-target the
//! running pass instead of racing a second one.

pub mod error;
pub mod heater;
pub mod jt;
pub mod tank;

pub use error::{ControlError, ControlResult};
pub use heater::{Heater, HeaterMode};
pub use jt::{JtMode, JtValve, JtValveLoop};
pub use tank::LiquidLevelTank;
