//! Plant hardware models for srfsim.
//!
//! Each component is a cheap-clone handle over shared state cells
//! ([`srf_core::Var`]) plus narrow mutation methods. Collaborators hold
//! handles, never raw shared fields: the stepper moves a cavity's detune
//! through [`Cavity::set_detune`], the SSA gates RF through
//! [`Cavity::power_on`]/[`Cavity::power_off`], and amplitude changes reach
//! the cryomodule through an attached [`ThermalModel`].
//!
//! Suspension points in this crate are exactly the tick-waits inside
//! [`StepperMotor::move_motor`] and [`Ssa::calibrate`]; every other
//! operation completes synchronously.

pub mod cavity;
pub mod cryomodule;
pub mod error;
pub mod piezo;
pub mod ssa;
pub mod stepper;

pub use cavity::{Cavity, CryomoduleClass, TuneConfig};
pub use cryomodule::{Cryomodule, ThermalModel};
pub use error::{ComponentError, ComponentResult};
pub use piezo::{PIEZO_HZ_PER_VOLT, PiezoActuator, PiezoMode};
pub use ssa::{CalStatus, Ssa, SsaState};
pub use stepper::{MoveDirection, StepperMotor};
