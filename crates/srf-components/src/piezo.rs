//! Piezo fine tuner: voltage state plus feedback-mode flag.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use srf_core::{CavityAddr, Var, ensure_finite};

use crate::error::ComponentResult;

/// Piezo calibration: detune change per volt of drive.
pub const PIEZO_HZ_PER_VOLT: f64 = 20.0;

const DEFAULT_VOLTAGE: f64 = 17.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PiezoMode {
    Manual,
    #[default]
    Feedback,
}

#[derive(Debug)]
struct PiezoInner {
    addr: CavityAddr,
    enabled: Var<bool>,
    feedback_mode: Var<PiezoMode>,
    voltage: Var<f64>,
}

/// Cheap-clone handle to one piezo actuator.
#[derive(Clone, Debug)]
pub struct PiezoActuator {
    inner: Arc<PiezoInner>,
}

impl PiezoActuator {
    pub fn new(addr: CavityAddr) -> Self {
        Self {
            inner: Arc::new(PiezoInner {
                enabled: Var::new(format!("{addr}:PZT:ENABLE"), true),
                feedback_mode: Var::new(format!("{addr}:PZT:MODE"), PiezoMode::Feedback),
                voltage: Var::new(format!("{addr}:PZT:V"), DEFAULT_VOLTAGE),
                addr,
            }),
        }
    }

    pub fn addr(&self) -> &CavityAddr {
        &self.inner.addr
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.value()
    }

    pub fn feedback_mode(&self) -> PiezoMode {
        self.inner.feedback_mode.value()
    }

    pub fn voltage(&self) -> f64 {
        self.inner.voltage.value()
    }

    pub fn voltage_var(&self) -> Var<f64> {
        self.inner.voltage.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.set(enabled);
    }

    pub fn set_feedback_mode(&self, mode: PiezoMode) {
        self.inner.feedback_mode.set(mode);
    }

    pub fn set_voltage(&self, volts: f64) -> ComponentResult<()> {
        let volts = ensure_finite("piezo voltage", volts)?;
        self.inner.voltage.set(volts);
        Ok(())
    }

    /// Accumulate a voltage delta; the stepper steers the piezo through
    /// this when a move finishes in feedback mode.
    pub fn nudge_voltage(&self, delta_volts: f64) {
        self.inner.voltage.modify(|v| *v += delta_volts);
        tracing::debug!(
            piezo = %self.inner.addr,
            delta_v = delta_volts,
            "piezo voltage nudged"
        );
    }
}
