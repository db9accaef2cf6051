//! Electric heater controller for one cryomodule.
//!
//! The heater trades off against RF heat to keep the cryoplant load
//! steady. Setpoint writes are honored only in manual mode; an accepted
//! write re-triggers the thermal model and, through it, the JT loop.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use srf_components::ThermalModel;
use srf_core::{Severity, Var, ensure_finite};

use crate::error::{ControlError, ControlResult};

const DEFAULT_SETPOINT_W: f64 = 24.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaterMode {
    Manual,
    #[default]
    Sequencer,
}

#[derive(Debug)]
struct HeaterInner {
    cryomodule: String,
    setpoint: Var<f64>,
    readback: Var<f64>,
    mode: Var<HeaterMode>,
    thermal: ThermalModel,
}

/// Cheap-clone handle to one heater controller.
#[derive(Clone, Debug)]
pub struct Heater {
    inner: Arc<HeaterInner>,
}

impl Heater {
    pub fn new(cryomodule: impl Into<String>, thermal: ThermalModel) -> Self {
        let cryomodule = cryomodule.into();
        Self {
            inner: Arc::new(HeaterInner {
                setpoint: Var::new(format!("CM{cryomodule}:EHCV:SP"), DEFAULT_SETPOINT_W),
                readback: Var::new(format!("CM{cryomodule}:EHCV:ORBV"), DEFAULT_SETPOINT_W),
                mode: Var::new(format!("CM{cryomodule}:EHCV:MODE"), HeaterMode::Sequencer),
                thermal,
                cryomodule,
            }),
        }
    }

    pub fn cryomodule(&self) -> &str {
        &self.inner.cryomodule
    }

    pub fn setpoint(&self) -> f64 {
        self.inner.setpoint.value()
    }

    pub fn readback(&self) -> f64 {
        self.inner.readback.value()
    }

    pub fn mode(&self) -> HeaterMode {
        self.inner.mode.value()
    }

    pub fn setpoint_var(&self) -> Var<f64> {
        self.inner.setpoint.clone()
    }

    pub fn set_mode(&self, mode: HeaterMode) {
        self.inner.mode.set(mode);
        tracing::debug!(cryomodule = %self.inner.cryomodule, ?mode, "heater mode");
    }

    /// Write the heater setpoint, in watts. Honored only in manual mode;
    /// otherwise the value is left untouched and the setpoint cell carries
    /// a minor alarm.
    pub fn set_setpoint(&self, watts: f64) -> ControlResult<()> {
        let watts = ensure_finite("heater setpoint", watts)?;
        if self.mode() != HeaterMode::Manual {
            self.inner.setpoint.set_severity(Severity::Minor);
            return Err(ControlError::NotInManualMode);
        }
        self.inner
            .setpoint
            .set_with_severity(watts, Severity::NoAlarm);
        self.inner.readback.set(watts);
        self.inner.thermal.recompute(Some(watts));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srf_components::{Cavity, Cryomodule, CryomoduleClass};
    use srf_core::CavityAddr;

    fn rig() -> (Cryomodule, Heater) {
        let cavities = vec![
            Cavity::new(CavityAddr::new("06", 1), CryomoduleClass::Standard).with_q0(3.0e10),
        ];
        let cm = Cryomodule::new("06", CryomoduleClass::Standard, cavities).unwrap();
        let heater = Heater::new("06", cm.thermal().clone());
        (cm, heater)
    }

    #[test]
    fn sequencer_mode_ignores_setpoint_writes() {
        let (cm, heater) = rig();
        let stable_before = cm.thermal().stable_heat_load();

        let err = heater.set_setpoint(48.0).unwrap_err();
        assert_eq!(err, ControlError::NotInManualMode);
        assert_eq!(heater.setpoint(), 24.0);
        assert_eq!(heater.setpoint_var().severity(), Severity::Minor);
        assert_eq!(cm.thermal().stable_heat_load(), stable_before);
    }

    #[test]
    fn manual_mode_applies_and_retriggers_thermal() {
        let (cm, heater) = rig();
        heater.set_mode(HeaterMode::Manual);
        heater.set_setpoint(48.0).unwrap();

        assert_eq!(heater.setpoint(), 48.0);
        assert_eq!(heater.readback(), 48.0);
        assert_eq!(heater.setpoint_var().severity(), Severity::NoAlarm);
        assert_eq!(cm.thermal().heater_value(), 48.0);
        assert!(
            (cm.thermal().stable_heat_load() - (cm.thermal().rf_heat_load() + 48.0)).abs() < 1e-9
        );
    }

    #[test]
    fn rejects_non_finite_setpoint() {
        let (_cm, heater) = rig();
        heater.set_mode(HeaterMode::Manual);
        assert!(heater.set_setpoint(f64::NAN).is_err());
    }
}
