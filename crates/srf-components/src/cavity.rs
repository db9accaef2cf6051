//! Superconducting RF cavity state and the amplitude/gradient law.
//!
//! Amplitude (MV) and accelerating gradient (MV/m) are coupled through the
//! active cell length: `amplitude = gradient * length`. Writing either
//! setpoint recomputes the other; actuals only follow while RF is on.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use srf_core::{CavityAddr, Severity, Var, ensure_finite};

use crate::cryomodule::ThermalModel;
use crate::error::{ComponentError, ComponentResult};

/// Cryomodule population class. High-loaded modules carry shorter cavities
/// and a different tuner calibration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryomoduleClass {
    Standard,
    HighLoaded,
}

impl CryomoduleClass {
    /// Active cavity length in meters.
    pub fn cavity_length_m(self) -> f64 {
        match self {
            CryomoduleClass::Standard => 1.038,
            CryomoduleClass::HighLoaded => 0.346,
        }
    }

    /// Tuner calibration: microsteps per hertz of detune.
    pub fn steps_per_hertz(self) -> f64 {
        match self {
            CryomoduleClass::Standard => 256.0 / 1.4,
            CryomoduleClass::HighLoaded => 256.0 / 18.3,
        }
    }
}

/// Reported tuner configuration of a cavity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TuneConfig {
    #[default]
    OnResonance,
    ColdLanding,
    Parked,
    Other,
}

#[derive(Debug)]
struct CavityInner {
    addr: CavityAddr,
    class: CryomoduleClass,
    length: f64,

    amp_desired: Var<f64>,
    amp_actual: Var<f64>,
    amp_mean: Var<f64>,
    grad_desired: Var<f64>,
    grad_actual: Var<f64>,
    phase_desired: Var<f64>,
    phase_actual: Var<f64>,
    phase_mean: Var<f64>,

    rf_enable_desired: Var<bool>,
    rf_state_actual: Var<bool>,

    detune: Var<i64>,
    detune_rfs: Var<i64>,
    tune_config: Var<TuneConfig>,
    df_cold: Var<f64>,
    q0: Var<f64>,

    thermal: OnceLock<ThermalModel>,
}

/// Cheap-clone handle to one simulated cavity.
#[derive(Clone, Debug)]
pub struct Cavity {
    inner: Arc<CavityInner>,
}

const DEFAULT_AMPLITUDE_MV: f64 = 16.6;
const DEFAULT_Q0: f64 = 3.0e10;

impl Cavity {
    /// Create a cavity at its default operating point: RF on, 16.6 MV,
    /// on resonance. Landing detune and Q0 come from the plant builder via
    /// the `with_*` methods.
    pub fn new(addr: CavityAddr, class: CryomoduleClass) -> Self {
        let length = class.cavity_length_m();
        let gradient = DEFAULT_AMPLITUDE_MV / length;
        let var = |suffix: &str, v: f64| Var::new(format!("{addr}:{suffix}"), v);
        Self {
            inner: Arc::new(CavityInner {
                amp_desired: var("ADES", DEFAULT_AMPLITUDE_MV),
                amp_actual: var("AACT", DEFAULT_AMPLITUDE_MV),
                amp_mean: var("AACTMEAN", DEFAULT_AMPLITUDE_MV),
                grad_desired: var("GDES", gradient),
                grad_actual: var("GACT", gradient),
                phase_desired: var("PDES", 0.0),
                phase_actual: var("PACT", 0.0),
                phase_mean: var("PMEAN", 0.0),
                rf_enable_desired: Var::new(format!("{addr}:RFCTRL"), true),
                rf_state_actual: Var::new(format!("{addr}:RFSTATE"), true),
                detune: Var::new(format!("{addr}:DFBEST"), 0),
                detune_rfs: Var::new(format!("{addr}:DF"), 0),
                tune_config: Var::new(format!("{addr}:TUNE_CONFIG"), TuneConfig::OnResonance),
                df_cold: var("DF_COLD", 0.0),
                q0: var("Q0", DEFAULT_Q0),
                thermal: OnceLock::new(),
                addr,
                class,
                length,
            }),
        }
    }

    /// Set the landing detune drawn at plant construction.
    pub fn with_initial_detune(self, hz: i64) -> Self {
        self.inner.detune.set(hz);
        self.inner.detune_rfs.set(hz);
        self
    }

    /// Set the intrinsic quality factor drawn at plant construction.
    pub fn with_q0(self, q0: f64) -> Self {
        self.inner.q0.set(q0);
        self
    }

    /// Set the cold-landing frequency drawn at plant construction.
    pub fn with_cold_landing(self, hz: f64) -> Self {
        self.inner.df_cold.set(hz);
        self
    }

    pub fn addr(&self) -> &CavityAddr {
        &self.inner.addr
    }

    pub fn class(&self) -> CryomoduleClass {
        self.inner.class
    }

    pub fn is_high_loaded(&self) -> bool {
        self.inner.class == CryomoduleClass::HighLoaded
    }

    pub fn length_m(&self) -> f64 {
        self.inner.length
    }

    pub fn amplitude_desired(&self) -> f64 {
        self.inner.amp_desired.value()
    }

    pub fn amplitude_actual(&self) -> f64 {
        self.inner.amp_actual.value()
    }

    pub fn amplitude_mean(&self) -> f64 {
        self.inner.amp_mean.value()
    }

    pub fn gradient_desired(&self) -> f64 {
        self.inner.grad_desired.value()
    }

    pub fn gradient_actual(&self) -> f64 {
        self.inner.grad_actual.value()
    }

    pub fn phase_desired(&self) -> f64 {
        self.inner.phase_desired.value()
    }

    pub fn phase_actual(&self) -> f64 {
        self.inner.phase_actual.value()
    }

    pub fn phase_mean(&self) -> f64 {
        self.inner.phase_mean.value()
    }

    pub fn rf_is_on(&self) -> bool {
        self.inner.rf_state_actual.value()
    }

    pub fn rf_enable_desired(&self) -> bool {
        self.inner.rf_enable_desired.value()
    }

    pub fn detune(&self) -> i64 {
        self.inner.detune.value()
    }

    pub fn q0(&self) -> f64 {
        self.inner.q0.value()
    }

    pub fn df_cold(&self) -> f64 {
        self.inner.df_cold.value()
    }

    pub fn tune_config(&self) -> TuneConfig {
        self.inner.tune_config.value()
    }

    /// Handle to the actual-amplitude cell, for heat-load taps and
    /// external observers.
    pub fn amplitude_actual_var(&self) -> Var<f64> {
        self.inner.amp_actual.clone()
    }

    pub fn gradient_actual_var(&self) -> Var<f64> {
        self.inner.grad_actual.clone()
    }

    pub fn detune_var(&self) -> Var<i64> {
        self.inner.detune.clone()
    }

    pub fn q0_var(&self) -> Var<f64> {
        self.inner.q0.clone()
    }

    pub fn rf_state_var(&self) -> Var<bool> {
        self.inner.rf_state_actual.clone()
    }

    /// Attach the owning cryomodule's thermal model. Called once when the
    /// plant is wired.
    pub fn attach_thermal(&self, thermal: ThermalModel) -> ComponentResult<()> {
        self.inner
            .thermal
            .set(thermal)
            .map_err(|_| ComponentError::InvalidArg {
                what: "thermal model already attached",
            })
    }

    fn recompute_heat(&self) {
        if let Some(thermal) = self.inner.thermal.get() {
            thermal.recompute(None);
        }
    }

    /// Write the amplitude setpoint (MV) and propagate the coupled
    /// gradient. Actuals follow only while RF is on; the owning
    /// cryomodule's heat load is recomputed as a side effect.
    pub fn set_amplitude_desired(&self, mv: f64) -> ComponentResult<()> {
        let mv = ensure_finite("amplitude setpoint", mv)?;
        self.inner.amp_desired.set(mv);
        let gradient = mv / self.inner.length;
        self.inner.grad_desired.set(gradient);
        if self.rf_is_on() {
            self.inner.amp_actual.set(mv);
            self.inner.amp_mean.set(mv);
            if self.inner.grad_actual.value() != gradient {
                self.inner.grad_actual.set(gradient);
            }
        }
        self.recompute_heat();
        Ok(())
    }

    /// Write the gradient setpoint (MV/m); symmetric inverse of
    /// [`Cavity::set_amplitude_desired`].
    pub fn set_gradient_desired(&self, mv_per_m: f64) -> ComponentResult<()> {
        let mv_per_m = ensure_finite("gradient setpoint", mv_per_m)?;
        self.inner.grad_desired.set(mv_per_m);
        let amplitude = mv_per_m * self.inner.length;
        self.inner.amp_desired.set(amplitude);
        if self.rf_is_on() {
            self.inner.grad_actual.set(mv_per_m);
            if self.inner.amp_actual.value() != amplitude {
                self.inner.amp_actual.set(amplitude);
                self.inner.amp_mean.set(amplitude);
            }
        }
        self.recompute_heat();
        Ok(())
    }

    /// Write the phase setpoint, normalized into [0, 360) degrees.
    pub fn set_phase_desired(&self, degrees: f64) -> ComponentResult<()> {
        let degrees = ensure_finite("phase setpoint", degrees)?.rem_euclid(360.0);
        self.inner.phase_desired.set(degrees);
        if self.rf_is_on() {
            self.inner.phase_actual.set(degrees);
            self.inner.phase_mean.set(degrees);
        }
        Ok(())
    }

    /// Seed amplitude state without cascading side effects (no gradient
    /// propagation, no heat-load recompute). For external seeding.
    pub fn set_amplitude_quiet(&self, mv: f64) -> ComponentResult<()> {
        let mv = ensure_finite("amplitude seed", mv)?;
        self.inner.amp_desired.set(mv);
        self.inner.amp_actual.set(mv);
        self.inner.amp_mean.set(mv);
        Ok(())
    }

    /// Seed gradient state without cascading side effects.
    pub fn set_gradient_quiet(&self, mv_per_m: f64) -> ComponentResult<()> {
        let mv_per_m = ensure_finite("gradient seed", mv_per_m)?;
        self.inner.grad_desired.set(mv_per_m);
        self.inner.grad_actual.set(mv_per_m);
        Ok(())
    }

    /// Seed phase state without cascading side effects.
    pub fn set_phase_quiet(&self, degrees: f64) -> ComponentResult<()> {
        let degrees = ensure_finite("phase seed", degrees)?;
        self.inner.phase_desired.set(degrees);
        self.inner.phase_actual.set(degrees);
        self.inner.phase_mean.set(degrees);
        Ok(())
    }

    /// Operator RF-enable flag. Writing it powers the cavity accordingly,
    /// and the SSA consults it when finishing its power-on sequence.
    pub fn set_rf_enable(&self, enable: bool) {
        self.inner.rf_enable_desired.set(enable);
        if enable {
            self.power_on();
        } else {
            self.power_off();
        }
    }

    /// Restore actuals from the desired values and mark RF on.
    pub fn power_on(&self) {
        let amp = self.inner.amp_desired.value();
        let grad = self.inner.grad_desired.value();
        let phase = self.inner.phase_desired.value();
        self.inner.amp_actual.set(amp);
        self.inner.amp_mean.set(amp);
        self.inner.grad_actual.set(grad);
        self.inner.phase_actual.set(phase);
        self.inner.phase_mean.set(phase);
        self.inner.rf_state_actual.set(true);
        tracing::debug!(cavity = %self.inner.addr, amplitude_mv = amp, "RF on");
        self.recompute_heat();
    }

    /// Zero the RF actuals and mark RF off. Desired values are retained
    /// for the next power-on.
    pub fn power_off(&self) {
        self.inner.amp_actual.set(0.0);
        self.inner.amp_mean.set(0.0);
        self.inner.grad_actual.set(0.0);
        self.inner.rf_state_actual.set(false);
        tracing::debug!(cavity = %self.inner.addr, "RF off");
        self.recompute_heat();
    }

    /// Move the detune readouts. Narrow mutation entry point for the
    /// stepper and piezo tuning path.
    pub fn set_detune(&self, hz: i64) {
        self.inner.detune.set(hz);
        self.inner.detune_rfs.set(hz);
    }

    pub fn set_tune_config(&self, config: TuneConfig) {
        self.inner.tune_config.set(config);
    }

    /// Flag the amplitude readback with an alarm severity (used by the
    /// external layer to mark stale/seeded values).
    pub fn flag_amplitude(&self, severity: Severity) {
        self.inner.amp_actual.set_severity(severity);
    }
}
