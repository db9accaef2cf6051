//! Solid-state amplifier: power sequencing and calibration.
//!
//! Power transitions are synchronous; each intermediate state is published
//! to subscribers as it happens. Calibration is the one suspending
//! operation (a fixed simulated delay) and may crash with a fixed
//! probability, leaving the slope untouched and the SSA faulted.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use srf_core::{CavityAddr, Severity, Var};
use tokio::time::sleep;

use crate::cavity::Cavity;
use crate::error::{ComponentError, ComponentResult};

/// Simulated calibration duration, in ticks.
const CAL_DELAY_TICKS: u64 = 5;
/// Independent probability that a calibration run crashes.
const CAL_CRASH_PROBABILITY: f64 = 0.2;
const CAL_SLOPE_RANGE: std::ops::Range<f64> = 0.5..1.5;
const DEFAULT_DRIVE_MAX: f64 = 0.8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SsaState {
    Off,
    PoweringOn,
    #[default]
    On,
    PoweringOff,
    Fault,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalStatus {
    #[default]
    Idle,
    Running,
    Complete,
    Crashed,
}

#[derive(Debug)]
struct SsaInner {
    addr: CavityAddr,
    state: Var<SsaState>,
    cal_status: Var<CalStatus>,
    slope: Var<f64>,
    drive_max: Var<f64>,
    cavity: Cavity,
    rng: Mutex<StdRng>,
}

/// Cheap-clone handle to one SSA.
#[derive(Clone, Debug)]
pub struct Ssa {
    inner: Arc<SsaInner>,
}

impl Ssa {
    /// An SSA starts powered on, gating the cavity it owns a handle to.
    /// `rng_seed` makes calibration outcomes reproducible.
    pub fn new(addr: CavityAddr, cavity: Cavity, rng_seed: u64) -> Self {
        Self {
            inner: Arc::new(SsaInner {
                state: Var::new(format!("{addr}:SSA:STATE"), SsaState::On),
                cal_status: Var::new(format!("{addr}:SSA:CALSTS"), CalStatus::Idle),
                slope: Var::new(format!("{addr}:SSA:SLOPE"), 0.0),
                drive_max: Var::new(format!("{addr}:SSA:DRV_MAX"), DEFAULT_DRIVE_MAX),
                cavity,
                rng: Mutex::new(StdRng::seed_from_u64(rng_seed)),
                addr,
            }),
        }
    }

    pub fn addr(&self) -> &CavityAddr {
        &self.inner.addr
    }

    pub fn state(&self) -> SsaState {
        self.inner.state.value()
    }

    pub fn state_var(&self) -> Var<SsaState> {
        self.inner.state.clone()
    }

    pub fn cal_status(&self) -> CalStatus {
        self.inner.cal_status.value()
    }

    pub fn cal_status_var(&self) -> Var<CalStatus> {
        self.inner.cal_status.clone()
    }

    pub fn slope(&self) -> f64 {
        self.inner.slope.value()
    }

    pub fn drive_max(&self) -> f64 {
        self.inner.drive_max.value()
    }

    pub fn set_drive_max(&self, value: f64) {
        self.inner.drive_max.set(value);
    }

    /// Power the SSA on. Valid from `Off` and `Fault` (clears the fault).
    /// On reaching `On`, the cavity powers up if its RF-enable flag is set.
    pub fn request_on(&self) -> ComponentResult<()> {
        match self.state() {
            SsaState::Off | SsaState::Fault => {
                tracing::info!(ssa = %self.inner.addr, "powering SSA on");
                self.inner
                    .state
                    .set_with_severity(SsaState::PoweringOn, Severity::NoAlarm);
                self.inner.state.set(SsaState::On);
                if self.inner.cavity.rf_enable_desired() {
                    self.inner.cavity.power_on();
                }
                Ok(())
            }
            _ => {
                self.inner.state.set_severity(Severity::Minor);
                Err(ComponentError::InvalidTransition {
                    what: "SSA power-on requested while not off or faulted",
                })
            }
        }
    }

    /// Power the SSA off. Valid from `On`. The cavity powers down
    /// unconditionally.
    pub fn request_off(&self) -> ComponentResult<()> {
        match self.state() {
            SsaState::On => {
                tracing::info!(ssa = %self.inner.addr, "powering SSA off");
                self.inner
                    .state
                    .set_with_severity(SsaState::PoweringOff, Severity::NoAlarm);
                self.inner.state.set(SsaState::Off);
                self.inner.cavity.power_off();
                Ok(())
            }
            _ => {
                self.inner.state.set_severity(Severity::Minor);
                Err(ComponentError::InvalidTransition {
                    what: "SSA power-off requested while not on",
                })
            }
        }
    }

    /// Run a calibration cycle. Valid from `On` or `Off`, never while a
    /// cycle is already running. After the fixed delay the run either
    /// completes with a fresh slope or crashes, leaving the slope
    /// untouched and the SSA faulted.
    pub async fn calibrate(&self) -> ComponentResult<CalStatus> {
        if self.cal_status() == CalStatus::Running {
            self.inner.cal_status.set_severity(Severity::Minor);
            return Err(ComponentError::InvalidTransition {
                what: "SSA calibration already running",
            });
        }
        match self.state() {
            SsaState::On | SsaState::Off => {}
            _ => {
                self.inner.cal_status.set_severity(Severity::Minor);
                return Err(ComponentError::InvalidTransition {
                    what: "SSA calibration requires a settled on/off state",
                });
            }
        }

        self.inner
            .cal_status
            .set_with_severity(CalStatus::Running, Severity::NoAlarm);
        tracing::info!(ssa = %self.inner.addr, "SSA calibration running");

        sleep(Duration::from_secs(CAL_DELAY_TICKS)).await;

        let (crashed, slope) = {
            let mut rng = self
                .inner
                .rng
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (
                rng.gen_bool(CAL_CRASH_PROBABILITY),
                rng.gen_range(CAL_SLOPE_RANGE),
            )
        };

        let outcome = if crashed {
            self.inner
                .cal_status
                .set_with_severity(CalStatus::Crashed, Severity::Minor);
            self.inner.state.set(SsaState::Fault);
            tracing::warn!(ssa = %self.inner.addr, "SSA calibration crashed");
            CalStatus::Crashed
        } else {
            self.inner.slope.set(slope);
            self.inner
                .cal_status
                .set_with_severity(CalStatus::Complete, Severity::NoAlarm);
            tracing::info!(ssa = %self.inner.addr, slope, "SSA calibration complete");
            CalStatus::Complete
        };
        Ok(outcome)
    }
}
