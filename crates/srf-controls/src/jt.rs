//! JT valve and its liquid-level convergence loop.
//!
//! The Joule-Thomson valve regulates helium flow into the cryomodule. Its
//! loop drives the downstream level sensor toward agreement with the
//! thermal model's stable heat load, one small step per tick, modeling a
//! slow physical valve. One loop instance serves one tank: triggers that
//! arrive while a pass is converging change the live values the pass reads
//! instead of starting a competitor.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use srf_components::ThermalModel;
use srf_core::{Var, ensure_finite};
use tokio::time::sleep;

use crate::error::ControlResult;
use crate::tank::LiquidLevelTank;

const DEFAULT_SETPOINT: f64 = 30.0;
/// Level change per tick, percent of span.
const LEVEL_STEP_PCT: f64 = 0.01;
/// Safety band outside which the loop refuses to move the level further.
const LEVEL_SAFE_MIN_PCT: f64 = 70.0;
const LEVEL_SAFE_MAX_PCT: f64 = 100.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JtMode {
    Manual,
    #[default]
    Auto,
}

#[derive(Debug)]
struct JtValveInner {
    cryomodule: String,
    setpoint: Var<f64>,
    readback: Var<f64>,
    mode: Var<JtMode>,
    thermal: ThermalModel,
}

/// Cheap-clone handle to one JT valve.
#[derive(Clone, Debug)]
pub struct JtValve {
    inner: Arc<JtValveInner>,
}

impl JtValve {
    pub fn new(cryomodule: impl Into<String>, thermal: ThermalModel) -> Self {
        let cryomodule = cryomodule.into();
        Self {
            inner: Arc::new(JtValveInner {
                setpoint: Var::new(format!("CM{cryomodule}:JT:SP"), DEFAULT_SETPOINT),
                readback: Var::new(format!("CM{cryomodule}:JT:ORBV"), DEFAULT_SETPOINT),
                mode: Var::new(format!("CM{cryomodule}:JT:MODE"), JtMode::Auto),
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

    pub fn mode(&self) -> JtMode {
        self.inner.mode.value()
    }

    pub fn setpoint_var(&self) -> Var<f64> {
        self.inner.setpoint.clone()
    }

    pub fn thermal(&self) -> &ThermalModel {
        &self.inner.thermal
    }

    /// Write the valve setpoint. The readback follows immediately, the
    /// thermal model's stable heat load is refreshed, and the running
    /// level loop re-targets.
    pub fn request_setpoint(&self, value: f64) -> ControlResult<()> {
        let value = ensure_finite("JT setpoint", value)?;
        self.inner.setpoint.set(value);
        self.inner.readback.set(value);
        self.inner.thermal.recompute(None);
        Ok(())
    }

    pub fn set_mode(&self, mode: JtMode) {
        self.inner.mode.set(mode);
    }
}

/// The per-tank convergence loop. Built once at plant startup and run as
/// its own task; there is never a second loop for the same tank.
pub struct JtValveLoop {
    valve: JtValve,
    tank: LiquidLevelTank,
}

impl JtValveLoop {
    pub fn new(valve: JtValve, tank: LiquidLevelTank) -> Self {
        Self { valve, tank }
    }

    /// React to setpoint / stable-heat-load changes until every writer is
    /// gone. Values present at spawn time count as already handled.
    pub async fn run(self) {
        let mut setpoint_rx = self.valve.setpoint_var().subscribe();
        let mut heat_rx = self.valve.thermal().stable_heat_var().subscribe();
        setpoint_rx.mark_unchanged();
        heat_rx.mark_unchanged();

        loop {
            tokio::select! {
                changed = setpoint_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = heat_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            // Both triggers feed the same pass; drain them together so a
            // simultaneous pair doesn't schedule two passes.
            let _ = setpoint_rx.borrow_and_update();
            let _ = heat_rx.borrow_and_update();
            self.converge().await;
        }
    }

    /// One convergence pass. Every iteration re-reads the live setpoint,
    /// stable heat load, and level, so a trigger landing mid-pass simply
    /// changes what the next iteration sees.
    async fn converge(&self) {
        loop {
            let setpoint = self.valve.setpoint();
            let stable = self.valve.thermal().stable_heat_load();
            let level = self.tank.downstream();

            if !(LEVEL_SAFE_MIN_PCT..=LEVEL_SAFE_MAX_PCT).contains(&level) {
                tracing::warn!(
                    cryomodule = %self.valve.cryomodule(),
                    level_pct = level,
                    "liquid level at safety bound, JT loop holding"
                );
                break;
            }
            let step = if setpoint * 0.9 > stable {
                -LEVEL_STEP_PCT
            } else if setpoint * 1.1 < stable {
                LEVEL_STEP_PCT
            } else {
                // Inside the tolerance band: nothing to do, and crucially
                // no further level motion that could oscillate.
                break;
            };
            self.tank.set_downstream(level + step);
            if self.tank.downstream() == level {
                // Pinned at the span clamp: a physical limit, not a fault.
                tracing::warn!(
                    cryomodule = %self.valve.cryomodule(),
                    level_pct = level,
                    "liquid level pinned at span limit, JT loop holding"
                );
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}
