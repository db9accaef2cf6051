//! Liquid-helium level sensors for one cryomodule.

use std::sync::Arc;

use srf_core::Var;

const DEFAULT_UPSTREAM_PCT: f64 = 75.0;
const DEFAULT_DOWNSTREAM_PCT: f64 = 93.0;

#[derive(Debug)]
struct TankInner {
    cryomodule: String,
    upstream: Var<f64>,
    downstream: Var<f64>,
}

/// Cheap-clone handle to one cryomodule's liquid-level readings, in
/// percent of span. Levels are clamped to [0, 100]; during normal
/// operation only the JT valve loop moves the downstream reading.
#[derive(Clone, Debug)]
pub struct LiquidLevelTank {
    inner: Arc<TankInner>,
}

impl LiquidLevelTank {
    pub fn new(cryomodule: impl Into<String>) -> Self {
        let cryomodule = cryomodule.into();
        Self {
            inner: Arc::new(TankInner {
                upstream: Var::new(format!("CM{cryomodule}:US:LVL"), DEFAULT_UPSTREAM_PCT),
                downstream: Var::new(format!("CM{cryomodule}:DS:LVL"), DEFAULT_DOWNSTREAM_PCT),
                cryomodule,
            }),
        }
    }

    pub fn cryomodule(&self) -> &str {
        &self.inner.cryomodule
    }

    pub fn upstream(&self) -> f64 {
        self.inner.upstream.value()
    }

    pub fn downstream(&self) -> f64 {
        self.inner.downstream.value()
    }

    pub fn downstream_var(&self) -> Var<f64> {
        self.inner.downstream.clone()
    }

    pub fn set_upstream(&self, pct: f64) {
        self.inner.upstream.set(pct.clamp(0.0, 100.0));
    }

    pub fn set_downstream(&self, pct: f64) {
        self.inner.downstream.set(pct.clamp(0.0, 100.0));
    }
}
