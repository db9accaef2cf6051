//! Cryomodule aggregate and its thermal (heat-load) model.
//!
//! The thermal model is the hub every other loop feeds into: cavity
//! amplitude changes and heater writes both land here, and the recomputed
//! stable heat load is what the JT valve loop converges against.

use std::sync::Arc;

use srf_core::Var;

use crate::cavity::{Cavity, CryomoduleClass};
use crate::error::{ComponentError, ComponentResult};

/// Empirical denominator of the per-cavity RF dissipation formula
/// `P = V^2 / (1012 * Q0)`, amplitude in volts.
const RF_HEAT_DENOM: f64 = 1012.0;

const DEFAULT_HEATER_W: f64 = 24.0;

#[derive(Debug)]
struct HeatTap {
    amp_actual: Var<f64>,
    q0: Var<f64>,
}

#[derive(Debug)]
struct ThermalInner {
    cryomodule: String,
    heater_value: Var<f64>,
    stable_heat: Var<f64>,
    taps: Vec<HeatTap>,
}

/// Cheap-clone handle to one cryomodule's heat-load aggregation.
///
/// `recompute` is pure and synchronous; it never suspends.
#[derive(Clone, Debug)]
pub struct ThermalModel {
    inner: Arc<ThermalInner>,
}

impl ThermalModel {
    pub fn new(cryomodule: impl Into<String>, cavities: &[Cavity]) -> Self {
        let cryomodule = cryomodule.into();
        let taps = cavities
            .iter()
            .map(|cav| HeatTap {
                amp_actual: cav.amplitude_actual_var(),
                q0: cav.q0_var(),
            })
            .collect();
        let inner = ThermalInner {
            heater_value: Var::new(format!("CM{cryomodule}:HEATER"), DEFAULT_HEATER_W),
            stable_heat: Var::new(format!("CM{cryomodule}:JT_STABLE_HEAT"), 0.0),
            taps,
            cryomodule,
        };
        let model = Self {
            inner: Arc::new(inner),
        };
        model.recompute(None);
        model
    }

    pub fn cryomodule(&self) -> &str {
        &self.inner.cryomodule
    }

    pub fn heater_value(&self) -> f64 {
        self.inner.heater_value.value()
    }

    pub fn stable_heat_load(&self) -> f64 {
        self.inner.stable_heat.value()
    }

    /// Handle to the stable-heat-load cell; the JT loop subscribes to it.
    pub fn stable_heat_var(&self) -> Var<f64> {
        self.inner.stable_heat.clone()
    }

    pub fn heater_var(&self) -> Var<f64> {
        self.inner.heater_value.clone()
    }

    /// Sum of per-cavity RF dissipation, in watts.
    pub fn rf_heat_load(&self) -> f64 {
        self.inner
            .taps
            .iter()
            .map(|tap| {
                let volts = tap.amp_actual.value() * 1e6;
                volts * volts / (RF_HEAT_DENOM * tap.q0.value())
            })
            .sum()
    }

    /// Recompute the total heat load and store it as the JT loop's stable
    /// convergence target. An override also becomes the new heater value.
    pub fn recompute(&self, heater_override: Option<f64>) -> f64 {
        if let Some(heater) = heater_override {
            self.inner.heater_value.set(heater);
        }
        let total = self.rf_heat_load() + self.inner.heater_value.value();
        self.inner.stable_heat.set(total);
        tracing::debug!(
            cryomodule = %self.inner.cryomodule,
            total_heat_w = total,
            "new JT stable heat load"
        );
        total
    }
}

/// One cryomodule: a named, fixed collection of cavities plus the thermal
/// model they report into.
#[derive(Debug)]
pub struct Cryomodule {
    name: String,
    class: CryomoduleClass,
    cavities: Vec<Cavity>,
    thermal: ThermalModel,
}

impl Cryomodule {
    /// Assemble a cryomodule from already-built cavities and attach the
    /// thermal model to each of them.
    pub fn new(
        name: impl Into<String>,
        class: CryomoduleClass,
        cavities: Vec<Cavity>,
    ) -> ComponentResult<Self> {
        if cavities.is_empty() {
            return Err(ComponentError::InvalidArg {
                what: "cryomodule needs at least one cavity",
            });
        }
        let name = name.into();
        let thermal = ThermalModel::new(name.clone(), &cavities);
        for cav in &cavities {
            cav.attach_thermal(thermal.clone())?;
        }
        Ok(Self {
            name,
            class,
            cavities,
            thermal,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> CryomoduleClass {
        self.class
    }

    pub fn cavities(&self) -> &[Cavity] {
        &self.cavities
    }

    pub fn cavity(&self, slot: u8) -> Option<&Cavity> {
        self.cavities.get(usize::from(slot.checked_sub(1)? ))
    }

    pub fn thermal(&self) -> &ThermalModel {
        &self.thermal
    }

    /// Sum of actual cavity amplitudes, in MV.
    pub fn amplitude_sum(&self) -> f64 {
        self.cavities.iter().map(|c| c.amplitude_actual()).sum()
    }
}
