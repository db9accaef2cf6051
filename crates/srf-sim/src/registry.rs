//! Per-simulation device registry.
//!
//! One registry per plant, built at startup and handed by reference to
//! whoever needs lookup (in practice the external PV-hosting layer).
//! Iteration order is deterministic, which keeps enumeration-driven tests
//! and PV export stable across runs.

use std::collections::BTreeMap;

use srf_components::{Cavity, PiezoActuator, Ssa, StepperMotor};
use srf_controls::{Heater, JtValve, LiquidLevelTank};

use crate::error::{SimError, SimResult};

/// A typed handle to any device in the plant.
#[derive(Clone, Debug)]
pub enum Device {
    Cavity(Cavity),
    Ssa(Ssa),
    Piezo(PiezoActuator),
    Stepper(StepperMotor),
    Tank(LiquidLevelTank),
    JtValve(JtValve),
    Heater(Heater),
}

/// Name-to-device map with deterministic iteration order.
#[derive(Debug, Default)]
pub struct Registry {
    devices: BTreeMap<String, Device>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device under a stable identifier. Duplicate identifiers
    /// are a topology error.
    pub fn insert(&mut self, key: impl Into<String>, device: Device) -> SimResult<()> {
        let key = key.into();
        if self.devices.contains_key(&key) {
            return Err(SimError::Plant {
                message: format!("duplicate device identifier: {key}"),
            });
        }
        self.devices.insert(key, device);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Device> {
        self.devices.get(key)
    }

    pub fn cavity(&self, key: &str) -> SimResult<&Cavity> {
        match self.get(key) {
            Some(Device::Cavity(cav)) => Ok(cav),
            _ => Err(SimError::InvalidArg {
                what: "no cavity registered under that identifier",
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Device)> {
        self.devices.iter().map(|(k, v)| (k.as_str(), v))
    }
}
