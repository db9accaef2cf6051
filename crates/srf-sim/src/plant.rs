//! Plant construction and wiring.
//!
//! Every entity is created here exactly once, lives for the process
//! lifetime, and is reachable both through the ownership tree
//! (linac -> cryomodule -> cavity slot) and through the flat [`Registry`].

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use srf_components::{Cavity, Cryomodule, PiezoActuator, Ssa, StepperMotor};
use srf_controls::{Heater, JtValve, JtValveLoop, LiquidLevelTank};
use srf_core::{CavityAddr, LinacId};
use tokio::task::JoinHandle;

use crate::error::SimResult;
use crate::registry::{Device, Registry};
use crate::topology::{CAVITIES_PER_CRYOMODULE, Topology};

/// One cavity slot with its dedicated drive and tuning hardware.
#[derive(Clone, Debug)]
pub struct CavitySlot {
    pub cavity: Cavity,
    pub ssa: Ssa,
    pub piezo: PiezoActuator,
    pub stepper: StepperMotor,
}

/// One cryomodule with its cryogenic periphery.
#[derive(Debug)]
pub struct CryomoduleUnit {
    pub cryomodule: Cryomodule,
    pub tank: LiquidLevelTank,
    pub jt: JtValve,
    pub heater: Heater,
    pub slots: Vec<CavitySlot>,
}

#[derive(Debug)]
pub struct LinacUnit {
    pub id: LinacId,
    pub name: String,
    pub modules: Vec<CryomoduleUnit>,
}

/// The assembled plant.
#[derive(Debug)]
pub struct Plant {
    linacs: Vec<LinacUnit>,
    registry: Registry,
}

impl Plant {
    /// Build and wire every device described by the topology. The seed
    /// fixes all per-device random draws (landing detune, Q0, cold
    /// landing frequency, calibration outcomes), so a given
    /// `(topology, seed)` pair always yields the same plant.
    pub fn build(topology: &Topology, seed: u64) -> SimResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut registry = Registry::new();
        let mut linacs = Vec::with_capacity(topology.linacs.len());

        for (linac_idx, linac_spec) in topology.linacs.iter().enumerate() {
            let mut modules = Vec::with_capacity(linac_spec.cryomodules.len());
            for cm_spec in &linac_spec.cryomodules {
                let mut cavities = Vec::with_capacity(usize::from(CAVITIES_PER_CRYOMODULE));
                let mut slots = Vec::with_capacity(usize::from(CAVITIES_PER_CRYOMODULE));

                for slot in 1..=CAVITIES_PER_CRYOMODULE {
                    let addr = CavityAddr::new(cm_spec.name.clone(), slot);
                    let cavity = Cavity::new(addr.clone(), cm_spec.class)
                        .with_initial_detune(rng.gen_range(-10_000..10_000))
                        .with_q0(f64::from(rng.gen_range(25..35)) * 1.0e9)
                        .with_cold_landing(f64::from(rng.gen_range(-10_000..=200_000)));
                    let piezo = PiezoActuator::new(addr.clone());
                    let ssa = Ssa::new(addr.clone(), cavity.clone(), rng.next_u64());
                    let stepper = StepperMotor::new(addr.clone(), cavity.clone(), piezo.clone());

                    registry.insert(addr.to_string(), Device::Cavity(cavity.clone()))?;
                    registry.insert(format!("{addr}:SSA"), Device::Ssa(ssa.clone()))?;
                    registry.insert(format!("{addr}:PZT"), Device::Piezo(piezo.clone()))?;
                    registry.insert(format!("{addr}:STEP"), Device::Stepper(stepper.clone()))?;

                    cavities.push(cavity.clone());
                    slots.push(CavitySlot {
                        cavity,
                        ssa,
                        piezo,
                        stepper,
                    });
                }

                let cryomodule = Cryomodule::new(cm_spec.name.clone(), cm_spec.class, cavities)?;
                let thermal = cryomodule.thermal().clone();
                let tank = LiquidLevelTank::new(cm_spec.name.clone());
                let jt = JtValve::new(cm_spec.name.clone(), thermal.clone());
                let heater = Heater::new(cm_spec.name.clone(), thermal);

                let cm = &cm_spec.name;
                registry.insert(format!("CM{cm}:TANK"), Device::Tank(tank.clone()))?;
                registry.insert(format!("CM{cm}:JT"), Device::JtValve(jt.clone()))?;
                registry.insert(format!("CM{cm}:HEATER"), Device::Heater(heater.clone()))?;

                modules.push(CryomoduleUnit {
                    cryomodule,
                    tank,
                    jt,
                    heater,
                    slots,
                });
            }
            linacs.push(LinacUnit {
                id: LinacId::from_index(linac_idx as u32),
                name: linac_spec.name.clone(),
                modules,
            });
        }

        tracing::info!(
            linacs = linacs.len(),
            devices = registry.len(),
            "plant assembled"
        );
        Ok(Self { linacs, registry })
    }

    pub fn linacs(&self) -> &[LinacUnit] {
        &self.linacs
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Find a cryomodule unit by name, machine-wide.
    pub fn module(&self, name: &str) -> Option<&CryomoduleUnit> {
        self.linacs
            .iter()
            .flat_map(|l| &l.modules)
            .find(|m| m.cryomodule.name() == name)
    }

    /// All cryomodule units in topology order.
    pub fn modules(&self) -> impl Iterator<Item = &CryomoduleUnit> {
        self.linacs.iter().flat_map(|l| &l.modules)
    }

    /// Spawn one JT convergence loop per cryomodule tank.
    pub fn spawn_loops(&self) -> LoopHandle {
        let tasks = self
            .modules()
            .map(|unit| {
                tokio::spawn(JtValveLoop::new(unit.jt.clone(), unit.tank.clone()).run())
            })
            .collect();
        LoopHandle { tasks }
    }
}

/// Handle to the plant's spawned control loops.
pub struct LoopHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl LoopHandle {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop the loops. Plant state is left as-is.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
