//! Plant assembly for srfsim.
//!
//! Takes a static [`Topology`] description (linacs, cryomodules, their
//! class), builds every device exactly once, wires the handles (cavity to
//! thermal model, stepper to cavity and piezo, SSA to cavity, JT and
//! heater to thermal and tank), and exposes a deterministic name-to-device
//! [`Registry`] for the external PV-hosting layer. The JT convergence
//! loops are spawned separately via [`Plant::spawn_loops`] so tests can
//! run the plant with or without them.

pub mod error;
pub mod plant;
pub mod registry;
pub mod topology;

pub use error::{SimError, SimResult};
pub use plant::{CavitySlot, CryomoduleUnit, LinacUnit, LoopHandle, Plant};
pub use registry::{Device, Registry};
pub use topology::{CAVITIES_PER_CRYOMODULE, CryomoduleSpec, LinacSpec, Topology};
