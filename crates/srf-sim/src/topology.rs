//! Static machine description.
//!
//! The plant is created once from this description at simulator startup;
//! no entity is added or destroyed afterwards.

use serde::{Deserialize, Serialize};
use srf_components::CryomoduleClass;

/// Every cryomodule carries the same fixed cavity count.
pub const CAVITIES_PER_CRYOMODULE: u8 = 8;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryomoduleSpec {
    pub name: String,
    pub class: CryomoduleClass,
}

impl CryomoduleSpec {
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: CryomoduleClass::Standard,
        }
    }

    pub fn high_loaded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: CryomoduleClass::HighLoaded,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinacSpec {
    pub name: String,
    pub cryomodules: Vec<CryomoduleSpec>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub linacs: Vec<LinacSpec>,
}

impl Topology {
    /// The full superconducting linac: 35 standard cryomodules spread
    /// over four linac sections, plus the two high-loaded modules in L1B.
    pub fn lcls2() -> Self {
        let range = |lo: u32, hi: u32| {
            (lo..=hi)
                .map(|n| CryomoduleSpec::standard(format!("{n:02}")))
                .collect::<Vec<_>>()
        };
        let mut l1b = range(2, 3);
        l1b.push(CryomoduleSpec::high_loaded("H1"));
        l1b.push(CryomoduleSpec::high_loaded("H2"));
        Self {
            linacs: vec![
                LinacSpec {
                    name: "L0B".into(),
                    cryomodules: range(1, 1),
                },
                LinacSpec {
                    name: "L1B".into(),
                    cryomodules: l1b,
                },
                LinacSpec {
                    name: "L2B".into(),
                    cryomodules: range(4, 15),
                },
                LinacSpec {
                    name: "L3B".into(),
                    cryomodules: range(16, 35),
                },
            ],
        }
    }

    /// A single-cryomodule machine, handy for tests and demos.
    pub fn single(spec: CryomoduleSpec) -> Self {
        Self {
            linacs: vec![LinacSpec {
                name: "L0B".into(),
                cryomodules: vec![spec],
            }],
        }
    }

    pub fn cryomodule_count(&self) -> usize {
        self.linacs.iter().map(|l| l.cryomodules.len()).sum()
    }
}
