use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier used across the simulated machine.
///
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    /// Create an Id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        // index+1 must be nonzero
        Self(NonZeroU32::new(index + 1).expect("index+1 is nonzero"))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Domain-specific ID alias for clarity (no runtime cost).
pub type LinacId = Id;

/// Stable address of one cavity slot within the machine.
///
/// The external PV layer owns its own naming scheme; this is the stable
/// per-entity identifier the core hands out ("CM02/CAV3").
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CavityAddr {
    /// Cryomodule name, e.g. "02" or "H1".
    pub cryomodule: String,
    /// Cavity slot within the cryomodule, 1-based (1..=8).
    pub cavity: u8,
}

impl CavityAddr {
    pub fn new(cryomodule: impl Into<String>, cavity: u8) -> Self {
        Self {
            cryomodule: cryomodule.into(),
            cavity,
        }
    }
}

impl fmt::Display for CavityAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CM{}/CAV{}", self.cryomodule, self.cavity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip_index() {
        for i in [0_u32, 1, 2, 42, 10_000] {
            let id = Id::from_index(i);
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn option_id_is_small() {
        // This is a classic reason for NonZero: Option<Id> can be same size as Id.
        assert_eq!(
            core::mem::size_of::<Id>(),
            core::mem::size_of::<Option<Id>>()
        );
    }

    #[test]
    fn cavity_addr_display() {
        let addr = CavityAddr::new("H1", 3);
        assert_eq!(addr.to_string(), "CMH1/CAV3");
    }

    #[test]
    fn cavity_addr_orders_by_module_then_slot() {
        let a = CavityAddr::new("02", 8);
        let b = CavityAddr::new("03", 1);
        assert!(a < b);
    }
}
