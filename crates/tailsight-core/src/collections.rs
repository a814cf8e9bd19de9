//! Maps keyed by the crate's integer ids (timers, listeners, instances).
//!
//! Fx hashing by default; the `std-hash` feature swaps in SipHash for hosts
//! that feed ids from untrusted input. Build maps with `default()` so both
//! variants compile.

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
}

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(test)]
mod tests {
    use super::map::{HashMap, HashSet};
    use crate::events::InstanceId;

    #[test]
    fn test_maps_build_from_default() {
        let mut live: HashMap<InstanceId, &str> = HashMap::default();
        live.insert(InstanceId(7), "feed");
        let mut cancelled: HashSet<u64> = HashSet::default();
        assert!(cancelled.insert(3));
        assert!(!cancelled.insert(3));
        assert_eq!(live.get(&InstanceId(7)), Some(&"feed"));
    }
}
