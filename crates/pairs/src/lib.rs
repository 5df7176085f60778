//! Broad-phase pair finding over collision layers.
//!
//! # Invariants
//! - Every strategy reports the same set of pairs for the same layers.
//! - Pairs from one bucket sweep arrive in ascending `xmin` of the outer body.
//! - Two tasks running at the same time never report the same body, unless
//!   the caller opted into alias tracking (the shared side is then flagged)
//!   or into one of the unsafe strategies.
//! - Layers are only read; the processor is handed back when a query ends.

mod cache;
mod error;
mod find_pairs;
mod lookup;
mod plan;
mod processor;
mod sweep;

pub use cache::CrossCache;
pub use error::FindPairsError;
pub use find_pairs::{FindPairs, find_pairs, find_pairs_between};
pub use lookup::SafeLookup;
pub use processor::{FindPairsProcessor, FindPairsResult, SafeEntity};

pub fn crate_info() -> &'static str {
    "gridphase-pairs v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("pairs"));
    }
}
