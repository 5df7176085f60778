//! Developer tooling: collision layer inspector and debug drawing hooks.
//!
//! # Invariants
//! - Tools only read layers; they never change what a query would report.

mod inspector;

pub use inspector::{
    BodyInfo, BucketInfo, DebugBox, DebugBoxKind, LayerInspector, LayerSummary,
};

pub fn crate_info() -> &'static str {
    "gridphase-tools v0.1.0"
}
