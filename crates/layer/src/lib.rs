//! Collision layers: bodies bucketed on a regular grid, sorted by `xmin`
//! inside each bucket, and indexed by an implicit interval tree.
//!
//! # Invariants
//! - Every input body lands in exactly one bucket, exactly once.
//! - Bucket slices are contiguous, ordered by bucket index, and never overlap.
//! - Inside every bucket but the overflow bucket, `xmin` never decreases.
//! - A built layer is never mutated; queries share it freely.

mod build;
mod layer;
mod settings;
pub mod sort;
pub mod tree;

pub use build::BuildCollisionLayer;
pub use layer::{
    BucketKind, BucketRange, BucketSlices, CollisionLayer, IntervalTreeNode, pack_yz, yz_overlap,
};
pub use settings::{LayerError, LayerSettings};

pub fn crate_info() -> &'static str {
    "gridphase-layer v0.1.0"
}
