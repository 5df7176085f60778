//! Shared types for the gridphase broad phase.
//!
//! # Invariants
//! - Every type here is a plain value; nothing holds a reference into a layer.
//! - AABB derivation is a pure function of collider and transform.

pub mod collider;
pub mod job;
pub mod rng;
pub mod types;

pub use collider::{Collider, ColliderBody, CompoundCollider};
pub use job::{JobError, JobHandle, run_on_worker};
pub use rng::SplitMix64;
pub use types::{Aabb, EntityId, RigidTransform};
