use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Opaque identifier of the simulation object a body belongs to.
///
/// The index is dense so per-identifier state can live in a flat array
/// (see `SafeLookup` in `gridphase-pairs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Rigid transform: rotation followed by translation. No scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub rotation: Quat,
    pub position: Vec3,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RigidTransform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        position: Vec3::ZERO,
    };

    pub fn new(rotation: Quat, position: Vec3) -> Self {
        Self { rotation, position }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            rotation: Quat::IDENTITY,
            position,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// `self * local`: applies `local` first, then `self`.
    pub fn mul(&self, local: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: self.rotation * local.rotation,
            position: self.transform_point(local.position),
        }
    }
}

/// Axis-aligned bounding box in world space.
///
/// `min <= max` is expected but not enforced: degenerate and NaN boxes are
/// legal inputs to the layer builder and get routed to the overflow bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn extents(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Inclusive on faces: touching boxes overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn has_nan(&self) -> bool {
        self.min.is_nan() || self.max.is_nan()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}
