use glam::{IVec3, UVec3, Vec3};
use gridphase_common::Aabb;
use serde::{Deserialize, Serialize};

/// Errors from configuring or building a collision layer.
///
/// All of these are caller contract violations detected before any work is
/// scheduled. Body content never produces an error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayerError {
    #[error("cell size must be positive and finite on every axis, got {0}")]
    InvalidCellSize(Vec3),
    #[error("subdivisions must be at least 1 on every axis, got {0}")]
    InvalidSubdivisions(UVec3),
    #[error("grid origin must be finite, got {0}")]
    NonFiniteOrigin(Vec3),
    #[error("a grid of {0} cells exceeds the bucket index range")]
    TooManyBuckets(UVec3),
    #[error("{aabbs} override AABBs supplied for {bodies} bodies")]
    AabbCountMismatch { bodies: usize, aabbs: usize },
    #[error("{0} bodies exceed the layer index range")]
    TooManyBodies(usize),
}

/// Regular 3D grid description shared by every layer that is queried against
/// another layer.
///
/// Cell `(x, y, z)` covers `origin + cell_size * [x, x + 1)` on each axis.
/// Bodies outside the grid are clamped into the border cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSettings {
    pub origin: Vec3,
    pub cell_size: Vec3,
    pub subdivisions: UVec3,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self::from_world_aabb(
            Aabb::new(Vec3::splat(-1000.0), Vec3::splat(1000.0)),
            UVec3::splat(2),
        )
    }
}

impl LayerSettings {
    /// Grid with its minimum corner at `origin`.
    pub fn new(origin: Vec3, cell_size: Vec3, subdivisions: UVec3) -> Self {
        Self {
            origin,
            cell_size,
            subdivisions,
        }
    }

    /// Split `world` into `subdivisions` equal cells per axis.
    pub fn from_world_aabb(world: Aabb, subdivisions: UVec3) -> Self {
        Self {
            origin: world.min,
            cell_size: (world.max - world.min) / subdivisions.max(UVec3::ONE).as_vec3(),
            subdivisions,
        }
    }

    /// Reject a grid that cannot bucket bodies. Checked before any build work
    /// is scheduled.
    pub fn validate(&self) -> Result<(), LayerError> {
        if !self.origin.is_finite() {
            return Err(LayerError::NonFiniteOrigin(self.origin));
        }
        if !self.cell_size.is_finite() || self.cell_size.cmple(Vec3::ZERO).any() {
            return Err(LayerError::InvalidCellSize(self.cell_size));
        }
        if self.subdivisions.cmpeq(UVec3::ZERO).any() {
            return Err(LayerError::InvalidSubdivisions(self.subdivisions));
        }
        // Two sentinel buckets ride on top of the cells; every bucket index
        // and every cell coordinate must fit in i32/u32 arithmetic.
        let cells = (self.subdivisions.x as u64)
            * (self.subdivisions.y as u64)
            * (self.subdivisions.z as u64);
        if cells + 2 > i32::MAX as u64 {
            return Err(LayerError::TooManyBuckets(self.subdivisions));
        }
        Ok(())
    }

    /// Number of ordinary grid buckets.
    pub fn cell_count(&self) -> usize {
        (self.subdivisions.x * self.subdivisions.y * self.subdivisions.z) as usize
    }

    /// Grid buckets plus the cross and overflow buckets.
    pub fn bucket_count(&self) -> usize {
        self.cell_count() + 2
    }

    /// Bucket for bodies spanning more than one cell.
    pub fn cross_bucket(&self) -> usize {
        self.cell_count()
    }

    /// Bucket for bodies with NaN or infinite bounds.
    pub fn overflow_bucket(&self) -> usize {
        self.cell_count() + 1
    }

    /// Layers can only be queried against each other when their grids match
    /// exactly.
    pub fn is_compatible(&self, other: &LayerSettings) -> bool {
        self == other
    }

    /// Clamped cell coordinates of the cells containing `aabb.min` and `aabb.max`.
    pub fn cell_range(&self, aabb: &Aabb) -> (IVec3, IVec3) {
        let upper = self.subdivisions.as_ivec3() - IVec3::ONE;
        let min = ((aabb.min - self.origin) / self.cell_size)
            .floor()
            .as_ivec3()
            .clamp(IVec3::ZERO, upper);
        let max = ((aabb.max - self.origin) / self.cell_size)
            .floor()
            .as_ivec3()
            .clamp(IVec3::ZERO, upper);
        (min, max)
    }

    /// Bucket a body with these bounds belongs in.
    pub fn bucket_for(&self, aabb: &Aabb) -> usize {
        if !aabb.is_finite() {
            return self.overflow_bucket();
        }
        let (min, max) = self.cell_range(aabb);
        if min == max {
            self.cell_index(min.as_uvec3())
        } else {
            self.cross_bucket()
        }
    }

    /// Flattened index of a cell, x-major.
    pub fn cell_index(&self, cell: UVec3) -> usize {
        ((cell.x * self.subdivisions.y + cell.y) * self.subdivisions.z + cell.z) as usize
    }

    /// Inverse of [`LayerSettings::cell_index`].
    pub fn cell_coords(&self, index: usize) -> UVec3 {
        let index = index as u32;
        let z = index % self.subdivisions.z;
        let rest = index / self.subdivisions.z;
        UVec3::new(rest / self.subdivisions.y, rest % self.subdivisions.y, z)
    }

    /// World-space box covered by a grid cell.
    pub fn cell_bounds(&self, index: usize) -> Aabb {
        let min = self.origin + self.cell_coords(index).as_vec3() * self.cell_size;
        Aabb::new(min, min + self.cell_size)
    }

    /// World-space box covered by the whole grid.
    pub fn world_bounds(&self) -> Aabb {
        Aabb::new(
            self.origin,
            self.origin + self.subdivisions.as_vec3() * self.cell_size,
        )
    }
}
