use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{UVec3, Vec3, Vec4};
use gridphase_common::{Aabb, ColliderBody};

use crate::settings::LayerSettings;

/// Slice of the flattened body arrays owned by one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketRange {
    pub start: usize,
    pub count: usize,
}

impl BucketRange {
    /// Layer indices covered by this bucket.
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.count
    }
}

/// What a bucket index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// An ordinary grid cell.
    Cell(UVec3),
    /// Bodies spanning more than one cell.
    Cross,
    /// Bodies with NaN or infinite bounds.
    Overflow,
}

/// One node of a bucket's implicit interval tree.
///
/// Node `k` has children `2k + 1` and `2k + 2`; an in-order walk visits the
/// bucket's bodies in ascending `xmin`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IntervalTreeNode {
    pub xmin: f32,
    pub xmax: f32,
    /// Largest `xmax` anywhere in this node's subtree, itself included.
    pub subtree_xmax: f32,
    pub bucket_relative_index: u32,
}

/// A built spatial index over a set of bodies.
///
/// Bodies are grouped by bucket into contiguous slices; within every bucket
/// except the overflow bucket they are sorted by ascending `xmin` and indexed
/// by an interval tree; overflow tree nodes are left at their defaults. AABBs are
/// stored as structure-of-arrays: `xmins`, `xmaxs`, and `yzminmaxs` packed as
/// `(ymin, zmin, -ymax, -zmax)` so a y/z overlap test is one vector compare.
///
/// A layer is immutable once built and can be shared across any number of
/// concurrent queries.
#[derive(Debug, Clone)]
pub struct CollisionLayer {
    pub(crate) id: u64,
    pub(crate) settings: LayerSettings,
    pub(crate) bucket_ranges: Vec<BucketRange>,
    pub(crate) bodies: Vec<ColliderBody>,
    pub(crate) xmins: Vec<f32>,
    pub(crate) xmaxs: Vec<f32>,
    pub(crate) yzminmaxs: Vec<Vec4>,
    pub(crate) interval_trees: Vec<IntervalTreeNode>,
    pub(crate) source_indices: Vec<u32>,
}

/// Borrowed view of a single bucket's data, with bucket-relative indexing.
#[derive(Debug, Clone, Copy)]
pub struct BucketSlices<'a> {
    pub bucket_index: usize,
    /// Absolute index of the bucket's first body in the layer.
    pub start: usize,
    pub xmins: &'a [f32],
    pub xmaxs: &'a [f32],
    pub yzminmaxs: &'a [Vec4],
    pub tree: &'a [IntervalTreeNode],
    pub bodies: &'a [ColliderBody],
}

impl BucketSlices<'_> {
    /// Number of bodies in the bucket.
    pub fn len(&self) -> usize {
        self.xmins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xmins.is_empty()
    }
}

impl CollisionLayer {
    /// A layer with every bucket empty.
    pub fn empty(settings: LayerSettings) -> Self {
        Self {
            id: next_layer_id(),
            settings,
            bucket_ranges: vec![BucketRange::default(); settings.bucket_count()],
            bodies: Vec::new(),
            xmins: Vec::new(),
            xmaxs: Vec::new(),
            yzminmaxs: Vec::new(),
            interval_trees: Vec::new(),
            source_indices: Vec::new(),
        }
    }

    /// Identifier unique to one build. Clones keep it, since their contents
    /// are identical.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Grid this layer was built with.
    pub fn settings(&self) -> &LayerSettings {
        &self.settings
    }

    /// Total bodies across all buckets.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Grid cells plus the cross and overflow buckets.
    pub fn bucket_count(&self) -> usize {
        self.bucket_ranges.len()
    }

    /// Index of the bucket holding bodies that span several cells.
    pub fn cross_bucket_index(&self) -> usize {
        self.settings.cross_bucket()
    }

    /// Index of the bucket holding bodies with non-finite bounds.
    pub fn overflow_bucket_index(&self) -> usize {
        self.settings.overflow_bucket()
    }

    /// What a bucket index stands for.
    pub fn bucket_kind(&self, bucket: usize) -> BucketKind {
        if bucket == self.cross_bucket_index() {
            BucketKind::Cross
        } else if bucket == self.overflow_bucket_index() {
            BucketKind::Overflow
        } else {
            BucketKind::Cell(self.settings.cell_coords(bucket))
        }
    }

    /// Start and count of one bucket.
    pub fn bucket_range(&self, bucket: usize) -> BucketRange {
        self.bucket_ranges[bucket]
    }

    pub fn bucket_ranges(&self) -> &[BucketRange] {
        &self.bucket_ranges
    }

    /// Borrow one bucket's slices.
    pub fn bucket(&self, bucket: usize) -> BucketSlices<'_> {
        let range = self.bucket_ranges[bucket].range();
        BucketSlices {
            bucket_index: bucket,
            start: range.start,
            xmins: &self.xmins[range.clone()],
            xmaxs: &self.xmaxs[range.clone()],
            yzminmaxs: &self.yzminmaxs[range.clone()],
            tree: &self.interval_trees[range.clone()],
            bodies: &self.bodies[range],
        }
    }

    /// Bucket containing the body at `index`.
    pub fn bucket_of(&self, index: usize) -> usize {
        self.bucket_ranges
            .partition_point(|r| r.start + r.count <= index)
    }

    /// Bodies in layer order.
    pub fn bodies(&self) -> &[ColliderBody] {
        &self.bodies
    }

    pub fn body(&self, index: usize) -> &ColliderBody {
        &self.bodies[index]
    }

    /// Every body's `xmin`, in layer order.
    pub fn xmins(&self) -> &[f32] {
        &self.xmins
    }

    pub fn xmaxs(&self) -> &[f32] {
        &self.xmaxs
    }

    /// Packed y/z bounds, see [`pack_yz`].
    pub fn yzminmaxs(&self) -> &[Vec4] {
        &self.yzminmaxs
    }

    /// Interval tree nodes of one bucket, in Eytzinger order.
    pub fn interval_tree(&self, bucket: usize) -> &[IntervalTreeNode] {
        &self.interval_trees[self.bucket_ranges[bucket].range()]
    }

    /// Cached bounds of the body at `index`.
    pub fn aabb(&self, index: usize) -> Aabb {
        let yz = self.yzminmaxs[index];
        Aabb::new(
            Vec3::new(self.xmins[index], yz.x, yz.y),
            Vec3::new(self.xmaxs[index], -yz.z, -yz.w),
        )
    }

    /// Position of the body at `index` in the sequence the layer was built from.
    pub fn source_index(&self, index: usize) -> usize {
        self.source_indices[index] as usize
    }

    /// Source index of every layer slot.
    pub fn source_indices(&self) -> &[u32] {
        &self.source_indices
    }
}

pub(crate) fn next_layer_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Pack y/z bounds as `(ymin, zmin, -ymax, -zmax)`.
pub fn pack_yz(aabb: &Aabb) -> Vec4 {
    Vec4::new(aabb.min.y, aabb.min.z, -aabb.max.y, -aabb.max.z)
}

/// Y/Z overlap of two packed bounds, inclusive on faces.
///
/// `a <= -b.zwxy` compares `ymin_a <= ymax_b`, `zmin_a <= zmax_b`,
/// `ymin_b <= ymax_a` and `zmin_b <= zmax_a` in one go. NaN never overlaps.
#[inline]
pub fn yz_overlap(a: Vec4, b: Vec4) -> bool {
    use glam::Vec4Swizzles;
    a.cmple(-b.zwxy()).all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_yz_overlap_matches_aabb_overlap() {
        let a = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let cases = [
            (Aabb::new(Vec3::new(0.0, 0.5, 0.5), Vec3::new(1.0, 2.0, 2.0)), true),
            (Aabb::new(Vec3::new(0.0, 1.0, 1.0), Vec3::new(1.0, 2.0, 2.0)), true),
            (Aabb::new(Vec3::new(0.0, 1.1, 0.0), Vec3::new(1.0, 2.0, 1.0)), false),
            (Aabb::new(Vec3::new(0.0, 0.0, -3.0), Vec3::new(1.0, 1.0, -0.1)), false),
            (Aabb::new(Vec3::new(0.0, -5.0, -5.0), Vec3::new(1.0, 5.0, 5.0)), true),
        ];
        for (b, expected) in cases {
            assert_eq!(yz_overlap(pack_yz(&a), pack_yz(&b)), expected, "{b:?}");
            assert_eq!(yz_overlap(pack_yz(&b), pack_yz(&a)), expected, "{b:?}");
        }
    }

    #[test]
    fn empty_layer_has_all_buckets() {
        let layer = CollisionLayer::empty(LayerSettings::default());
        assert_eq!(layer.bucket_count(), 10);
        assert!(layer.is_empty());
        assert!(layer.bucket_ranges().iter().all(|r| r.count == 0));
        assert_eq!(layer.bucket_kind(8), BucketKind::Cross);
        assert_eq!(layer.bucket_kind(9), BucketKind::Overflow);
        assert_eq!(layer.bucket_kind(7), BucketKind::Cell(UVec3::new(1, 1, 1)));
    }
}
