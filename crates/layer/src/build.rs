//! Five-phase collision layer construction.
//!
//! 1. classify every body into a bucket (data-parallel),
//! 2. count per bucket, prefix-sum and assign stable slots (sequential),
//! 3. invert the slot permutation (data-parallel),
//! 4. radix sort each bucket by `xmin` and build its interval tree (parallel over buckets;
//!    the overflow bucket is left in input order with no tree),
//! 5. gather bodies and bounds into the layer's arrays (data-parallel).
//!
//! The serial and parallel strategies run the same phases and produce
//! identical layers; they differ only in how work is spread over the pool.

use std::sync::atomic::{AtomicU32, Ordering};

use gridphase_common::{Aabb, ColliderBody, JobHandle, run_on_worker};
use rayon::prelude::*;
use tracing::{debug, info_span, trace};

use crate::layer::{BucketRange, CollisionLayer, IntervalTreeNode, next_layer_id, pack_yz};
use crate::settings::{LayerError, LayerSettings};
use crate::sort::{SortItem, radix_sort};
use crate::tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Serial,
    Parallel,
}

/// Builder for a [`CollisionLayer`].
///
/// ```ignore
/// let layer = BuildCollisionLayer::new(&bodies)
///     .with_settings(settings)
///     .run_parallel()?;
/// ```
pub struct BuildCollisionLayer<B> {
    bodies: B,
    aabbs: Option<Vec<Aabb>>,
    settings: LayerSettings,
}

impl<B: AsRef<[ColliderBody]>> BuildCollisionLayer<B> {
    /// Build from `bodies` with the default grid.
    pub fn new(bodies: B) -> Self {
        Self {
            bodies,
            aabbs: None,
            settings: LayerSettings::default(),
        }
    }

    /// Use `settings` for the grid.
    pub fn with_settings(mut self, settings: LayerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use these bounds instead of deriving them from each body's collider.
    /// Must hold exactly one AABB per body.
    pub fn with_aabbs(mut self, aabbs: Vec<Aabb>) -> Self {
        self.aabbs = Some(aabbs);
        self
    }

    fn validate(&self) -> Result<(), LayerError> {
        self.settings.validate()?;
        let bodies = self.bodies.as_ref().len();
        if let Some(aabbs) = &self.aabbs {
            if aabbs.len() != bodies {
                return Err(LayerError::AabbCountMismatch {
                    bodies,
                    aabbs: aabbs.len(),
                });
            }
        }
        if bodies > u32::MAX as usize {
            return Err(LayerError::TooManyBodies(bodies));
        }
        Ok(())
    }

    /// Build inline on the calling thread.
    pub fn run_immediate(&self) -> Result<CollisionLayer, LayerError> {
        self.validate()?;
        Ok(build(
            self.bodies.as_ref(),
            self.aabbs.as_deref(),
            self.settings,
            Mode::Serial,
        ))
    }

    /// Build on a single pool worker, blocking until done.
    pub fn run(&self) -> Result<CollisionLayer, LayerError> {
        self.validate()?;
        let bodies = self.bodies.as_ref();
        let aabbs = self.aabbs.as_deref();
        let settings = self.settings;
        Ok(run_on_worker(move || {
            build(bodies, aabbs, settings, Mode::Serial)
        }))
    }

    /// Build with every parallel phase spread over the pool, blocking until done.
    pub fn run_parallel(&self) -> Result<CollisionLayer, LayerError> {
        self.validate()?;
        Ok(build(
            self.bodies.as_ref(),
            self.aabbs.as_deref(),
            self.settings,
            Mode::Parallel,
        ))
    }
}

impl<B> BuildCollisionLayer<B>
where
    B: AsRef<[ColliderBody]> + Send + 'static,
{
    /// Schedule a single-worker build. Configuration errors are returned
    /// before anything is scheduled.
    pub fn schedule_single(self) -> Result<JobHandle<CollisionLayer>, LayerError> {
        self.schedule(Mode::Serial)
    }

    /// Schedule a parallel build.
    pub fn schedule_parallel(self) -> Result<JobHandle<CollisionLayer>, LayerError> {
        self.schedule(Mode::Parallel)
    }

    fn schedule(self, mode: Mode) -> Result<JobHandle<CollisionLayer>, LayerError> {
        self.validate()?;
        let Self {
            bodies,
            aabbs,
            settings,
        } = self;
        Ok(JobHandle::spawn(move || {
            build(bodies.as_ref(), aabbs.as_deref(), settings, mode)
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct Classified {
    bucket: u32,
    aabb: Aabb,
}

fn build(
    bodies: &[ColliderBody],
    aabbs: Option<&[Aabb]>,
    settings: LayerSettings,
    mode: Mode,
) -> CollisionLayer {
    let n = bodies.len();
    let _span = info_span!(
        "build_collision_layer",
        bodies = n,
        buckets = settings.bucket_count(),
        ?mode
    )
    .entered();

    if n == 0 {
        debug!("no bodies, layer is empty");
        return CollisionLayer::empty(settings);
    }

    // Phase 1
    let classified = map_indices(n, mode, |i| {
        let aabb = match aabbs {
            Some(aabbs) => aabbs[i],
            None => bodies[i].aabb(),
        };
        Classified {
            bucket: settings.bucket_for(&aabb) as u32,
            aabb,
        }
    });

    // Phase 2
    let bucket_ranges = bucket_ranges(&classified, settings.bucket_count());
    let mut next_slot: Vec<usize> = bucket_ranges.iter().map(|r| r.start).collect();
    let destinations: Vec<u32> = classified
        .iter()
        .map(|c| {
            let slot = &mut next_slot[c.bucket as usize];
            let dst = *slot;
            *slot += 1;
            dst as u32
        })
        .collect();
    debug!(
        cross = bucket_ranges[settings.cross_bucket()].count,
        overflow = bucket_ranges[settings.overflow_bucket()].count,
        occupied = bucket_ranges.iter().filter(|r| r.count > 0).count(),
        "bodies bucketed"
    );

    // Phase 3
    let mut order = invert(&destinations, mode);

    // Phase 4
    let mut interval_trees = vec![IntervalTreeNode::default(); n];
    {
        let overflow = settings.overflow_bucket();
        let order_slices = split_by_ranges(&mut order, &bucket_ranges);
        let tree_slices = split_by_ranges(&mut interval_trees, &bucket_ranges);
        let work = order_slices.into_iter().zip(tree_slices).enumerate();
        match mode {
            Mode::Serial => {
                for (bucket, (order, tree)) in work {
                    sort_and_index(bucket, bucket != overflow, order, tree, &classified);
                }
            }
            Mode::Parallel => work.collect::<Vec<_>>().into_par_iter().for_each(
                |(bucket, (order, tree))| {
                    sort_and_index(bucket, bucket != overflow, order, tree, &classified);
                },
            ),
        }
    }
    debug!("buckets sorted and indexed");

    // Phase 5
    let layer_bodies = map_indices(n, mode, |dst| bodies[order[dst] as usize].clone());
    let xmins = map_indices(n, mode, |dst| classified[order[dst] as usize].aabb.min.x);
    let xmaxs = map_indices(n, mode, |dst| classified[order[dst] as usize].aabb.max.x);
    let yzminmaxs = map_indices(n, mode, |dst| {
        pack_yz(&classified[order[dst] as usize].aabb)
    });

    CollisionLayer {
        id: next_layer_id(),
        settings,
        bucket_ranges,
        bodies: layer_bodies,
        xmins,
        xmaxs,
        yzminmaxs,
        interval_trees,
        source_indices: order,
    }
}

fn map_indices<T, F>(n: usize, mode: Mode, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    match mode {
        Mode::Serial => (0..n).map(f).collect(),
        Mode::Parallel => (0..n).into_par_iter().map(f).collect(),
    }
}

/// Counts per bucket turned into contiguous slices by an exclusive prefix sum.
fn bucket_ranges(classified: &[Classified], bucket_count: usize) -> Vec<BucketRange> {
    let mut ranges = vec![BucketRange::default(); bucket_count];
    for c in classified {
        ranges[c.bucket as usize].count += 1;
    }
    let mut start = 0;
    for range in &mut ranges {
        range.start = start;
        start += range.count;
    }
    ranges
}

/// Turn source -> slot into slot -> source.
fn invert(destinations: &[u32], mode: Mode) -> Vec<u32> {
    match mode {
        Mode::Serial => {
            let mut order = vec![0u32; destinations.len()];
            for (src, &dst) in destinations.iter().enumerate() {
                order[dst as usize] = src as u32;
            }
            order
        }
        Mode::Parallel => {
            // Slots are a permutation, so every store hits a distinct cell.
            let order: Vec<AtomicU32> = (0..destinations.len())
                .map(|_| AtomicU32::new(0))
                .collect();
            destinations.par_iter().enumerate().for_each(|(src, &dst)| {
                order[dst as usize].store(src as u32, Ordering::Relaxed);
            });
            order.into_iter().map(AtomicU32::into_inner).collect()
        }
    }
}

/// Cut `slice` into one mutable piece per bucket.
fn split_by_ranges<'a, T>(mut slice: &'a mut [T], ranges: &[BucketRange]) -> Vec<&'a mut [T]> {
    let mut pieces = Vec::with_capacity(ranges.len());
    for range in ranges {
        let (head, tail) = std::mem::take(&mut slice).split_at_mut(range.count);
        pieces.push(head);
        slice = tail;
    }
    pieces
}

fn sort_and_index(
    bucket: usize,
    indexed: bool,
    order: &mut [u32],
    tree: &mut [IntervalTreeNode],
    classified: &[Classified],
) {
    // Overflow bodies are never swept; their tree nodes stay default.
    if order.is_empty() || !indexed {
        return;
    }
    let mut items: Vec<SortItem> = order
        .iter()
        .map(|&src| SortItem::new(classified[src as usize].aabb.min.x, src))
        .collect();
    radix_sort(&mut items);
    for (slot, item) in order.iter_mut().zip(&items) {
        *slot = item.index;
    }

    let aabb = |src: &u32| classified[*src as usize].aabb;
    let xmins: Vec<f32> = order.iter().map(|src| aabb(src).min.x).collect();
    let xmaxs: Vec<f32> = order.iter().map(|src| aabb(src).max.x).collect();
    tree::build(&xmins, &xmaxs, tree);
    trace!(bucket, bodies = order.len(), "bucket indexed");
}
