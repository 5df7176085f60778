use rayon::prelude::*;
use tracing::{debug, info_span};

use gridphase_layer::CollisionLayer;

use crate::error::FindPairsError;
use crate::find_pairs::check_compatible;
use crate::plan::{Plan, Task};
use crate::processor::{FindPairsProcessor, FindPairsResult};

/// Precomputed cross-bucket candidate pairs.
///
/// Sweeping the cross bucket against every cell is the one part of a query
/// that cannot run freely in parallel while reporting. A cache does that
/// pruning up front, in parallel, and stores the surviving pairs so they can
/// be replayed into any number of processors afterwards. The cache is tied to
/// the layer builds it was computed from; replaying it against anything else
/// fails with [`FindPairsError::StaleCache`].
#[derive(Debug, Clone)]
pub struct CrossCache {
    layer_a: u64,
    layer_b: u64,
    between: bool,
    job_index: usize,
    pairs: Vec<(u32, u32)>,
}

impl CrossCache {
    /// Cross-bucket pairs of a self query over `layer`.
    pub fn build(layer: &CollisionLayer) -> Self {
        Self::collect(layer, layer, false, Plan::self_cross_tasks(layer), true)
    }

    /// Cross-bucket pairs of a query between `layer_a` and `layer_b`.
    pub fn build_between(
        layer_a: &CollisionLayer,
        layer_b: &CollisionLayer,
    ) -> Result<Self, FindPairsError> {
        check_compatible(layer_a, layer_b)?;
        let tasks = Plan::between_cross_tasks(layer_a, layer_b);
        Ok(Self::collect(layer_a, layer_b, true, tasks, true))
    }

    pub(crate) fn collect(
        layer_a: &CollisionLayer,
        layer_b: &CollisionLayer,
        between: bool,
        tasks: Vec<Task>,
        parallel: bool,
    ) -> Self {
        let _span = info_span!("cross_cache", tasks = tasks.len(), parallel).entered();
        let sweep = |task: &Task| {
            let mut out = Vec::new();
            task.sweep(layer_a, layer_b, |i, j| out.push((i as u32, j as u32)));
            out
        };
        let chunks: Vec<Vec<(u32, u32)>> = if parallel {
            tasks.par_iter().map(sweep).collect()
        } else {
            tasks.iter().map(sweep).collect()
        };
        let pairs: Vec<(u32, u32)> = chunks.into_iter().flatten().collect();
        debug!(pairs = pairs.len(), "cross cache filled");
        Self {
            layer_a: layer_a.id(),
            layer_b: layer_b.id(),
            between,
            job_index: layer_a.settings().cell_count() + 1,
            pairs,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Cached `(index_a, index_b)` pairs in replay order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pairs.iter().map(|&(a, b)| (a as usize, b as usize))
    }

    /// Whether this cache was built from exactly these layers.
    pub fn is_valid_for(&self, layer_a: &CollisionLayer, layer_b: &CollisionLayer) -> bool {
        self.layer_a == layer_a.id() && self.layer_b == layer_b.id()
    }

    /// Report every cached pair of a self query to `processor`, in order, on
    /// the calling thread.
    pub fn replay<P>(&self, layer: &CollisionLayer, processor: &P) -> Result<(), FindPairsError>
    where
        P: FindPairsProcessor,
    {
        if self.between || !self.is_valid_for(layer, layer) {
            return Err(FindPairsError::StaleCache);
        }
        self.emit(layer, layer, processor);
        Ok(())
    }

    /// Report every cached pair of a query between two layers.
    pub fn replay_between<P>(
        &self,
        layer_a: &CollisionLayer,
        layer_b: &CollisionLayer,
        processor: &P,
    ) -> Result<(), FindPairsError>
    where
        P: FindPairsProcessor,
    {
        if !self.between || !self.is_valid_for(layer_a, layer_b) {
            return Err(FindPairsError::StaleCache);
        }
        self.emit(layer_a, layer_b, processor);
        Ok(())
    }

    /// Replay from a single task, so every side is exclusive.
    pub(crate) fn emit<P>(&self, layer_a: &CollisionLayer, layer_b: &CollisionLayer, processor: &P)
    where
        P: FindPairsProcessor,
    {
        for (a, b) in self.pairs() {
            let result = FindPairsResult::new(layer_a, layer_b, a, b, self.job_index, true, true);
            processor.execute(&result);
        }
    }
}
