use std::borrow::Borrow;

use gridphase_common::{JobHandle, run_on_worker};
use gridphase_layer::CollisionLayer;
use rayon::prelude::*;
use tracing::{debug, info_span, trace, trace_span};

use crate::cache::CrossCache;
use crate::error::FindPairsError;
use crate::plan::{Job, PhaseTwo, Plan, Task};
use crate::processor::{FindPairsProcessor, FindPairsResult};

/// Report every pair of distinct overlapping bodies in `layer`.
///
/// Nothing runs until one of the `run*` or `schedule*` methods is called.
pub fn find_pairs<L, P>(layer: L, processor: P) -> FindPairs<L, P>
where
    L: Borrow<CollisionLayer>,
    P: FindPairsProcessor,
{
    FindPairs::new(Layers::Single(layer), processor)
}

/// Report every overlapping pair with side `a` from `layer_a` and side `b`
/// from `layer_b`. Fails right away when the layers use different grids.
pub fn find_pairs_between<L, P>(
    layer_a: L,
    layer_b: L,
    processor: P,
) -> Result<FindPairs<L, P>, FindPairsError>
where
    L: Borrow<CollisionLayer>,
    P: FindPairsProcessor,
{
    check_compatible(layer_a.borrow(), layer_b.borrow())?;
    Ok(FindPairs::new(Layers::Pair(layer_a, layer_b), processor))
}

pub(crate) fn check_compatible(
    layer_a: &CollisionLayer,
    layer_b: &CollisionLayer,
) -> Result<(), FindPairsError> {
    if layer_a.settings().is_compatible(layer_b.settings()) {
        Ok(())
    } else {
        Err(FindPairsError::IncompatibleLayers {
            a: *layer_a.settings(),
            b: *layer_b.settings(),
        })
    }
}

enum Layers<L> {
    Single(L),
    Pair(L, L),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Immediate,
    Run,
    Single,
    Parallel,
    ParallelUnsafe,
}

/// A configured pair query.
///
/// Every strategy reports the same set of pairs; they differ in where the
/// work runs and in what they promise about concurrent reports of the same
/// body. All of them hand the processor back once the query is done.
///
/// | strategy | runs on | concurrent tasks may share a body |
/// |---|---|---|
/// | `run_immediate` | calling thread | no |
/// | `run` | one pool worker, caller blocks | no |
/// | `schedule_single` | one pool worker, returns a handle | no |
/// | `run_parallel` / `schedule_parallel` | whole pool, two phases | no, or flagged with alias tracking |
/// | `run_parallel_unsafe` / `schedule_parallel_unsafe` | whole pool, one phase | yes, unflagged |
///
/// The unsafe strategies are only correct for processors whose effects on
/// any one entity commute, such as setting a flag.
pub struct FindPairs<L, P> {
    layers: Layers<L>,
    processor: P,
    alias_tracking: bool,
    cross_cache: bool,
}

impl<L, P> FindPairs<L, P>
where
    L: Borrow<CollisionLayer>,
    P: FindPairsProcessor,
{
    fn new(layers: Layers<L>, processor: P) -> Self {
        Self {
            layers,
            processor,
            alias_tracking: false,
            cross_cache: false,
        }
    }

    /// Run cross-bucket sweeps as independent parallel tasks, marking the
    /// shared side of each pair non-exclusive instead of serializing them.
    pub fn with_alias_tracking(mut self) -> Self {
        self.alias_tracking = true;
        self
    }

    /// Prune the cross-bucket work into a [`CrossCache`] first, then replay
    /// it from a single task.
    pub fn with_cross_cache(mut self) -> Self {
        self.cross_cache = true;
        self
    }

    /// Run inline on the calling thread, spawning nothing. Safe to call from
    /// inside another pool task.
    pub fn run_immediate(self) -> P {
        self.execute(Strategy::Immediate)
    }

    /// Run on a single pool worker, blocking until done.
    pub fn run(self) -> P {
        self.execute(Strategy::Run)
    }

    /// Run across the pool, blocking until done.
    pub fn run_parallel(self) -> P {
        self.execute(Strategy::Parallel)
    }

    /// Run every sweep at once with no alias protection.
    pub fn run_parallel_unsafe(self) -> P {
        self.execute(Strategy::ParallelUnsafe)
    }

    fn execute(self, strategy: Strategy) -> P {
        let (layer_a, layer_b, between) = match &self.layers {
            Layers::Single(layer) => (layer.borrow(), layer.borrow(), false),
            Layers::Pair(a, b) => (a.borrow(), b.borrow(), true),
        };
        let options = Options {
            strategy,
            between,
            alias_tracking: self.alias_tracking,
            cross_cache: self.cross_cache,
        };
        let processor = &self.processor;
        match strategy {
            Strategy::Run => run_on_worker(move || query(layer_a, layer_b, processor, options)),
            _ => query(layer_a, layer_b, processor, options),
        }
        self.processor
    }
}

impl<L, P> FindPairs<L, P>
where
    L: Borrow<CollisionLayer> + Send + 'static,
    P: FindPairsProcessor + Send + 'static,
{
    /// Run on one background worker.
    pub fn schedule_single(self) -> JobHandle<P> {
        JobHandle::spawn(move || self.execute(Strategy::Single))
    }

    /// Run across the pool in the background.
    pub fn schedule_parallel(self) -> JobHandle<P> {
        JobHandle::spawn(move || self.execute(Strategy::Parallel))
    }

    /// Run every sweep at once in the background with no alias protection.
    pub fn schedule_parallel_unsafe(self) -> JobHandle<P> {
        JobHandle::spawn(move || self.execute(Strategy::ParallelUnsafe))
    }
}

#[derive(Debug, Clone, Copy)]
struct Options {
    strategy: Strategy,
    between: bool,
    alias_tracking: bool,
    cross_cache: bool,
}

fn query<P>(layer_a: &CollisionLayer, layer_b: &CollisionLayer, processor: &P, options: Options)
where
    P: FindPairsProcessor,
{
    let _span = info_span!(
        "find_pairs",
        strategy = ?options.strategy,
        between = options.between,
        bodies_a = layer_a.body_count(),
        bodies_b = layer_b.body_count()
    )
    .entered();

    let parallel = matches!(
        options.strategy,
        Strategy::Parallel | Strategy::ParallelUnsafe
    );
    let phase_two = match options.strategy {
        // A cache replays from one task; the cross sweeps only need listing.
        _ if options.cross_cache => PhaseTwo::Serialized,
        Strategy::ParallelUnsafe => PhaseTwo::Unchecked,
        Strategy::Parallel if options.alias_tracking => PhaseTwo::Tracked,
        _ => PhaseTwo::Serialized,
    };
    let plan = if options.between {
        Plan::between(layer_a, layer_b, phase_two)
    } else {
        Plan::self_query(layer_a, phase_two)
    };
    debug!(
        jobs = plan.job_count(),
        phase1 = plan.phase1.len(),
        phase2 = plan.phase2.len(),
        ?phase_two,
        "query planned"
    );

    run_jobs(layer_a, layer_b, &plan.phase1, processor, parallel);
    if options.cross_cache {
        let tasks: Vec<Task> = plan.phase2.into_iter().flat_map(|job| job.tasks).collect();
        let cache = CrossCache::collect(layer_a, layer_b, options.between, tasks, parallel);
        cache.emit(layer_a, layer_b, processor);
    } else {
        run_jobs(layer_a, layer_b, &plan.phase2, processor, parallel);
    }
}

fn run_jobs<P>(
    layer_a: &CollisionLayer,
    layer_b: &CollisionLayer,
    jobs: &[Job],
    processor: &P,
    parallel: bool,
) where
    P: FindPairsProcessor,
{
    if parallel {
        jobs.par_iter()
            .for_each(|job| run_job(layer_a, layer_b, job, processor));
    } else {
        for job in jobs {
            run_job(layer_a, layer_b, job, processor);
        }
    }
}

fn run_job<P>(layer_a: &CollisionLayer, layer_b: &CollisionLayer, job: &Job, processor: &P)
where
    P: FindPairsProcessor,
{
    let _span = trace_span!("find_pairs_job", job = job.index).entered();
    let mut reported = 0usize;
    for task in &job.tasks {
        task.sweep(layer_a, layer_b, |a, b| {
            let result = FindPairsResult::new(
                layer_a,
                layer_b,
                a,
                b,
                job.index,
                job.exclusive_a,
                job.exclusive_b,
            );
            processor.execute(&result);
            reported += 1;
        });
    }
    trace!(tasks = job.tasks.len(), reported, "job done");
}
