//! Splitting a query into jobs.
//!
//! Ordinary cells never see each other: a body straddling two cells lives in
//! the cross bucket. So a self query is every cell against itself, the cross
//! bucket against itself, and the cross bucket against every cell. A query
//! between two layers is every cell against the same cell, cross against
//! cross, A's cross bucket against B's cells, and A's cells against B's cross
//! bucket. The overflow bucket is never swept.
//!
//! Job indices are fixed by bucket, whichever strategy runs the plan:
//! `0..cells` for per-cell jobs, `cells` for cross against cross, and
//! `cells + 1..` for jobs touching the cross bucket and a cell.

use gridphase_layer::CollisionLayer;

use crate::sweep::{bipartite_sweep, self_sweep};

/// One bucket-level sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Task {
    /// Distinct pairs inside one bucket of a self query.
    Within { bucket: usize },
    /// A bucket of layer A against a bucket of layer B.
    Between { bucket_a: usize, bucket_b: usize },
}

impl Task {
    /// Run the sweep, reporting absolute `(index_a, index_b)` pairs.
    pub fn sweep<F>(self, layer_a: &CollisionLayer, layer_b: &CollisionLayer, emit: F)
    where
        F: FnMut(usize, usize),
    {
        match self {
            Task::Within { bucket } => self_sweep(&layer_a.bucket(bucket), emit),
            Task::Between { bucket_a, bucket_b } => {
                bipartite_sweep(&layer_a.bucket(bucket_a), &layer_b.bucket(bucket_b), emit)
            }
        }
    }
}

/// Tasks run back to back on one worker under one job index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Job {
    pub index: usize,
    pub tasks: Vec<Task>,
    pub exclusive_a: bool,
    pub exclusive_b: bool,
}

impl Job {
    fn exclusive(index: usize, tasks: Vec<Task>) -> Self {
        Self {
            index,
            tasks,
            exclusive_a: true,
            exclusive_b: true,
        }
    }
}

/// How cross-bucket work is protected against two concurrent jobs naming
/// the same body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PhaseTwo {
    /// Few jobs, each touching a disjoint set of bodies.
    Serialized,
    /// One job per sweep; shared sides are flagged non-exclusive.
    Tracked,
    /// One job per sweep; nothing is flagged.
    Unchecked,
}

/// Jobs of phase 1 never share a body. Phase 2 starts once phase 1 is done.
#[derive(Debug, Clone, Default)]
pub(crate) struct Plan {
    pub phase1: Vec<Job>,
    pub phase2: Vec<Job>,
}

impl Plan {
    pub fn job_count(&self) -> usize {
        self.phase1.len() + self.phase2.len()
    }

    pub fn self_query(layer: &CollisionLayer, phase_two: PhaseTwo) -> Self {
        let cells = layer.settings().cell_count();
        let cross = layer.cross_bucket_index();
        let has_pairs = |bucket: usize| layer.bucket_range(bucket).count > 1;

        let mut phase1: Vec<Job> = (0..cells)
            .filter(|&i| has_pairs(i))
            .map(|i| Job::exclusive(i, vec![Task::Within { bucket: i }]))
            .collect();
        if has_pairs(cross) {
            phase1.push(Job::exclusive(cells, vec![Task::Within { bucket: cross }]));
        }

        let mut phase2 = Vec::new();
        if layer.bucket_range(cross).count > 0 {
            let against_cells: Vec<(usize, Task)> = (0..cells)
                .filter(|&i| layer.bucket_range(i).count > 0)
                .map(|i| {
                    let task = Task::Between {
                        bucket_a: cross,
                        bucket_b: i,
                    };
                    (cells + 1 + i, task)
                })
                .collect();
            match phase_two {
                PhaseTwo::Serialized => {
                    if !against_cells.is_empty() {
                        let tasks = against_cells.into_iter().map(|(_, t)| t).collect();
                        phase2.push(Job::exclusive(cells + 1, tasks));
                    }
                }
                PhaseTwo::Tracked => {
                    phase2.extend(against_cells.into_iter().map(|(index, task)| Job {
                        index,
                        tasks: vec![task],
                        exclusive_a: false,
                        exclusive_b: true,
                    }));
                }
                PhaseTwo::Unchecked => {
                    phase1.extend(
                        against_cells
                            .into_iter()
                            .map(|(index, task)| Job::exclusive(index, vec![task])),
                    );
                }
            }
        }
        Self { phase1, phase2 }
    }

    /// `layer_a` and `layer_b` must share a grid.
    pub fn between(
        layer_a: &CollisionLayer,
        layer_b: &CollisionLayer,
        phase_two: PhaseTwo,
    ) -> Self {
        let cells = layer_a.settings().cell_count();
        let cross = layer_a.cross_bucket_index();
        let occupied_a = |bucket: usize| layer_a.bucket_range(bucket).count > 0;
        let occupied_b = |bucket: usize| layer_b.bucket_range(bucket).count > 0;
        // The same layer (or a clone) on both sides: A's and B's cross buckets
        // hold the same bodies.
        let aliased = layer_a.id() == layer_b.id();

        let mut phase1: Vec<Job> = (0..cells)
            .filter(|&i| occupied_a(i) && occupied_b(i))
            .map(|i| {
                let task = Task::Between {
                    bucket_a: i,
                    bucket_b: i,
                };
                Job::exclusive(i, vec![task])
            })
            .collect();
        if occupied_a(cross) && occupied_b(cross) {
            let task = Task::Between {
                bucket_a: cross,
                bucket_b: cross,
            };
            phase1.push(Job::exclusive(cells, vec![task]));
        }

        // A's cross bucket against B's cells, then A's cells against B's cross bucket.
        let a_cross: Vec<Task> = if occupied_a(cross) {
            (0..cells)
                .filter(|&i| occupied_b(i))
                .map(|i| Task::Between {
                    bucket_a: cross,
                    bucket_b: i,
                })
                .collect()
        } else {
            Vec::new()
        };
        let b_cross: Vec<Task> = if occupied_b(cross) {
            (0..cells)
                .filter(|&i| occupied_a(i))
                .map(|i| Task::Between {
                    bucket_a: i,
                    bucket_b: cross,
                })
                .collect()
        } else {
            Vec::new()
        };

        let mut phase2 = Vec::new();
        match phase_two {
            PhaseTwo::Serialized if aliased => {
                let tasks: Vec<Task> = a_cross.into_iter().chain(b_cross).collect();
                if !tasks.is_empty() {
                    phase2.push(Job::exclusive(cells + 1, tasks));
                }
            }
            PhaseTwo::Serialized => {
                if !a_cross.is_empty() {
                    phase2.push(Job::exclusive(cells + 1, a_cross));
                }
                if !b_cross.is_empty() {
                    phase2.push(Job::exclusive(cells + 2, b_cross));
                }
            }
            PhaseTwo::Tracked | PhaseTwo::Unchecked => {
                let tracked = phase_two == PhaseTwo::Tracked;
                let jobs = a_cross
                    .into_iter()
                    .chain(b_cross)
                    .enumerate()
                    .map(|(k, task)| {
                        let (exclusive_a, exclusive_b) = match task {
                            _ if !tracked => (true, true),
                            _ if aliased => (false, false),
                            Task::Between { bucket_a, .. } if bucket_a == cross => (false, true),
                            _ => (true, false),
                        };
                        Job {
                            index: cells + 1 + k,
                            tasks: vec![task],
                            exclusive_a,
                            exclusive_b,
                        }
                    });
                if tracked {
                    phase2.extend(jobs);
                } else {
                    phase1.extend(jobs);
                }
            }
        }
        Self { phase1, phase2 }
    }

    /// Cross-bucket sweeps of a self query, in the order a serialized
    /// phase 2 would run them.
    pub fn self_cross_tasks(layer: &CollisionLayer) -> Vec<Task> {
        Self::self_query(layer, PhaseTwo::Serialized)
            .phase2
            .into_iter()
            .flat_map(|job| job.tasks)
            .collect()
    }

    /// Cross-bucket sweeps of a query between two layers.
    pub fn between_cross_tasks(layer_a: &CollisionLayer, layer_b: &CollisionLayer) -> Vec<Task> {
        Self::between(layer_a, layer_b, PhaseTwo::Serialized)
            .phase2
            .into_iter()
            .flat_map(|job| job.tasks)
            .collect()
    }
}
