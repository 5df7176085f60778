//! Bucket sweeps. Both report absolute body indices, in ascending `xmin` of
//! the outer body.

use gridphase_layer::{BucketSlices, tree, yz_overlap};

/// Every overlapping pair of distinct bodies inside one bucket.
///
/// Forward sort-and-sweep: bodies are already in `xmin` order, so the
/// candidates for body `i` are the run of later bodies starting no further
/// right than `xmax[i]`.
pub(crate) fn self_sweep<F>(bucket: &BucketSlices<'_>, mut emit: F)
where
    F: FnMut(usize, usize),
{
    let n = bucket.len();
    for i in 0..n {
        let xmax = bucket.xmaxs[i];
        let yz = bucket.yzminmaxs[i];
        for j in i + 1..n {
            if bucket.xmins[j] > xmax {
                break;
            }
            if yz_overlap(yz, bucket.yzminmaxs[j]) {
                emit(bucket.start + i, bucket.start + j);
            }
        }
    }
}

/// Every overlapping pair with one body from `a` and one from `b`, pruned
/// with `b`'s interval tree.
pub(crate) fn bipartite_sweep<F>(a: &BucketSlices<'_>, b: &BucketSlices<'_>, mut emit: F)
where
    F: FnMut(usize, usize),
{
    if a.is_empty() || b.is_empty() {
        return;
    }
    for i in 0..a.len() {
        let yz = a.yzminmaxs[i];
        tree::for_each_overlap(b.tree, a.xmins[i], a.xmaxs[i], |j| {
            if yz_overlap(yz, b.yzminmaxs[j]) {
                emit(a.start + i, b.start + j);
            }
        });
    }
}
