//! Implicit interval tree over one bucket's x-intervals.
//!
//! Nodes are laid out in Eytzinger order (root at 0, children of `k` at
//! `2k + 1` and `2k + 2`) and filled in-order from the bucket's sorted
//! bodies, so the tree is balanced and needs no pointers.

use crate::layer::IntervalTreeNode;

/// Fill `out` from x-intervals already sorted by ascending `xmin`.
pub fn build(xmins: &[f32], xmaxs: &[f32], out: &mut [IntervalTreeNode]) {
    assert_eq!(xmins.len(), xmaxs.len());
    assert_eq!(xmins.len(), out.len());
    if out.is_empty() {
        return;
    }

    let mut next = 0;
    fill_in_order(0, &mut next, xmins, xmaxs, out);

    // Children always sit after their parent, so a reverse sweep sees them first.
    let n = out.len();
    for k in (0..n).rev() {
        let left = 2 * k + 1;
        let right = left + 1;
        let left_max = if left < n {
            out[left].subtree_xmax
        } else {
            f32::NEG_INFINITY
        };
        let right_max = if right < n {
            out[right].subtree_xmax
        } else {
            f32::NEG_INFINITY
        };
        out[k].subtree_xmax = out[k].xmax.max(left_max).max(right_max);
    }
}

fn fill_in_order(
    k: usize,
    next: &mut usize,
    xmins: &[f32],
    xmaxs: &[f32],
    out: &mut [IntervalTreeNode],
) {
    if k >= out.len() {
        return;
    }
    fill_in_order(2 * k + 1, next, xmins, xmaxs, out);
    out[k] = IntervalTreeNode {
        xmin: xmins[*next],
        xmax: xmaxs[*next],
        subtree_xmax: xmaxs[*next],
        bucket_relative_index: *next as u32,
    };
    *next += 1;
    fill_in_order(2 * k + 2, next, xmins, xmaxs, out);
}

/// Call `report` with the bucket-relative index of every node whose interval
/// intersects `[qmin, qmax]`, inclusive, in ascending `xmin` order.
pub fn for_each_overlap<F>(tree: &[IntervalTreeNode], qmin: f32, qmax: f32, mut report: F)
where
    F: FnMut(usize),
{
    visit(tree, 0, qmin, qmax, &mut report);
}

fn visit<F>(tree: &[IntervalTreeNode], k: usize, qmin: f32, qmax: f32, report: &mut F)
where
    F: FnMut(usize),
{
    let Some(node) = tree.get(k) else {
        return;
    };
    if node.subtree_xmax < qmin {
        return;
    }
    visit(tree, 2 * k + 1, qmin, qmax, report);
    // Everything to the right starts even later.
    if node.xmin > qmax {
        return;
    }
    if node.xmax >= qmin {
        report(node.bucket_relative_index as usize);
    }
    visit(tree, 2 * k + 2, qmin, qmax, report);
}
