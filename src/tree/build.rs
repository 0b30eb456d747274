//! Split selection and the build driver.
//!
//! Growing the partition alternates between ranking every terminal bin
//! by its steepest per-axis density gradient and cutting the winner at
//! the median, with two gatekeepers in between: the cut may be snapped
//! to the reference grid, and it may be shifted or vetoed so no bin
//! ends up much thinner on the cut axis than on the others. A vetoed
//! axis stays blocked for that bin only; fresh bins start unblocked.

use az::{Az, Cast};
use tracing::{debug, warn};

use super::{Axis, BinLeaf, BinTree, NodeKind};
use crate::error::{Error, Result};

/// Percent step between the quantiles probed by the density gradient.
const GRADIENT_STEP_PERCENT: usize = 20;
/// Low/high count ratio under which a boundary-touching bin is
/// subdivided at its midpoint.
const EDGE_SPLIT_RATIO: f64 = 0.7;
/// Tighter ratio for the follow-up rounds on single-axis boundary bins.
const EDGE_RESPLIT_RATIO: f64 = 0.5;
const EDGE_RESPLIT_ROUNDS: usize = 2;

fn count_ratio(a: usize, b: usize) -> f64 {
    a.min(b) as f64 / a.max(b) as f64
}

impl<A: Axis, const K: usize> BinTree<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
    f64: Cast<A>,
{
    /// Grow the partition to its fixpoint, then refine the bins touching
    /// the root boundary.
    ///
    /// The root must still be terminal and hold every sample. When the
    /// root itself falls short of twice the effective-entry threshold a
    /// warning is emitted and the tree stays a single bin. Otherwise
    /// splitting continues until every terminal bin is out of effective
    /// entries, out of gradient, or vetoed on all axes.
    pub fn build(&mut self) -> Result<()> {
        let root_bounds = self.bin_boundaries();
        let mut max_index = self.max_leaf_index();
        if self.grow(&root_bounds, &mut max_index)? {
            self.refine_edges(&root_bounds, &mut max_index)?;
        }
        debug!(leaves = self.n_leaves(), "binning complete");
        Ok(())
    }

    /// The main split loop. Returns whether the root guard passed.
    pub(crate) fn grow(
        &mut self,
        root_bounds: &[(A, A); K],
        max_index: &mut usize,
    ) -> Result<bool> {
        let threshold = 2 * self.min_leaf_entries;
        let leaf = self.leaf_mut().ok_or(Error::AlreadyBuilt)?;
        leaf.sort_entries();
        let effective = leaf.effective_n_entries();
        if effective < threshold {
            warn!(
                effective,
                threshold, "not enough effective entries to split; the tree keeps a single bin"
            );
            return Ok(false);
        }

        // The first split is constrained by the grid but not by the
        // elongation control.
        if let Some((node, axis, _)) = self.find_best_split() {
            if let Some(mut cut) = node.median_cut(axis) {
                if !node.constrain_split(axis, &mut cut) {
                    node.split_leaf(cut, *max_index, axis)?;
                    *max_index += 2;
                }
            }
        }

        let mut n_splits = 1usize;
        loop {
            let Some((node, axis, gradient)) = self.find_best_split() else {
                break;
            };
            let Some(mut cut) = node.median_cut(axis) else {
                break;
            };
            let mut vetoed = node.minimize_long_bins(root_bounds, axis, &mut cut);
            if !vetoed {
                vetoed = node.constrain_split(axis, &mut cut);
            }
            if !vetoed {
                node.split_leaf(cut, *max_index, axis)?;
                *max_index += 2;
                n_splits += 1;
                debug!(n_splits, gradient = gradient.az::<f64>(), "split accepted");
            }
        }
        Ok(true)
    }

    /// The terminal bin, axis and gradient of the most promising split,
    /// or `None` when nothing in the subtree is worth splitting.
    ///
    /// A terminal bin qualifies when it keeps at least twice the
    /// effective-entry threshold and some non-vetoed axis has a strictly
    /// positive gradient; the steepest such axis wins, lowest index on
    /// ties. Between the two children of an internal node the larger
    /// gradient wins and ties prefer the left.
    pub(crate) fn find_best_split(&mut self) -> Option<(&mut BinTree<A, K>, usize, A)> {
        if self.is_leaf() {
            let (axis, gradient) = self.best_axis()?;
            return Some((self, axis, gradient));
        }
        let NodeKind::Split { left, right, .. } = &mut self.kind else {
            unreachable!("non-terminal node without children");
        };
        let best_left = left.find_best_split();
        let best_right = right.find_best_split();
        match (best_left, best_right) {
            (None, None) => None,
            (best, None) | (None, best) => best,
            (Some(l), Some(r)) => Some(if r.2 > l.2 { r } else { l }),
        }
    }

    fn best_axis(&self) -> Option<(usize, A)> {
        let leaf = self.leaf()?;
        if leaf.effective_n_entries() < 2 * self.min_leaf_entries {
            return None;
        }
        let step = GRADIENT_STEP_PERCENT.az::<A>();
        let mut best = None;
        let mut max_gradient = A::zero();
        for axis in 0..K {
            if self.veto_split[axis] {
                continue;
            }
            let gradient = leaf.entries().density_gradient(axis, step);
            if gradient > max_gradient {
                max_gradient = gradient;
                best = Some(axis);
            }
        }
        best.map(|axis| (axis, max_gradient))
    }

    /// Median coordinate of the node's entries on `axis`; `None` on an
    /// internal node.
    fn median_cut(&self, axis: usize) -> Option<A> {
        let leaf = self.leaf()?;
        let median = [50usize.az::<A>()];
        Some(leaf.entries().percentiles(&median, axis)[0])
    }

    /// Snap `cut` to the nearest reference-grid edge on `axis`, trying
    /// the other edge of the containing grid bin when the nearest one
    /// falls outside this node's box. When neither edge works the axis
    /// is vetoed. No-op without a grid. Returns the veto state.
    pub(crate) fn constrain_split(&mut self, axis: usize, cut: &mut A) -> bool {
        if let Some(grid) = self.grid_constraint.clone() {
            if !self.veto_split[axis] {
                let bounds = self.bin_boundaries();
                let grid_axis = grid.axis(axis);
                let bin = grid_axis.find_bin(*cut);
                let low = grid_axis.low_edge(bin);
                let up = grid_axis.up_edge(bin);
                if (up - *cut).abs() < (*cut - low).abs() {
                    *cut = up;
                    if *cut >= bounds[axis].1 {
                        *cut = low;
                    }
                } else {
                    *cut = low;
                    if *cut <= bounds[axis].0 {
                        *cut = up;
                    }
                }
                if *cut <= bounds[axis].0 || *cut >= bounds[axis].1 {
                    self.veto_split[axis] = true;
                }
            }
        }
        self.veto_split[axis]
    }

    /// Keep the cut from leaving a sliver: measured relative to the
    /// `root` box, the short side of the cut must stay within the
    /// asymmetry budget of the bin's widest other axis. The cut is
    /// shifted to the compliant point when possible, otherwise the axis
    /// is vetoed. Returns the veto state.
    pub(crate) fn minimize_long_bins(
        &mut self,
        root: &[(A, A); K],
        axis: usize,
        cut: &mut A,
    ) -> bool {
        if !self.veto_split[axis] {
            let bounds = self.bin_boundaries();
            let mut full_lengths = [A::zero(); K];
            let mut rel_lengths = [A::zero(); K];
            for a in 0..K {
                full_lengths[a] = root[a].1 - root[a].0;
                rel_lengths[a] = (bounds[a].1 - bounds[a].0) / full_lengths[a];
            }
            let mut low_dist = (*cut - bounds[axis].0) / full_lengths[axis];
            let mut up_dist = (bounds[axis].1 - *cut) / full_lengths[axis];
            let mut max_rel_length = A::zero();
            for a in 0..K {
                if a != axis && rel_lengths[a] > max_rel_length {
                    max_rel_length = rel_lengths[a];
                }
            }
            let asymmetry = self.max_axis_asymmetry;
            if low_dist < up_dist {
                if asymmetry * low_dist < max_rel_length {
                    *cut = max_rel_length / asymmetry * full_lengths[axis] + bounds[axis].0;
                    up_dist = (bounds[axis].1 - *cut) / full_lengths[axis];
                    if *cut >= bounds[axis].1 || asymmetry * up_dist < max_rel_length {
                        self.veto_split[axis] = true;
                    }
                }
            } else if asymmetry * up_dist < max_rel_length {
                *cut = bounds[axis].1 - max_rel_length / asymmetry * full_lengths[axis];
                low_dist = (*cut - bounds[axis].0) / full_lengths[axis];
                if *cut <= bounds[axis].0 || asymmetry * low_dist < max_rel_length {
                    self.veto_split[axis] = true;
                }
            }
        }
        self.veto_split[axis]
    }

    /// Raw left/right entry counts the cut would produce, without
    /// splitting. Only valid on a terminal node with the cut strictly
    /// inside its box.
    pub fn entries_if_split(&self, cut: A, axis: usize) -> Result<(usize, usize)> {
        let leaf = self.leaf().ok_or(Error::SplitOnInternalNode)?;
        if cut <= leaf.min(axis) || cut >= leaf.max(axis) {
            return Err(Error::CutOutsideBin {
                axis,
                cut: cut.az::<f64>(),
                low: leaf.min(axis).az::<f64>(),
                high: leaf.max(axis).az::<f64>(),
            });
        }
        Ok(leaf.entries().entries_if_split(axis, cut))
    }

    /// Replace this terminal node by a cut at `cut` on `axis` and two
    /// child bins partitioning its entries.
    ///
    /// The children inherit the node's configuration (but start
    /// un-vetoed) and take the indices `max_leaf_index + 1` and
    /// `max_leaf_index + 2`. The cut must lie strictly inside the box.
    pub fn split_leaf(&mut self, cut: A, max_leaf_index: usize, axis: usize) -> Result<()> {
        let leaf = self.leaf().ok_or(Error::SplitOnInternalNode)?;
        if cut <= leaf.min(axis) || cut >= leaf.max(axis) {
            return Err(Error::CutOutsideBin {
                axis,
                cut: cut.az::<f64>(),
                low: leaf.min(axis).az::<f64>(),
                high: leaf.max(axis).az::<f64>(),
            });
        }
        let mut max_left = leaf.max_bounds();
        let mut min_right = leaf.min_bounds();
        max_left[axis] = cut;
        min_right[axis] = cut;
        let (left_entries, right_entries) = leaf.entries().split(axis, cut);
        let mut left_leaf = BinLeaf::new(leaf.min_bounds(), max_left)?;
        let mut right_leaf = BinLeaf::new(min_right, leaf.max_bounds())?;
        left_leaf.set_entries(left_entries);
        right_leaf.set_entries(right_entries);
        left_leaf.set_index(max_leaf_index + 1);
        right_leaf.set_index(max_leaf_index + 2);
        let left = Box::new(self.child_with(left_leaf));
        let right = Box::new(self.child_with(right_leaf));
        self.kind = NodeKind::Split {
            split_dim: axis,
            split_val: cut,
            left,
            right,
        };
        Ok(())
    }

    /// Midpoint-subdivide the terminal bins whose boxes touch the root
    /// boundary and whose entries sit lopsided around the midpoint.
    /// Bins touching on exactly one axis get up to two extra rounds on
    /// that axis under a tighter ratio.
    pub(crate) fn refine_edges(
        &mut self,
        root_bounds: &[(A, A); K],
        max_index: &mut usize,
    ) -> Result<()> {
        for node in self.terminal_nodes_mut() {
            refine_boundary_node(node, root_bounds, max_index)?;
        }
        Ok(())
    }
}

fn refine_boundary_node<A: Axis, const K: usize>(
    node: &mut BinTree<A, K>,
    root_bounds: &[(A, A); K],
    max_index: &mut usize,
) -> Result<()>
where
    usize: Cast<A>,
    A: Cast<usize>,
    f64: Cast<A>,
{
    let bounds = node.bin_boundaries();
    let mut touches = [false; K];
    for axis in 0..K {
        touches[axis] =
            bounds[axis].0 == root_bounds[axis].0 || bounds[axis].1 == root_bounds[axis].1;
    }
    let n_touching = touches.iter().filter(|&&t| t).count();
    if n_touching == 0 {
        return Ok(());
    }
    let two = 2usize.az::<A>();
    let mut working: Vec<&mut BinTree<A, K>> = vec![node];
    let mut deepen: Vec<(&mut BinTree<A, K>, usize)> = Vec::new();
    for axis in 0..K {
        if !touches[axis] {
            continue;
        }
        let mut split_children = Vec::new();
        for node in working {
            let middle = (node.max_on_axis(axis) + node.min_on_axis(axis)) / two;
            let (n_low, n_high) = node.entries_if_split(middle, axis)?;
            if node.n_entries() == 0 || count_ratio(n_low, n_high) >= EDGE_SPLIT_RATIO {
                continue;
            }
            node.split_leaf(middle, *max_index, axis)?;
            *max_index += 2;
            let NodeKind::Split { left, right, .. } = &mut node.kind else {
                unreachable!("split_leaf left a terminal node");
            };
            if n_touching == 1 {
                deepen.push((&mut **left, axis));
                deepen.push((&mut **right, axis));
            } else {
                split_children.push(&mut **left);
                split_children.push(&mut **right);
            }
        }
        working = split_children;
    }
    let mut rounds = 0;
    while !deepen.is_empty() && rounds < EDGE_RESPLIT_ROUNDS {
        let mut next = Vec::new();
        for (node, axis) in deepen {
            let still_touching = node.min_on_axis(axis) == root_bounds[axis].0
                || node.max_on_axis(axis) == root_bounds[axis].1;
            if !still_touching {
                continue;
            }
            let middle = (node.max_on_axis(axis) + node.min_on_axis(axis)) / two;
            let (n_low, n_high) = node.entries_if_split(middle, axis)?;
            if node.n_entries() == 0 || count_ratio(n_low, n_high) >= EDGE_RESPLIT_RATIO {
                continue;
            }
            node.split_leaf(middle, *max_index, axis)?;
            *max_index += 2;
            let NodeKind::Split { left, right, .. } = &mut node.kind else {
                unreachable!("split_leaf left a terminal node");
            };
            next.push((&mut **left, axis));
            next.push((&mut **right, axis));
        }
        deepen = next;
        rounds += 1;
    }
    Ok(())
}
