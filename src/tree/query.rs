//! Structural queries: point lookup, leaf enumeration and subtree folds.

use array_init::array_init;
use az::Cast;

use super::{Axis, BinLeaf, BinTree, NodeKind};

impl<A: Axis, const K: usize> BinTree<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
    f64: Cast<A>,
{
    /// The leaf containing `point`.
    ///
    /// Descends `< cut` to the left, so a point sitting exactly on a cut
    /// resolves to the upper leaf. `None` if the point is outside the
    /// reached leaf's box.
    pub fn get_leaf(&self, point: &[A; K]) -> Option<&BinLeaf<A, K>> {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.in_bin(point).then_some(leaf),
            NodeKind::Split {
                split_dim,
                split_val,
                left,
                right,
            } => {
                if point[*split_dim] < *split_val {
                    left.get_leaf(point)
                } else {
                    right.get_leaf(point)
                }
            }
        }
    }

    /// All leaves, in tree order.
    pub fn leaves(&self) -> Vec<&BinLeaf<A, K>> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a BinLeaf<A, K>>) {
        match &self.kind {
            NodeKind::Leaf(leaf) => out.push(leaf),
            NodeKind::Split { left, right, .. } => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            }
        }
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(_) => 1,
            NodeKind::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }

    /// The single-leaf nodes, in tree order.
    pub fn terminal_nodes(&self) -> Vec<&BinTree<A, K>> {
        let mut out = Vec::new();
        self.collect_terminal(&mut out);
        out
    }

    fn collect_terminal<'a>(&'a self, out: &mut Vec<&'a BinTree<A, K>>) {
        match &self.kind {
            NodeKind::Leaf(_) => out.push(self),
            NodeKind::Split { left, right, .. } => {
                left.collect_terminal(out);
                right.collect_terminal(out);
            }
        }
    }

    pub(crate) fn terminal_nodes_mut(&mut self) -> Vec<&mut BinTree<A, K>> {
        let mut out = Vec::new();
        self.collect_terminal_mut(&mut out);
        out
    }

    fn collect_terminal_mut<'a>(&'a mut self, out: &mut Vec<&'a mut BinTree<A, K>>) {
        if self.is_leaf() {
            out.push(self);
            return;
        }
        if let NodeKind::Split { left, right, .. } = &mut self.kind {
            left.collect_terminal_mut(out);
            right.collect_terminal_mut(out);
        }
    }

    /// Every leaf sharing a face with `leaf`. Linear scan over the
    /// leaves; fine at the scales the builder produces.
    pub fn find_neighbor_leaves(&self, leaf: &BinLeaf<A, K>) -> Vec<&BinLeaf<A, K>> {
        self.leaves()
            .into_iter()
            .filter(|other| other.is_neighbor(leaf))
            .collect()
    }

    /// Smallest lower boundary on `axis` across the subtree.
    pub fn min_on_axis(&self, axis: usize) -> A {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.min(axis),
            NodeKind::Split { left, right, .. } => {
                left.min_on_axis(axis).min(right.min_on_axis(axis))
            }
        }
    }

    /// Largest upper boundary on `axis` across the subtree.
    pub fn max_on_axis(&self, axis: usize) -> A {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.max(axis),
            NodeKind::Split { left, right, .. } => {
                left.max_on_axis(axis).max(right.max_on_axis(axis))
            }
        }
    }

    /// Narrowest leaf extent on `axis` across the subtree.
    pub fn min_bin_width(&self, axis: usize) -> A {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.width(axis),
            NodeKind::Split { left, right, .. } => {
                left.min_bin_width(axis).min(right.min_bin_width(axis))
            }
        }
    }

    /// Smallest leaf entry count across the subtree.
    pub fn min_entries(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.n_entries(),
            NodeKind::Split { left, right, .. } => left.min_entries().min(right.min_entries()),
        }
    }

    /// Largest leaf entry count across the subtree.
    pub fn max_entries(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.n_entries(),
            NodeKind::Split { left, right, .. } => left.max_entries().max(right.max_entries()),
        }
    }

    /// Total entry count.
    pub fn n_entries(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.n_entries(),
            NodeKind::Split { left, right, .. } => left.n_entries() + right.n_entries(),
        }
    }

    /// Total entry weight.
    pub fn sum_of_weights(&self) -> A {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.sum_of_weights(),
            NodeKind::Split { left, right, .. } => {
                left.sum_of_weights() + right.sum_of_weights()
            }
        }
    }

    /// Largest leaf index in the subtree; the builder assigns fresh
    /// indices above it.
    pub fn max_leaf_index(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.index(),
            NodeKind::Split { left, right, .. } => {
                left.max_leaf_index().max(right.max_leaf_index())
            }
        }
    }

    /// The subtree's bounding box as `(min, max)` per axis.
    pub fn bin_boundaries(&self) -> [(A, A); K] {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.bin_boundaries(),
            NodeKind::Split { .. } => {
                array_init(|a| (self.min_on_axis(a), self.max_on_axis(a)))
            }
        }
    }
}
