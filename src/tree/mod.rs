//! The adaptive binning tree and its leaves.

use std::fmt::Debug;
use std::sync::Arc;

use array_init::array_init;
use az::{Az, Cast};
use num_traits::Float;
use tracing::warn;

use crate::entry_list::EntryList;
use crate::error::{Error, Result};
use crate::grid::Grid;

mod build;
mod project;
mod query;

/// Trait collecting the bounds required of the coordinate type, the
/// first generic parameter `A` of [`BinTree`]. Implemented for `f32`
/// and `f64`.
pub trait Axis: Float + Default + Debug + Copy + Sync + Cast<f64> {}
impl<T: Float + Default + Debug + Copy + Sync + Cast<f64>> Axis for T {}

/// Default effective-entry threshold below which a bin is not split.
const DEFAULT_MIN_LEAF_ENTRIES: usize = 200;
/// Default anti-elongation parameter.
const DEFAULT_MAX_AXIS_ASYMMETRY: f64 = 2.0;

/// Relative tolerance with an absolute floor of the same magnitude,
/// for deciding that two box faces coincide.
fn faces_touch<A: Axis>(a: A, b: A) -> bool
where
    f64: Cast<A>,
{
    let tolerance = 1e-10f64.az::<A>();
    let scale = a.abs().max(b.abs()).max(A::one());
    (a - b).abs() <= tolerance * scale
}

/// An axis-aligned box carrying its captured samples and a stable
/// integer identity.
///
/// Boundaries are inclusive on both sides for containment tests; point
/// lookup through the tree resolves cut values to the high side, so a
/// point sitting exactly on a cut is found in the upper leaf while still
/// being "in" the lower leaf's box.
#[derive(Clone, Debug)]
pub struct BinLeaf<A: Axis, const K: usize> {
    min_bound: [A; K],
    max_bound: [A; K],
    entries: EntryList<A, K>,
    index: usize,
}

impl<A: Axis, const K: usize> BinLeaf<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
    f64: Cast<A>,
{
    pub(crate) fn new(min_bound: [A; K], max_bound: [A; K]) -> Result<Self> {
        for axis in 0..K {
            if min_bound[axis] >= max_bound[axis] {
                return Err(Error::ZeroWidthBin {
                    axis,
                    low: min_bound[axis].az::<f64>(),
                    high: max_bound[axis].az::<f64>(),
                });
            }
        }
        Ok(BinLeaf {
            min_bound,
            max_bound,
            entries: EntryList::new(),
            index: 0,
        })
    }

    /// Lower boundary on `axis`.
    pub fn min(&self, axis: usize) -> A {
        self.min_bound[axis]
    }

    /// Upper boundary on `axis`.
    pub fn max(&self, axis: usize) -> A {
        self.max_bound[axis]
    }

    /// Extent on `axis`.
    pub fn width(&self, axis: usize) -> A {
        self.max_bound[axis] - self.min_bound[axis]
    }

    /// Midpoint on `axis`.
    pub fn center(&self, axis: usize) -> A {
        (self.max_bound[axis] + self.min_bound[axis]) / 2usize.az::<A>()
    }

    /// Boundaries as `(min, max)` per axis.
    pub fn bin_boundaries(&self) -> [(A, A); K] {
        array_init(|a| (self.min_bound[a], self.max_bound[a]))
    }

    pub(crate) fn min_bounds(&self) -> [A; K] {
        self.min_bound
    }

    pub(crate) fn max_bounds(&self) -> [A; K] {
        self.max_bound
    }

    /// The leaf's stable identity, assigned by the builder.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    /// Number of entries held.
    pub fn n_entries(&self) -> usize {
        self.entries.size()
    }

    /// Kish effective entry count of the held samples.
    pub fn effective_n_entries(&self) -> usize {
        self.entries.effective_size()
    }

    /// Sum of the held entry weights.
    pub fn sum_of_weights(&self) -> A {
        self.entries.sum_of_weights()
    }

    /// The held samples.
    pub fn entries(&self) -> &EntryList<A, K> {
        &self.entries
    }

    pub(crate) fn set_entries(&mut self, entries: EntryList<A, K>) {
        self.entries = entries;
    }

    pub(crate) fn sort_entries(&mut self) {
        self.entries.sort();
    }

    /// Whether `point` lies inside the box, boundaries included.
    pub fn in_bin(&self, point: &[A; K]) -> bool {
        (0..K).all(|a| point[a] >= self.min_bound[a] && point[a] <= self.max_bound[a])
    }

    /// Append a sample if the box contains it; returns whether it was
    /// taken. The entry list is left unsorted.
    pub fn add_entry(&mut self, point: &[A; K], weight: A) -> bool {
        if !self.in_bin(point) {
            return false;
        }
        self.entries.add(point, weight);
        true
    }

    /// Touching-faces test: the boxes share a boundary on some axis
    /// (within tolerance) and their open intervals overlap on every
    /// other axis.
    pub fn is_neighbor(&self, other: &BinLeaf<A, K>) -> bool {
        for axis in 0..K {
            let touching = faces_touch(self.max_bound[axis], other.min_bound[axis])
                || faces_touch(self.min_bound[axis], other.max_bound[axis]);
            if !touching {
                continue;
            }
            let overlaps = (0..K).filter(|&a| a != axis).all(|a| {
                other.max_bound[a] > self.min_bound[a] && other.min_bound[a] < self.max_bound[a]
            });
            if overlaps {
                return true;
            }
        }
        false
    }
}

/// The two shapes of a tree node: a terminal box of samples, or an
/// axis-aligned cut with two children.
#[derive(Clone, Debug)]
enum NodeKind<A: Axis, const K: usize> {
    Leaf(BinLeaf<A, K>),
    Split {
        split_dim: usize,
        split_val: A,
        left: Box<BinTree<A, K>>,
        right: Box<BinTree<A, K>>,
    },
}

/// Adaptive binning tree over weighted K-dimensional samples.
///
/// Construction takes the root box and all samples up front; nothing is
/// streamed in later. [`build`](BinTree::build) then subdivides the box
/// by axis-aligned cuts, choosing at each step the terminal bin and axis
/// with the steepest sample-density gradient and cutting at the median,
/// until no bin keeps enough effective entries, has a usable gradient,
/// or survives the cut constraints. Cuts can be snapped to a shared
/// reference [`Grid`] and are shifted or vetoed when they would leave a
/// bin much thinner on one axis than on the others.
#[derive(Clone, Debug)]
pub struct BinTree<A: Axis, const K: usize> {
    kind: NodeKind<A, K>,
    min_leaf_entries: usize,
    max_axis_asymmetry: A,
    grid_constraint: Option<Arc<Grid<A, K>>>,
    /// Axes on which further splitting of this node is forbidden.
    /// Local to the node: children start with a clean slate.
    veto_split: [bool; K],
}

impl<A: Axis, const K: usize> BinTree<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
    f64: Cast<A>,
{
    /// Create a single-bin tree over the box `[min_bound, max_bound]`
    /// holding every sample that falls inside it.
    ///
    /// Samples outside the box are skipped with a warning; a zero-width
    /// box or mismatched slice lengths are errors.
    pub fn new(
        min_bound: [A; K],
        max_bound: [A; K],
        points: &[[A; K]],
        weights: &[A],
    ) -> Result<Self> {
        if points.len() != weights.len() {
            return Err(Error::LengthMismatch {
                entries: points.len(),
                weights: weights.len(),
            });
        }
        let mut leaf = BinLeaf::new(min_bound, max_bound)?;
        let mut dropped = 0usize;
        for (point, &weight) in points.iter().zip(weights) {
            if !leaf.add_entry(point, weight) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            warn!(dropped, "samples outside the root box were ignored");
        }
        Ok(BinTree {
            kind: NodeKind::Leaf(leaf),
            min_leaf_entries: DEFAULT_MIN_LEAF_ENTRIES,
            max_axis_asymmetry: DEFAULT_MAX_AXIS_ASYMMETRY.az::<A>(),
            grid_constraint: None,
            veto_split: [false; K],
        })
    }

    /// A child node inheriting this node's configuration but not its
    /// vetoes.
    fn child_with(&self, leaf: BinLeaf<A, K>) -> BinTree<A, K> {
        BinTree {
            kind: NodeKind::Leaf(leaf),
            min_leaf_entries: self.min_leaf_entries,
            max_axis_asymmetry: self.max_axis_asymmetry,
            grid_constraint: self.grid_constraint.clone(),
            veto_split: [false; K],
        }
    }

    /// Effective-entry threshold under which a bin stays terminal.
    /// Takes effect on the next [`build`](BinTree::build).
    pub fn set_min_leaf_entries(&mut self, n: usize) {
        self.min_leaf_entries = n;
    }

    /// Anti-elongation parameter: how much thinner (relative to the
    /// root box) a bin may be on the cut axis than on its widest other
    /// axis. Takes effect on the next [`build`](BinTree::build).
    pub fn set_max_axis_asymmetry(&mut self, asymmetry: A) {
        self.max_axis_asymmetry = asymmetry;
    }

    /// Attach the reference grid that cut values are snapped to and
    /// that projections fill. Shared, read-only.
    pub fn set_grid_constraint(&mut self, grid: Arc<Grid<A, K>>) {
        self.grid_constraint = Some(grid);
    }

    /// Whether this node is terminal.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// The node's bin, if terminal.
    pub fn leaf(&self) -> Option<&BinLeaf<A, K>> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Split { .. } => None,
        }
    }

    pub(crate) fn leaf_mut(&mut self) -> Option<&mut BinLeaf<A, K>> {
        match &mut self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Split { .. } => None,
        }
    }

    /// The two children, if the node has been split.
    pub fn children(&self) -> Option<(&BinTree<A, K>, &BinTree<A, K>)> {
        match &self.kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Split { left, right, .. } => Some((left, right)),
        }
    }

    /// The `(axis, value)` cut of an internal node.
    pub fn cut(&self) -> Option<(usize, A)> {
        match &self.kind {
            NodeKind::Leaf(_) => None,
            NodeKind::Split {
                split_dim,
                split_val,
                ..
            } => Some((*split_dim, *split_val)),
        }
    }

    /// Whether splitting this node along `axis` has been vetoed.
    pub fn is_split_vetoed(&self, axis: usize) -> bool {
        self.veto_split[axis]
    }
}
