//! Weighted sample storage with one sorted view per axis.

use array_init::array_init;
use az::{Az, Cast};

use crate::tree::Axis;

/// Weighted K-dimensional samples with per-axis sorted views.
///
/// Entries are appended with [`add`](EntryList::add) in any order;
/// [`sort`](EntryList::sort) must be called before any of the quantile,
/// gradient or split queries. Sorting builds, for every axis, the sample
/// values in ascending order together with the permutation linking them
/// back to insertion order, so repeated queries never re-sort. Splitting
/// produces two fresh, already sorted lists and leaves the source
/// untouched.
#[derive(Clone, Debug)]
pub struct EntryList<A: Axis, const K: usize> {
    weights: Vec<A>,
    /// Per axis: `(value, entry)` pairs, ascending in value once sorted.
    sorted_values: [Vec<(A, usize)>; K],
    /// Per entry and axis: position of that entry in `sorted_values[axis]`.
    sorted_positions: Vec<[usize; K]>,
    sum_of_weights: A,
    sum_of_weights_error: A,
    max_weight: A,
    sorted: bool,
}

impl<A: Axis, const K: usize> Default for EntryList<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Axis, const K: usize> EntryList<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
{
    /// Create an empty list.
    pub fn new() -> Self {
        EntryList {
            weights: Vec::new(),
            sorted_values: array_init(|_| Vec::new()),
            sorted_positions: Vec::new(),
            sum_of_weights: A::zero(),
            sum_of_weights_error: A::zero(),
            max_weight: A::zero(),
            sorted: false,
        }
    }

    /// Create an empty list with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        EntryList {
            weights: Vec::with_capacity(capacity),
            sorted_values: array_init(|_| Vec::with_capacity(capacity)),
            sorted_positions: Vec::with_capacity(capacity),
            sum_of_weights: A::zero(),
            sum_of_weights_error: A::zero(),
            max_weight: A::zero(),
            sorted: false,
        }
    }

    /// Append one weighted sample. Invalidates the sorted views until the
    /// next [`sort`](EntryList::sort).
    pub fn add(&mut self, values: &[A; K], weight: A) {
        let entry = self.weights.len();
        for (axis, &value) in values.iter().enumerate() {
            self.sorted_values[axis].push((value, entry));
        }
        self.sorted_positions.push([entry; K]);
        self.weights.push(weight);
        self.sorted = false;
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.weights.len()
    }

    /// Whether the list holds no entries.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Sort every per-axis view and refresh the cached aggregates.
    pub fn sort(&mut self) {
        for axis in 0..K {
            self.sorted_values[axis]
                .sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).expect("entry sort failed"));
            for (position, &(_, entry)) in self.sorted_values[axis].iter().enumerate() {
                self.sorted_positions[entry][axis] = position;
            }
        }
        let mut sum = A::zero();
        let mut sum_sq = A::zero();
        let mut max = A::zero();
        for &w in &self.weights {
            sum = sum + w;
            sum_sq = sum_sq + w * w;
            if w > max {
                max = w;
            }
        }
        self.sum_of_weights = sum;
        self.sum_of_weights_error = sum_sq.sqrt();
        self.max_weight = max;
        self.sorted = true;
    }

    /// Kish's effective sample size `(Σw)² / Σw²`, truncated.
    ///
    /// The number of unit-weight entries that would give the same relative
    /// statistical error as the weighted sum. Zero when the list carries
    /// no weight at all.
    pub fn effective_size(&self) -> usize {
        debug_assert!(self.sorted, "effective_size queried before sort");
        if self.sum_of_weights_error == A::zero() {
            return 0;
        }
        let rel_error = self.sum_of_weights_error / self.sum_of_weights;
        (A::one() / (rel_error * rel_error)).az::<usize>()
    }

    /// Sum of the entry weights.
    pub fn sum_of_weights(&self) -> A {
        self.sum_of_weights
    }

    /// Statistical error on the weight sum, `√Σw²`.
    pub fn sum_of_weights_error(&self) -> A {
        self.sum_of_weights_error
    }

    /// Largest single entry weight.
    pub fn max_weight(&self) -> A {
        self.max_weight
    }

    /// Coordinate of entry `entry` (insertion order) on `axis`.
    pub fn value(&self, axis: usize, entry: usize) -> A {
        let position = self.sorted_positions[entry][axis];
        self.sorted_values[axis][position].0
    }

    /// Weight of entry `entry` (insertion order).
    pub fn weight(&self, entry: usize) -> A {
        self.weights[entry]
    }

    /// Values at the requested percentiles (0 to 100) along `axis`,
    /// returned in ascending-percentile order.
    ///
    /// Quantiles are plain order statistics over the raw entry count:
    /// weights are deliberately ignored, which is much faster and close
    /// enough for split selection.
    pub fn percentiles(&self, qs: &[A], axis: usize) -> Vec<A> {
        debug_assert!(self.sorted, "percentiles queried before sort");
        assert!(!self.is_empty(), "percentiles queried on an empty entry list");
        let n = self.weights.len();
        let hundred = 100usize.az::<A>();
        let mut qs = qs.to_vec();
        qs.sort_unstable_by(|a, b| a.partial_cmp(b).expect("percentile sort failed"));
        qs.iter()
            .map(|&q| {
                let index = (n.az::<A>() * q / hundred).az::<usize>().min(n - 1);
                self.sorted_values[axis][index].0
            })
            .collect()
    }

    /// Spread between the largest and smallest inter-quantile densities
    /// along `axis`, probing every `step` percent.
    ///
    /// Quantile boundaries are the observed extremes plus the interior
    /// percentiles; each interval contributes `n·step/100` entries over
    /// its width. Coincident quantiles (heavily discretized data) carry
    /// no density information and are skipped; if every interval is
    /// degenerate, or fewer than two entries exist, the gradient is zero
    /// and the axis reads as "nothing to split".
    pub fn density_gradient(&self, axis: usize, step: A) -> A {
        debug_assert!(self.sorted, "density_gradient queried before sort");
        let n = self.weights.len();
        if n < 2 {
            return A::zero();
        }
        let hundred = 100usize.az::<A>();
        let mut qs = Vec::new();
        let mut q = step;
        while q < hundred {
            qs.push(q);
            q = q + step;
        }
        let mut bounds = self.percentiles(&qs, axis);
        bounds.insert(0, self.sorted_values[axis][0].0);
        bounds.push(self.sorted_values[axis][n - 1].0);

        let per_interval = n.az::<A>() * step / hundred;
        let mut min_density = A::infinity();
        let mut max_density = A::zero();
        for pair in bounds.windows(2) {
            let width = pair[1] - pair[0];
            if width <= A::zero() {
                continue;
            }
            let density = per_interval / width;
            if density < min_density {
                min_density = density;
            }
            if density > max_density {
                max_density = density;
            }
        }
        if max_density == A::zero() {
            return A::zero();
        }
        (max_density - min_density).abs()
    }

    /// Partition into two fresh, sorted lists at `cut` on `axis`.
    ///
    /// Entries with `value < cut` go left; ties go right. The source is
    /// not modified and the entry multiset is preserved across the two
    /// halves.
    pub fn split(&self, axis: usize, cut: A) -> (Self, Self) {
        let mut left = Self::new();
        let mut right = Self::new();
        for &(value, entry) in &self.sorted_values[axis] {
            // regroup the entry's coordinates on every axis through the
            // position map
            let values: [A; K] =
                array_init(|d| self.sorted_values[d][self.sorted_positions[entry][d]].0);
            let weight = self.weights[entry];
            if value < cut {
                left.add(&values, weight);
            } else {
                right.add(&values, weight);
            }
        }
        // the cut axis is appended in order, but the other axes are not
        left.sort();
        right.sort();
        (left, right)
    }

    /// Left/right entry counts a cut would produce, without splitting.
    pub fn entries_if_split(&self, axis: usize, cut: A) -> (usize, usize) {
        debug_assert!(self.sorted, "entries_if_split queried before sort");
        let left = self.sorted_values[axis].partition_point(|&(value, _)| value < cut);
        (left, self.weights.len() - left)
    }
}
