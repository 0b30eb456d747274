//! Reference grids and dense per-cell fields.
//!
//! A [`Grid`] describes the fixed binning that adaptive cuts may be
//! snapped to and that leaf contents are projected onto. It never holds
//! data itself; projections fill a [`GridField`] shaped like it.

use array_init::{array_init, try_array_init};
use az::{Az, Cast};

use crate::error::{Error, Result};
use crate::tree::Axis;

/// Ordered bin edges along one axis of a reference grid.
#[derive(Clone, Debug)]
pub struct GridAxis<A> {
    edges: Vec<A>,
}

impl<A: Axis> GridAxis<A>
where
    usize: Cast<A>,
{
    /// Build an axis from explicit edges, which must be strictly
    /// increasing and at least two.
    pub fn from_edges(edges: Vec<A>) -> Result<Self> {
        if edges.len() < 2 || edges.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(Error::BadGridAxis);
        }
        Ok(GridAxis { edges })
    }

    /// Build an axis of `n_bins` equal-width bins spanning `[min, max]`.
    pub fn uniform(min: A, max: A, n_bins: usize) -> Result<Self> {
        if n_bins == 0 || max <= min {
            return Err(Error::BadGridAxis);
        }
        let width = (max - min) / n_bins.az::<A>();
        let mut edges: Vec<A> = (0..n_bins).map(|i| min + width * i.az::<A>()).collect();
        edges.push(max);
        Self::from_edges(edges)
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// The edge values, `n_bins + 1` of them.
    pub fn edges(&self) -> &[A] {
        &self.edges
    }

    /// Index of the bin containing `x`, clamped to the axis range.
    pub fn find_bin(&self, x: A) -> usize {
        let upper = self.edges.partition_point(|&edge| edge <= x);
        upper.saturating_sub(1).min(self.n_bins() - 1)
    }

    /// Lower edge of `bin`.
    pub fn low_edge(&self, bin: usize) -> A {
        self.edges[bin]
    }

    /// Upper edge of `bin`.
    pub fn up_edge(&self, bin: usize) -> A {
        self.edges[bin + 1]
    }

    /// Center of `bin`.
    pub fn center(&self, bin: usize) -> A {
        (self.edges[bin] + self.edges[bin + 1]) / 2usize.az::<A>()
    }

    /// Width of `bin`.
    pub fn bin_width(&self, bin: usize) -> A {
        self.edges[bin + 1] - self.edges[bin]
    }
}

/// A K-dimensional reference grid, one [`GridAxis`] per axis.
#[derive(Clone, Debug)]
pub struct Grid<A, const K: usize> {
    axes: [GridAxis<A>; K],
}

impl<A: Axis, const K: usize> Grid<A, K>
where
    usize: Cast<A>,
{
    /// Assemble a grid from per-axis edge sets.
    pub fn new(axes: [GridAxis<A>; K]) -> Self {
        Grid { axes }
    }

    /// Equal-width binning per axis.
    pub fn uniform(min: [A; K], max: [A; K], n_bins: [usize; K]) -> Result<Self> {
        let axes = try_array_init(|a| GridAxis::uniform(min[a], max[a], n_bins[a]))?;
        Ok(Grid { axes })
    }

    /// The edge set along `axis`.
    pub fn axis(&self, axis: usize) -> &GridAxis<A> {
        &self.axes[axis]
    }

    /// Bin counts per axis.
    pub fn shape(&self) -> [usize; K] {
        array_init(|a| self.axes[a].n_bins())
    }

    /// Center point of the cell at `cell`.
    pub fn cell_center(&self, cell: [usize; K]) -> [A; K] {
        array_init(|a| self.axes[a].center(cell[a]))
    }

    /// Iterate all cell indices in row-major order (last axis fastest).
    pub fn cells(&self) -> CellIter<K> {
        CellIter::new(self.shape())
    }
}

/// Row-major iterator over the cell indices of a shape.
pub struct CellIter<const K: usize> {
    shape: [usize; K],
    next: Option<[usize; K]>,
}

impl<const K: usize> CellIter<K> {
    fn new(shape: [usize; K]) -> Self {
        let empty = shape.iter().any(|&n| n == 0);
        CellIter {
            shape,
            next: if empty { None } else { Some([0; K]) },
        }
    }
}

impl<const K: usize> Iterator for CellIter<K> {
    type Item = [usize; K];

    fn next(&mut self) -> Option<[usize; K]> {
        let current = self.next?;
        let mut bumped = current;
        self.next = None;
        for axis in (0..K).rev() {
            bumped[axis] += 1;
            if bumped[axis] < self.shape[axis] {
                self.next = Some(bumped);
                break;
            }
            bumped[axis] = 0;
        }
        Some(current)
    }
}

/// Dense row-major scalar field shaped like a [`Grid`].
#[derive(Clone, Debug, PartialEq)]
pub struct GridField<A, const K: usize> {
    shape: [usize; K],
    data: Vec<A>,
}

impl<A: Axis, const K: usize> GridField<A, K> {
    /// An all-zero field of the given shape.
    pub fn zeros(shape: [usize; K]) -> Self {
        let len = shape.iter().product();
        GridField {
            shape,
            data: vec![A::zero(); len],
        }
    }

    /// Bin counts per axis.
    pub fn shape(&self) -> [usize; K] {
        self.shape
    }

    fn offset(&self, cell: [usize; K]) -> usize {
        let mut offset = 0;
        for axis in 0..K {
            debug_assert!(cell[axis] < self.shape[axis], "cell index out of range");
            offset = offset * self.shape[axis] + cell[axis];
        }
        offset
    }

    /// Value of the cell at `cell`.
    pub fn get(&self, cell: [usize; K]) -> A {
        self.data[self.offset(cell)]
    }

    /// Overwrite the cell at `cell`.
    pub fn set(&mut self, cell: [usize; K], value: A) {
        let offset = self.offset(cell);
        self.data[offset] = value;
    }

    /// The raw cell values in row-major order.
    pub fn values(&self) -> &[A] {
        &self.data
    }

    /// Sum over every cell.
    pub fn total(&self) -> A {
        self.data.iter().fold(A::zero(), |acc, &v| acc + v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0)]
    #[case(0.3, 0)]
    #[case(0.4, 1)]
    #[case(0.5, 1)]
    #[case(0.6, 2)]
    #[case(1.0, 2)]
    #[case(-0.1, 0)]
    #[case(1.5, 2)]
    fn find_bin_locates_and_clamps(#[case] x: f64, #[case] expected: usize) {
        let axis = GridAxis::from_edges(vec![0.0, 0.4, 0.6, 1.0]).unwrap();
        assert_eq!(axis.find_bin(x), expected);
    }

    #[test]
    fn uniform_axis_hits_exact_extremes() {
        let axis = GridAxis::<f64>::uniform(0.0, 1.0, 4).unwrap();
        assert_eq!(axis.n_bins(), 4);
        assert_eq!(axis.low_edge(0), 0.0);
        assert_eq!(axis.up_edge(3), 1.0);
        assert_eq!(axis.center(1), 0.375);
        assert_eq!(axis.bin_width(2), 0.25);
    }

    #[test]
    fn degenerate_axes_are_rejected() {
        assert!(GridAxis::<f64>::uniform(1.0, 1.0, 4).is_err());
        assert!(GridAxis::<f64>::uniform(0.0, 1.0, 0).is_err());
        assert!(GridAxis::from_edges(vec![0.0, 0.5, 0.5, 1.0]).is_err());
        assert!(GridAxis::from_edges(vec![0.3]).is_err());
    }

    #[test]
    fn cells_iterate_row_major() {
        let grid = Grid::<f64, 2>::uniform([0.0; 2], [1.0; 2], [2, 3]).unwrap();
        let cells: Vec<[usize; 2]> = grid.cells().collect();
        assert_eq!(
            cells,
            vec![[0, 0], [0, 1], [0, 2], [1, 0], [1, 1], [1, 2]]
        );
    }

    #[test]
    fn field_round_trips_cell_values() {
        let mut field = GridField::<f64, 3>::zeros([2, 3, 4]);
        field.set([1, 2, 3], 7.5);
        field.set([0, 0, 0], 1.0);
        assert_eq!(field.get([1, 2, 3]), 7.5);
        assert_eq!(field.values().len(), 24);
        assert_eq!(field.total(), 8.5);
    }
}
