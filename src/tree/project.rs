//! Projections of the leaf partition onto a reference grid.

use std::collections::HashMap;

use array_init::array_init;
use az::{Az, Cast};

use super::{Axis, BinTree};
use crate::error::{Error, Result};
use crate::grid::{Grid, GridField};

/// Leaf count separating the all-leaves width estimator from the
/// neighbors-only one.
const WIDTH_MODE_CUTOFF: usize = 500;
/// Distance floor, as a fraction of the contributing leaf width, in the
/// all-leaves estimator.
const LOW_STAT_FLOOR: f64 = 0.001;
/// Distance floor in the neighbors-only estimator.
const HIGH_STAT_FLOOR: f64 = 0.05;

impl<A: Axis, const K: usize> BinTree<A, K>
where
    usize: Cast<A>,
    A: Cast<usize>,
    f64: Cast<A>,
{
    /// Project the leaf totals onto the reference grid.
    ///
    /// Each grid cell is attributed to the leaf containing its center;
    /// each leaf then spreads its weight sum evenly over its cells.
    /// Requires a grid constraint and at most three dimensions.
    pub fn fill_histogram(&self) -> Result<GridField<A, K>> {
        let grid = self.grid_constraint.clone().ok_or(Error::MissingGrid)?;
        if K > 3 {
            return Err(Error::TooManyDimensions { dims: K });
        }
        let mut cells_by_leaf: HashMap<usize, (A, Vec<[usize; K]>)> = HashMap::new();
        for cell in grid.cells() {
            let center = grid.cell_center(cell);
            if let Some(leaf) = self.get_leaf(&center) {
                cells_by_leaf
                    .entry(leaf.index())
                    .or_insert_with(|| (leaf.sum_of_weights(), Vec::new()))
                    .1
                    .push(cell);
            }
        }
        let mut histogram = GridField::zeros(grid.shape());
        for (sum_of_weights, cells) in cells_by_leaf.into_values() {
            let share = sum_of_weights / cells.len().az::<A>();
            for cell in cells {
                histogram.set(cell, share);
            }
        }
        Ok(histogram)
    }

    /// Per-axis local bin-width estimate over the reference grid.
    ///
    /// Every grid cell receives, for each axis, an inverse-distance
    /// weighted mean of leaf widths. Up to 500 leaves all of them
    /// contribute (distances normalized to the root spans, `1/Δr²`
    /// weighting), which smooths the transitions; above that only
    /// the containing leaf and its face-touching neighbors are used
    /// (raw distances, `1/Δr` weighting). The binning is taken from
    /// `template` when given, else from the grid constraint.
    pub fn fill_widths(&self, template: Option<&Grid<A, K>>) -> Result<[GridField<A, K>; K]> {
        let grid = match template {
            Some(grid) => grid,
            None => self.grid_constraint.as_deref().ok_or(Error::MissingGrid)?,
        };
        if K > 3 {
            return Err(Error::TooManyDimensions { dims: K });
        }
        if self.n_leaves() <= WIDTH_MODE_CUTOFF {
            self.fill_widths_low_stat(grid)
        } else {
            self.fill_widths_high_stat(grid)
        }
    }

    fn fill_widths_low_stat(&self, grid: &Grid<A, K>) -> Result<[GridField<A, K>; K]> {
        let shape = grid.shape();
        let mut widths: [GridField<A, K>; K] = array_init(|_| GridField::zeros(shape));
        let all_leaves = self.leaves();
        let bounds = self.bin_boundaries();
        let spans: [A; K] = array_init(|a| bounds[a].1 - bounds[a].0);
        let floor = LOW_STAT_FLOOR.az::<A>();
        for cell in grid.cells() {
            let center = grid.cell_center(cell);
            let Some(leaf) = self.get_leaf(&center) else {
                continue;
            };
            // fine leaves fit the grid as they are
            if (0..K).all(|a| leaf.width(a) <= grid.axis(a).bin_width(cell[a])) {
                for (axis, field) in widths.iter_mut().enumerate() {
                    field.set(cell, leaf.width(axis));
                }
                continue;
            }
            let mut sum_weights = A::zero();
            let mut sum_widths = [A::zero(); K];
            for other in &all_leaves {
                let mut distance_sq = A::zero();
                for a in 0..K {
                    let mut d = (other.center(a) - center[a]).abs() / spans[a];
                    let least = floor * other.width(a);
                    if d < least {
                        d = least;
                    }
                    distance_sq = distance_sq + d * d;
                }
                let weight = A::one() / distance_sq;
                sum_weights = sum_weights + weight;
                for a in 0..K {
                    sum_widths[a] = sum_widths[a] + other.width(a) * weight;
                }
            }
            for (axis, field) in widths.iter_mut().enumerate() {
                field.set(cell, sum_widths[axis] / sum_weights);
            }
        }
        Ok(widths)
    }

    fn fill_widths_high_stat(&self, grid: &Grid<A, K>) -> Result<[GridField<A, K>; K]> {
        let shape = grid.shape();
        let mut widths: [GridField<A, K>; K] = array_init(|_| GridField::zeros(shape));
        let floor = HIGH_STAT_FLOOR.az::<A>();
        for cell in grid.cells() {
            let center = grid.cell_center(cell);
            let Some(leaf) = self.get_leaf(&center) else {
                continue;
            };
            let mut local = self.find_neighbor_leaves(leaf);
            local.push(leaf);
            let mut sum_weights = A::zero();
            let mut sum_widths = [A::zero(); K];
            for other in &local {
                let mut distance_sq = A::zero();
                for a in 0..K {
                    let mut d = (other.center(a) - center[a]).abs();
                    let least = floor * other.width(a);
                    if d < least {
                        d = least;
                    }
                    distance_sq = distance_sq + d * d;
                }
                let weight = A::one() / distance_sq.sqrt();
                sum_weights = sum_weights + weight;
                for a in 0..K {
                    sum_widths[a] = sum_widths[a] + other.width(a) * weight;
                }
            }
            for (axis, field) in widths.iter_mut().enumerate() {
                field.set(cell, sum_widths[axis] / sum_weights);
            }
        }
        Ok(widths)
    }

    /// The four boundary segments of every leaf box, each as a
    /// `[start, end]` point pair. Only two-dimensional trees draw
    /// anything; other dimensionalities yield an empty set.
    pub fn boundary_segments(&self) -> Vec<[[A; 2]; 2]> {
        let mut segments = Vec::new();
        if K != 2 {
            return segments;
        }
        for leaf in self.leaves() {
            let (x0, x1) = (leaf.min(0), leaf.max(0));
            let (y0, y1) = (leaf.min(1), leaf.max(1));
            segments.push([[x0, y0], [x0, y1]]);
            segments.push([[x0, y1], [x1, y1]]);
            segments.push([[x1, y1], [x1, y0]]);
            segments.push([[x1, y0], [x0, y0]]);
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;

    type AX = f64;

    /// A tree split by hand at x = 0.5: three entries left, one right.
    fn halved_tree(grid: Option<Grid<AX, 2>>) -> BinTree<AX, 2> {
        let points = [[0.1, 0.2], [0.2, 0.6], [0.4, 0.8], [0.9, 0.5]];
        let weights = [1.0, 2.0, 3.0, 4.0];
        let mut tree = BinTree::new([0.0, 0.0], [1.0, 1.0], &points, &weights).unwrap();
        if let Some(grid) = grid {
            tree.set_grid_constraint(Arc::new(grid));
        }
        tree.leaf_mut().unwrap().sort_entries();
        tree.split_leaf(0.5, 0, 0).unwrap();
        tree
    }

    fn unit_grid(n_bins: [usize; 2]) -> Grid<AX, 2> {
        Grid::uniform([0.0, 0.0], [1.0, 1.0], n_bins).unwrap()
    }

    #[test]
    fn histogram_requires_a_grid() {
        let tree = halved_tree(None);
        assert!(matches!(tree.fill_histogram(), Err(Error::MissingGrid)));
        assert!(matches!(tree.fill_widths(None), Err(Error::MissingGrid)));
    }

    #[test]
    fn histogram_spreads_leaf_weight_over_its_cells() {
        let tree = halved_tree(Some(unit_grid([4, 2])));
        let histogram = tree.fill_histogram().unwrap();
        assert_eq!(histogram.shape(), [4, 2]);
        // left leaf: weight 6 over 4 cells; right leaf: weight 4 over 4
        for cell in [[0, 0], [0, 1], [1, 0], [1, 1]] {
            assert_relative_eq!(histogram.get(cell), 1.5);
        }
        for cell in [[2, 0], [2, 1], [3, 0], [3, 1]] {
            assert_relative_eq!(histogram.get(cell), 1.0);
        }
        assert_relative_eq!(histogram.total(), 10.0);
    }

    #[test]
    fn width_template_overrides_the_grid_constraint() {
        let tree = halved_tree(None);
        let widths = tree.fill_widths(Some(&unit_grid([2, 2]))).unwrap();
        assert_eq!(widths[0].shape(), [2, 2]);
    }

    #[test]
    fn coarse_leaves_blend_widths_across_the_partition() {
        let tree = halved_tree(Some(unit_grid([4, 2])));
        let widths = tree.fill_widths(None).unwrap();
        // both leaves are wider than the 0.25 x 0.5 grid cells, so every
        // cell gets the inverse-distance blend; with the two leaves
        // sharing the same extents the blend is exact
        for cell in unit_grid([4, 2]).cells() {
            assert_relative_eq!(widths[0].get(cell), 0.5);
            assert_relative_eq!(widths[1].get(cell), 1.0);
        }
    }

    #[test]
    fn fine_leaves_pass_their_widths_through() {
        // a 1x1 grid makes every leaf narrower than the single cell on
        // axis 0 is wide, except that the leaf heights equal the cell
        // height, so the fast path applies
        let tree = halved_tree(Some(unit_grid([1, 1])));
        let widths = tree.fill_widths(None).unwrap();
        // the single cell center (0.5, 0.5) resolves to the right leaf
        assert_relative_eq!(widths[0].get([0, 0]), 0.5);
        assert_relative_eq!(widths[1].get([0, 0]), 1.0);
    }

    #[test]
    fn boundary_segments_trace_every_leaf() {
        let tree = halved_tree(None);
        let segments = tree.boundary_segments();
        assert_eq!(segments.len(), 8);
        assert!(segments.contains(&[[0.5, 0.0], [0.5, 1.0]]));
        let three_d =
            BinTree::<AX, 3>::new([0.0; 3], [1.0; 3], &[[0.5; 3]], &[1.0]).unwrap();
        assert!(three_d.boundary_segments().is_empty());
    }
}
