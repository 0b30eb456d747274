//! End-to-end scenarios over the public binning API.

use std::sync::Arc;

use approx::assert_relative_eq;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use kdbin::{BinTree, Grid, GridAxis};

type AX = f64;

fn unit_square_tree(points: &[[AX; 2]], weights: &[AX], min_leaf_entries: usize) -> BinTree<AX, 2> {
    let mut tree = BinTree::new([0.0, 0.0], [1.0, 1.0], points, weights).unwrap();
    tree.set_min_leaf_entries(min_leaf_entries);
    tree
}

fn two_cluster_points() -> Vec<[AX; 2]> {
    vec![
        [0.18, 0.5],
        [0.19, 0.5],
        [0.21, 0.5],
        [0.22, 0.5],
        [0.78, 0.5],
        [0.79, 0.5],
        [0.81, 0.5],
        [0.82, 0.5],
    ]
}

fn random_cloud(n: usize, seed: u64) -> (Vec<[AX; 2]>, Vec<AX>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = (0..n)
        .map(|_| [rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)])
        .collect();
    let weights = (0..n).map(|_| rng.random_range(0.5..2.0)).collect();
    (points, weights)
}

/// Every entry of every leaf, as `(x, y, w)` triples in a canonical order.
fn collected_entries(tree: &BinTree<AX, 2>) -> Vec<(AX, AX, AX)> {
    tree.leaves()
        .iter()
        .flat_map(|leaf| {
            let entries = leaf.entries();
            (0..entries.size())
                .map(|e| (entries.value(0, e), entries.value(1, e), entries.weight(e)))
                .collect::<Vec<_>>()
        })
        .sorted_by(|a, b| a.partial_cmp(b).unwrap())
        .collect()
}

#[test]
fn too_few_entries_keep_a_single_bin() {
    let points = [[0.1, 0.1], [0.5, 0.5], [0.9, 0.9]];
    let weights = [1.0; 3];
    let mut tree = unit_square_tree(&points, &weights, 2);
    tree.build().unwrap();
    assert_eq!(tree.n_leaves(), 1);
    assert_eq!(tree.n_entries(), 3);
    assert!(tree.is_leaf());
}

#[test]
fn two_clusters_separate_at_the_median() {
    let points = two_cluster_points();
    let weights = vec![1.0; points.len()];
    let mut tree = unit_square_tree(&points, &weights, 2);
    tree.build().unwrap();

    // the top-level cut falls between the clusters
    let (axis, cut) = tree.cut().unwrap();
    assert_eq!(axis, 0);
    assert!(cut > 0.25 && cut < 0.79);
    assert_eq!(tree.n_entries(), 8);

    // exactly two populated bins of four entries, one per cluster, and
    // no leaf box straddles the separating cut
    let populated: Vec<_> = tree
        .leaves()
        .into_iter()
        .filter(|leaf| leaf.n_entries() > 0)
        .collect();
    assert_eq!(populated.len(), 2);
    for leaf in &populated {
        assert_eq!(leaf.n_entries(), 4);
    }
    for leaf in tree.leaves() {
        assert!(leaf.max(0) <= cut || leaf.min(0) >= cut);
    }
}

#[test]
fn four_clusters_land_in_four_distinct_bins() {
    let mut points = Vec::new();
    let centers = [(0.25, 0.25), (0.75, 0.25), (0.25, 0.75), (0.75, 0.75)];
    for &(cx, cy) in &centers {
        for _ in 0..3 {
            points.push([cx, cy]);
        }
        points.push([cx + 0.01, cy + 0.01]);
    }
    let weights = vec![1.0; points.len()];
    let mut tree = unit_square_tree(&points, &weights, 2);
    tree.build().unwrap();

    assert_eq!(tree.n_entries(), 16);
    assert_eq!(tree.n_leaves(), 12);
    let mut indices = Vec::new();
    for &(cx, cy) in &centers {
        let leaf = tree.get_leaf(&[cx, cy]).unwrap();
        assert_eq!(leaf.n_entries(), 4);
        // the offset point of the cluster shares the bin
        assert!(leaf.in_bin(&[cx + 0.01, cy + 0.01]));
        indices.push(leaf.index());
    }
    indices.sort_unstable();
    indices.dedup();
    assert_eq!(indices.len(), 4);
}

#[test]
fn heavy_weights_shrink_the_effective_size() {
    // ten raw entries but (19)²/109 ≈ 3 effective: below 2 x 2
    let mut points = vec![[0.1, 0.1]];
    let mut weights = vec![10.0];
    for i in 0..9 {
        points.push([0.1 + 0.09 * i as AX, 0.9 - 0.09 * i as AX]);
        weights.push(1.0);
    }
    let mut tree = unit_square_tree(&points, &weights, 2);
    tree.build().unwrap();
    assert_eq!(tree.n_leaves(), 1);
    assert_eq!(tree.n_entries(), 10);
}

#[test]
fn grid_constraint_snaps_the_separating_cut() {
    let points = two_cluster_points();
    let weights = vec![1.0; points.len()];
    let mut tree = unit_square_tree(&points, &weights, 2);
    let grid = Grid::new([
        GridAxis::from_edges(vec![0.0, 0.4, 0.6, 1.0]).unwrap(),
        GridAxis::uniform(0.0, 1.0, 1).unwrap(),
    ]);
    tree.set_grid_constraint(Arc::new(grid));
    tree.build().unwrap();

    // the median near 0.78 must land on a grid edge
    let (axis, cut) = tree.cut().unwrap();
    assert_eq!(axis, 0);
    assert_eq!(cut, 0.6);
    let populated: Vec<_> = tree
        .leaves()
        .into_iter()
        .filter(|leaf| leaf.n_entries() > 0)
        .collect();
    assert_eq!(populated.len(), 2);
    for leaf in tree.leaves() {
        assert!(leaf.max(0) <= 0.6 || leaf.min(0) >= 0.6);
    }
}

#[test]
fn partitions_preserve_the_entry_multiset() {
    let (points, weights) = random_cloud(400, 7);
    let mut tree = unit_square_tree(&points, &weights, 20);
    tree.build().unwrap();

    assert!(tree.n_leaves() > 1);
    assert_eq!(tree.n_entries(), 400);
    assert_relative_eq!(
        tree.sum_of_weights(),
        weights.iter().sum::<AX>(),
        max_relative = 1e-9
    );

    let collected = collected_entries(&tree);
    let expected: Vec<(AX, AX, AX)> = points
        .iter()
        .zip(&weights)
        .map(|(p, &w)| (p[0], p[1], w))
        .sorted_by(|a, b| a.partial_cmp(b).unwrap())
        .collect();
    assert_eq!(collected, expected);
}

#[test]
fn leaves_tile_the_root_box() {
    let (points, weights) = random_cloud(300, 11);
    let mut tree = unit_square_tree(&points, &weights, 15);
    tree.build().unwrap();

    let leaves = tree.leaves();
    // volumes add up to the root box
    let volume: AX = leaves
        .iter()
        .map(|leaf| leaf.width(0) * leaf.width(1))
        .sum();
    assert_relative_eq!(volume, 1.0, max_relative = 1e-9);
    // no two leaf interiors overlap
    for (i, a) in leaves.iter().enumerate() {
        for b in &leaves[i + 1..] {
            let overlap = (0..2)
                .all(|axis| a.max(axis) > b.min(axis) && a.min(axis) < b.max(axis));
            assert!(!overlap, "leaves {} and {} overlap", a.index(), b.index());
        }
    }
    // every probe resolves to exactly one bin that really contains it
    let mut rng = StdRng::seed_from_u64(13);
    for _ in 0..200 {
        let probe = [rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)];
        let leaf = tree.get_leaf(&probe).expect("probe inside the root box");
        assert!(leaf.in_bin(&probe));
    }
}

#[test]
fn leaf_indices_are_unique_and_bounded() {
    let (points, weights) = random_cloud(300, 23);
    let mut tree = unit_square_tree(&points, &weights, 15);
    tree.build().unwrap();

    let indices: Vec<usize> = tree.leaves().iter().map(|leaf| leaf.index()).collect();
    let unique: Vec<usize> = indices.iter().copied().unique().collect();
    assert_eq!(unique.len(), indices.len());
    assert!(tree.max_leaf_index() < 2 * indices.len());
}

#[test]
fn builds_are_deterministic() {
    let (points, weights) = random_cloud(250, 31);
    let mut first = unit_square_tree(&points, &weights, 10);
    let mut second = unit_square_tree(&points, &weights, 10);
    first.build().unwrap();
    second.build().unwrap();

    let shape = |tree: &BinTree<AX, 2>| {
        tree.leaves()
            .iter()
            .map(|leaf| (leaf.index(), leaf.bin_boundaries()))
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(&first), shape(&second));
    assert_eq!(first.boundary_segments(), second.boundary_segments());
}

#[test]
fn histogram_projection_conserves_weight() {
    let points = two_cluster_points();
    let weights = vec![1.0; points.len()];
    let mut tree = unit_square_tree(&points, &weights, 2);
    tree.build().unwrap();
    // attach the projection grid after the fact: cuts stay unconstrained
    tree.set_grid_constraint(Arc::new(
        Grid::uniform([0.0, 0.0], [1.0, 1.0], [10, 10]).unwrap(),
    ));

    let histogram = tree.fill_histogram().unwrap();
    assert_eq!(histogram.shape(), [10, 10]);
    assert_relative_eq!(histogram.total(), 8.0, max_relative = 1e-9);

    let widths = tree.fill_widths(None).unwrap();
    for axis in 0..2 {
        assert_eq!(widths[axis].shape(), [10, 10]);
        assert!(widths[axis].values().iter().all(|&w| w > 0.0));
    }
}
