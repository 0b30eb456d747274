#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

//! # kdbin
//!
//! Adaptive, weighted k-d binning: recursive axis-aligned partitioning
//! of an N-dimensional weighted point cloud into bins that each keep a
//! statistically sufficient number of effective entries, with the cuts
//! tracking the sample-density gradient.
//!
//! A [`BinTree`] is created over a bounded box with all samples up
//! front. [`build`](BinTree::build) repeatedly picks the terminal bin
//! and axis with the steepest inter-quantile density spread, cuts at
//! the median, and recurses until no bin keeps enough effective
//! entries (Kish's `(Σw)²/Σw²`). Cuts can be snapped to a reference
//! [`Grid`], an anti-elongation rule keeps bins from degenerating into
//! slivers, and a final pass subdivides bins hugging the outer
//! boundary. The finished partition answers point lookups and projects
//! onto the grid as per-cell totals ([`BinTree::fill_histogram`]) or
//! per-axis local bin-width fields ([`BinTree::fill_widths`]).
//!
//! ## Usage
//!
//! ```rust
//! use kdbin::BinTree;
//!
//! // two clusters of unit-weight samples inside the unit square
//! let points = vec![
//!     [0.18, 0.5], [0.19, 0.5], [0.21, 0.5], [0.22, 0.5],
//!     [0.78, 0.5], [0.79, 0.5], [0.81, 0.5], [0.82, 0.5],
//! ];
//! let weights = vec![1.0; points.len()];
//!
//! let mut tree = BinTree::new([0.0, 0.0], [1.0, 1.0], &points, &weights)?;
//! tree.set_min_leaf_entries(2);
//! tree.build()?;
//!
//! assert_eq!(tree.n_entries(), 8);
//! assert!(tree.n_leaves() >= 2);
//!
//! // each cluster ends up in its own bin
//! let leaf = tree.get_leaf(&[0.2, 0.5]).expect("inside the root box");
//! assert_eq!(leaf.n_entries(), 4);
//! # Ok::<(), kdbin::Error>(())
//! ```

pub mod entry_list;
pub mod error;
pub mod grid;
pub mod tree;

pub use entry_list::EntryList;
pub use error::{Error, Result};
pub use grid::{Grid, GridAxis, GridField};
pub use tree::{Axis, BinLeaf, BinTree};
