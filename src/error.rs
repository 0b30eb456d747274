//! Error types for the kdbin library.

use thiserror::Error;

/// Main error type for binning operations.
///
/// These are violated preconditions: constructing degenerate geometry,
/// splitting where no split is defined, or projecting without a target
/// binning. Data-driven situations (too few effective entries, vetoed or
/// gradient-free axes) are not errors; they simply end the recursion.
#[derive(Error, Debug)]
pub enum Error {
    /// Box construction with `min >= max` on some axis
    #[error("zero-width bin on axis {axis}: [{low}, {high}]")]
    ZeroWidthBin {
        /// Axis with the degenerate extent
        axis: usize,
        /// Lower boundary as given
        low: f64,
        /// Upper boundary as given
        high: f64,
    },

    /// Sample and weight slices of different lengths
    #[error("{entries} entries but {weights} weights")]
    LengthMismatch {
        /// Number of sample points
        entries: usize,
        /// Number of weights
        weights: usize,
    },

    /// Grid axis edges missing or not strictly increasing
    #[error("grid axis needs at least two strictly increasing edges")]
    BadGridAxis,

    /// Split requested on a node that already has children
    #[error("only terminal nodes can be split")]
    SplitOnInternalNode,

    /// Cut value outside the open interval of the bin being split
    #[error("cut {cut} outside bin boundaries ({low}, {high}) on axis {axis}")]
    CutOutsideBin {
        /// Axis of the attempted cut
        axis: usize,
        /// The rejected cut value
        cut: f64,
        /// Lower bin boundary
        low: f64,
        /// Upper bin boundary
        high: f64,
    },

    /// `build` called on a tree whose root is no longer terminal
    #[error("the tree was already built: the root is not a terminal node")]
    AlreadyBuilt,

    /// Projection requested but no reference grid is known
    #[error("no grid constraint defined: the target binning is unknown")]
    MissingGrid,

    /// Projection onto a grid is only defined up to three dimensions
    #[error("cannot project {dims} dimensions onto a grid (3 maximum)")]
    TooManyDimensions {
        /// Dimensionality of the tree
        dims: usize,
    },
}

/// Result type alias for binning operations.
pub type Result<T> = std::result::Result<T, Error>;
