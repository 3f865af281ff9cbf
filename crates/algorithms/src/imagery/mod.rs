//! Imagery change-detection algorithms
//!
//! Algorithms comparing two co-registered band stacks of the same scene:
//! - IR-MAD: iteratively reweighted multivariate alteration detection
//! - Spectral distance: per-pixel Euclidean distance between dates

mod change_detection;
pub mod imad;

pub use change_detection::spectral_distance;
pub use imad::{
    canonical_correlation, imad, no_change_probability, CanonicalCorrelation, Imad,
    ImadAlgorithm, ImadModel, ImadParams, ImadResult, Termination,
};
