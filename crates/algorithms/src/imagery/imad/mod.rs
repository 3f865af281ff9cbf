//! IR-MAD: iteratively reweighted multivariate alteration detection
//!
//! Compares two co-registered multi-band images of the same scene taken at
//! different dates. Output per pixel: the MAD variates (one change signal
//! per band) and a chi-squared magnitude with as many degrees of freedom
//! as bands, suitable for thresholding or ranking change.
//!
//! Each call is self-contained and single-threaded; run one call per tile
//! when processing large scenes in parallel.

mod cca;
mod irmad;
mod moments;
mod params;

pub use cca::{canonical_correlation, CanonicalCorrelation};
pub use irmad::{
    imad, no_change_probability, Imad, ImadAlgorithm, ImadModel, ImadResult, Termination,
};
pub use params::ImadParams;
