//! # madchange Algorithms
//!
//! Bitemporal change detection for multi-band rasters.
//!
//! ## Available Algorithms
//!
//! - **imagery::imad**: IR-MAD transform with chi-squared change magnitude
//! - **imagery::spectral_distance**: Euclidean distance baseline

pub mod imagery;
mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        imad, no_change_probability, spectral_distance, Imad, ImadAlgorithm, ImadModel,
        ImadParams, ImadResult, Termination,
    };
    pub use madchange_core::prelude::*;
}
