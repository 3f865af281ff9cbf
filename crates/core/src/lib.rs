//! # madchange Core
//!
//! Core types and traits for the madchange bitemporal change-detection
//! library.
//!
//! This crate provides:
//! - `BandStack<T>`: co-registered multi-band image stack
//! - `ValidityMask`: no-data masking of a pre/post stack pair
//! - `RasterElement`: sample types accepted by band stacks
//! - Algorithm trait for a consistent API

pub mod error;
pub mod raster;

pub use error::{Error, Result};
pub use raster::{BandStack, RasterElement, ValidityMask};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{BandStack, RasterElement, ValidityMask};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in madchange.
///
/// Algorithms are pure functions that transform input data according to
/// parameters. Implementations hold no state between calls, so a single
/// instance can be shared by workers processing different tiles.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
