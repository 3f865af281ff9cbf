//! Validity masks for bitemporal stack pairs

use crate::error::Result;
use crate::raster::{BandStack, RasterElement};

/// Per-pixel validity of a pre/post stack pair, in row-major pixel order.
///
/// A pixel is valid when neither image holds the no-data sentinel in
/// band 0 and every sample of both images is finite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    valid: Vec<bool>,
    valid_count: usize,
}

impl ValidityMask {
    /// Build the mask for a stack pair. Fails with `ShapeMismatch` when the
    /// stacks differ in band count or grid size.
    pub fn from_pair<T: RasterElement, U: RasterElement>(
        pre: &BandStack<T>,
        post: &BandStack<U>,
    ) -> Result<Self> {
        pre.ensure_same_shape(post)?;

        let n_bands = pre.n_bands();
        let valid: Vec<bool> = (0..pre.pixel_count())
            .map(|px| {
                if pre.sample(0, px).is_sentinel() || post.sample(0, px).is_sentinel() {
                    return false;
                }
                (0..n_bands).all(|b| {
                    pre.sample(b, px).is_finite_sample() && post.sample(b, px).is_finite_sample()
                })
            })
            .collect();
        let valid_count = valid.iter().filter(|&&v| v).count();

        Ok(Self { valid, valid_count })
    }

    /// Build a mask from explicit flags
    pub fn from_flags(valid: Vec<bool>) -> Self {
        let valid_count = valid.iter().filter(|&&v| v).count();
        Self { valid, valid_count }
    }

    /// Total number of pixels covered by the mask
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    /// Whether the mask covers no pixels at all
    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    /// Number of valid pixels
    pub fn valid_count(&self) -> usize {
        self.valid_count
    }

    /// Whether flattened pixel `index` is valid (false when out of range)
    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    /// Flattened positions of the valid pixels, ascending
    pub fn valid_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.valid
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| v.then_some(i))
    }

    /// Raw flags
    pub fn as_slice(&self) -> &[bool] {
        &self.valid
    }
}
