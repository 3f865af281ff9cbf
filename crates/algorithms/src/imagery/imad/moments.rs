//! Observation matrix and weighted first/second moments

use madchange_core::{BandStack, Error, RasterElement, Result, ValidityMask};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

/// Gather the valid pixels of a stack pair into a `2B x n_valid` matrix.
///
/// Rows `0..B` hold the pre bands, rows `B..2B` the post bands; columns
/// follow the row-major order of the valid pixels.
pub(crate) fn gather_observations<T: RasterElement, U: RasterElement>(
    pre: &BandStack<T>,
    post: &BandStack<U>,
    mask: &ValidityMask,
) -> Array2<f64> {
    let bands = pre.n_bands();
    let pixels: Vec<usize> = mask.valid_indices().collect();

    Array2::from_shape_fn((2 * bands, pixels.len()), |(k, j)| {
        if k < bands {
            pre.sample(k, pixels[j]).as_f64()
        } else {
            post.sample(k - bands, pixels[j]).as_f64()
        }
    })
}

/// Weighted mean vector and covariance matrix of an observation matrix
#[derive(Debug, Clone)]
pub(crate) struct WeightedMoments {
    /// Length `2B`
    pub mean: Array1<f64>,
    /// `2B x 2B`, symmetric
    pub covariance: Array2<f64>,
}

/// The four `B x B` blocks of a partitioned `2B x 2B` covariance
#[derive(Debug, Clone)]
pub(crate) struct CovarianceBlocks {
    pub s11: Array2<f64>,
    pub s12: Array2<f64>,
    pub s21: Array2<f64>,
    pub s22: Array2<f64>,
}

impl WeightedMoments {
    /// Weighted moments with weights normalized by their sum.
    ///
    /// `cov = (X - m) diag(w) (X - m)ᵗ / Σw`
    pub fn compute(observations: &ArrayView2<'_, f64>, weights: &Array1<f64>) -> Result<Self> {
        let weight_sum = weights.sum();
        if !(weight_sum.is_finite() && weight_sum > 0.0) {
            return Err(Error::LinearAlgebra(format!(
                "weight sum over {} valid pixels is {}",
                weights.len(),
                weight_sum
            )));
        }

        let mean = observations.dot(weights) / weight_sum;
        let centered = observations - &mean.view().insert_axis(Axis(1));
        let scaled = centered * &weights.mapv(f64::sqrt);
        let raw = scaled.dot(&scaled.t()) / weight_sum;
        // blocked matrix products are not bitwise symmetric
        let covariance = (&raw + &raw.t()) * 0.5;

        Ok(Self { mean, covariance })
    }

    /// Split the covariance into pre/pre, pre/post, post/pre, post/post blocks
    pub fn blocks(&self, bands: usize) -> CovarianceBlocks {
        let c = &self.covariance;
        CovarianceBlocks {
            s11: c.slice(s![..bands, ..bands]).to_owned(),
            s12: c.slice(s![..bands, bands..]).to_owned(),
            s21: c.slice(s![bands.., ..bands]).to_owned(),
            s22: c.slice(s![bands.., bands..]).to_owned(),
        }
    }
}
