//! Spectral distance change detection
//!
//! Baseline detector: the magnitude of the change vector between the two
//! dates, without any radiometric normalization. Useful as a reference
//! against IR-MAD or when both dates are already calibrated to surface
//! reflectance.

use crate::maybe_rayon::*;
use madchange_core::{BandStack, Error, RasterElement, Result, ValidityMask};
use ndarray::Array2;

/// Per-pixel Euclidean distance between the pre and post band vectors.
///
/// `distance = sqrt(Σ_b (post_b - pre_b)²)`
///
/// Pixels are masked exactly as for IR-MAD (no-data sentinel in band 0
/// of either date, or a non-finite sample); masked pixels are zero.
///
/// # Arguments
/// * `pre` - Image stack at the earlier date
/// * `post` - Image stack at the later date
///
/// # Returns
/// Distance grid with the input's (rows, cols)
pub fn spectral_distance<T, U>(pre: &BandStack<T>, post: &BandStack<U>) -> Result<Array2<f64>>
where
    T: RasterElement,
    U: RasterElement,
{
    let mask = ValidityMask::from_pair(pre, post)?;
    let (bands, rows, cols) = pre.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0.0; cols];
            for col in 0..cols {
                let pixel = row * cols + col;
                if !mask.is_valid(pixel) {
                    continue;
                }
                let sum: f64 = (0..bands)
                    .map(|b| {
                        let d = post.sample(b, pixel).as_f64() - pre.sample(b, pixel).as_f64();
                        d * d
                    })
                    .sum();
                row_data[col] = sum.sqrt();
            }
            row_data
        })
        .collect();

    Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))
}
