//! Multi-band image stack

use crate::error::{Error, Result};
use crate::raster::RasterElement;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

/// A co-registered stack of spectral bands.
///
/// `BandStack<T>` stores samples of type `T` indexed by
/// `(band, row, col)`. Every band shares the same grid, so a pixel is
/// addressed by `(row, col)` and owns one sample per band.
///
/// # Example
///
/// ```ignore
/// use madchange_core::BandStack;
///
/// // Four 100x100 bands
/// let stack: BandStack<u16> = BandStack::zeros(4, 100, 100)?;
/// assert_eq!(stack.shape(), (4, 100, 100));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BandStack<T: RasterElement = f64> {
    /// Samples in (band, row, col) order
    data: Array3<T>,
}

impl<T: RasterElement> BandStack<T> {
    /// Create a stack filled with zeros (every pixel is no-data)
    pub fn zeros(bands: usize, rows: usize, cols: usize) -> Result<Self> {
        if bands == 0 {
            return Err(Error::EmptyStack);
        }
        Ok(Self {
            data: Array3::zeros((bands, rows, cols)),
        })
    }

    /// Create a stack from an ndarray shaped (bands, rows, cols)
    pub fn from_array(data: Array3<T>) -> Result<Self> {
        if data.len_of(Axis(0)) == 0 {
            return Err(Error::EmptyStack);
        }
        Ok(Self { data })
    }

    /// Create a stack from a flat row-major buffer
    pub fn from_vec(data: Vec<T>, bands: usize, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != bands * rows * cols {
            return Err(Error::InvalidDimensions { bands, rows, cols });
        }
        let array = Array3::from_shape_vec((bands, rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Self::from_array(array)
    }

    /// Stack individual band grids. All bands must share one shape.
    pub fn from_bands(bands: &[Array2<T>]) -> Result<Self> {
        let first = bands.first().ok_or(Error::EmptyStack)?;
        let (rows, cols) = first.dim();

        for band in bands.iter().skip(1) {
            if band.dim() != (rows, cols) {
                let (ar, ac) = band.dim();
                return Err(Error::ShapeMismatch {
                    expected: (bands.len(), rows, cols),
                    actual: (bands.len(), ar, ac),
                });
            }
        }

        let views: Vec<ArrayView2<'_, T>> = bands.iter().map(|b| b.view()).collect();
        let data = ndarray::stack(Axis(0), &views).map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self { data })
    }

    // Dimensions

    /// Number of bands
    pub fn n_bands(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Dimensions as (bands, rows, cols)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of pixels per band
    pub fn pixel_count(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Fail with `ShapeMismatch` unless `other` has exactly this shape
    pub fn ensure_same_shape<U: RasterElement>(&self, other: &BandStack<U>) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    // Data access

    /// Sample at (band, row, col) as f64, or `None` when out of bounds
    pub fn get(&self, band: usize, row: usize, col: usize) -> Option<f64> {
        self.data.get((band, row, col)).map(|v| v.as_f64())
    }

    /// Sample of `band` at flattened row-major pixel position `pixel`.
    ///
    /// # Panics
    /// Panics if `band >= n_bands()` or `pixel >= pixel_count()`.
    pub fn sample(&self, band: usize, pixel: usize) -> T {
        let cols = self.cols();
        self.data[(band, pixel / cols, pixel % cols)]
    }

    /// View of a single band
    pub fn band(&self, band: usize) -> Option<ArrayView2<'_, T>> {
        if band >= self.n_bands() {
            return None;
        }
        Some(self.data.index_axis(Axis(0), band))
    }

    /// View of the whole stack
    pub fn view(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// Mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array3<T> {
        &mut self.data
    }

    /// Consume the stack and return the underlying array
    pub fn into_array(self) -> Array3<T> {
        self.data
    }

    /// Convert every sample to f64
    pub fn to_f64(&self) -> BandStack<f64> {
        BandStack {
            data: self.data.mapv(|v| v.as_f64()),
        }
    }
}
