//! Sample element trait for band stacks

use num_traits::{NumCast, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored as band samples.
///
/// Scenes arrive either as integer digital numbers (e.g. 16-bit surface
/// reflectance) or as floats; the statistics always run in `f64`.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Convert to f64. Values that cannot be represented become NaN.
    fn as_f64(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(f64::NAN)
    }

    /// Check if this value is the no-data sentinel (zero)
    fn is_sentinel(&self) -> bool {
        self.is_zero()
    }

    /// Whether the sample can take part in statistics
    fn is_finite_sample(&self) -> bool;
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_finite_sample(&self) -> bool {
                true
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn is_finite_sample(&self) -> bool {
                self.is_finite()
            }
        }
    };
}

impl_raster_element_int!(i8);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(i64);
impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);
impl_raster_element_int!(u64);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);
