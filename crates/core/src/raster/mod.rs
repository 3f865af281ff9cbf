//! Band stack data structures and masking

mod element;
mod mask;
mod stack;

pub use element::RasterElement;
pub use mask::ValidityMask;
pub use stack::BandStack;
