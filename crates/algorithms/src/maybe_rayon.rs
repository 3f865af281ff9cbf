/// Row-parallel iteration that degrades to plain iterators.
///
/// With the `parallel` feature (default) this re-exports rayon's prelude.
/// Without it, `into_par_iter()` resolves to `into_iter()` so the same
/// `(0..rows).into_par_iter().flat_map(..).collect()` chains compile
/// against the standard `Iterator` adapters.
#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

#[cfg(not(feature = "parallel"))]
mod sequential {
    /// Sequential stand-in for `rayon::prelude::IntoParallelIterator`.
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
