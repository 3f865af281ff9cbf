//! Iteratively reweighted MAD
//!
//! Runs canonical correlation analysis on the valid pixels of an image
//! pair, forms MAD variates (differences of paired canonical variates),
//! and reweights every pixel by its probability of being unchanged under
//! a chi-squared null. Repeating this concentrates the statistics on
//! invariant pixels, which sharpens the separation of real change.
//!
//! A failing iteration (singular covariance block, eigensolver failure,
//! non-finite convergence delta) ends the loop. The last successful
//! iteration is kept as an explicit `Option` and becomes the result; when
//! there is none the call fails with [`Error::NoConvergedIteration`].

use madchange_core::{Algorithm, BandStack, Error, RasterElement, Result, ValidityMask};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, info, warn};

use super::cca::{canonical_correlation, CanonicalCorrelation};
use super::moments::{gather_observations, WeightedMoments};
use super::params::ImadParams;

/// Lower bound for the no-change variance `2(1 - rho)` of a MAD variate.
/// Perfectly correlated band pairs would otherwise divide zero by zero.
///
/// The floor is absolute: a variate whose `rho` is 1 contributes
/// `T² / 1e-12`, so any residual above round-off counts as strong change.
/// Canonical pairs are matched column by column, which keeps `T` at
/// round-off for a pure gain/offset between dates.
const MIN_MAD_VARIANCE: f64 = 1e-12;

/// Why the iteration stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The summed change of the canonical correlations fell to `min_delta`
    Converged,
    /// `max_iterations` iterations ran
    MaxIterations,
    /// Iteration `iteration` (0-based) failed; the previous one is reported
    Aborted { iteration: usize, reason: String },
}

/// IR-MAD change detector
#[derive(Debug, Clone, Default)]
pub struct Imad {
    params: ImadParams,
}

/// Canonical state of the last successful iteration plus its history.
///
/// Applying the model with [`ImadModel::transform`] recomputes the MAD
/// variates and chi-squared statistic from the stored means and
/// transforms.
#[derive(Debug, Clone, PartialEq)]
pub struct ImadModel {
    bands: usize,
    mean: Array1<f64>,
    canonical: CanonicalCorrelation,
    history: Vec<Array1<f64>>,
    weights: Array1<f64>,
    iterations: usize,
    delta: f64,
    termination: Termination,
}

/// Output of an IR-MAD run
#[derive(Debug, Clone)]
pub struct ImadResult {
    /// MAD variates, `(bands, rows, cols)`, zero at invalid pixels
    pub mad: Array3<f64>,
    /// Chi-squared change magnitude, `(rows, cols)`, zero at invalid pixels
    pub chi_squared: Array2<f64>,
    /// The model that produced the images
    pub model: ImadModel,
}

/// Everything one successful iteration produces
#[derive(Debug, Clone)]
struct Iteration {
    mean: Array1<f64>,
    canonical: CanonicalCorrelation,
    delta: f64,
    chi_squared: Array1<f64>,
    weights: Array1<f64>,
}

impl Imad {
    /// Create a detector with the given parameters
    pub fn new(params: ImadParams) -> Self {
        Self { params }
    }

    /// Parameters in use
    pub fn params(&self) -> &ImadParams {
        &self.params
    }

    /// Iterate to convergence on an image pair and return the fitted model.
    ///
    /// # Errors
    /// - `ShapeMismatch` when the stacks differ in band count or grid size
    /// - `InvalidParameter` for a bad configuration
    /// - `NoConvergedIteration` when the first iteration already fails,
    ///   including the case of an image pair without valid pixels
    pub fn fit<T, U>(&self, pre: &BandStack<T>, post: &BandStack<U>) -> Result<ImadModel>
    where
        T: RasterElement,
        U: RasterElement,
    {
        self.params.validate()?;
        let mask = ValidityMask::from_pair(pre, post)?;
        let bands = pre.n_bands();
        let observations = gather_observations(pre, post, &mask);
        let chi2 = chi_squared_distribution(bands)?;

        info!(
            bands,
            valid_pixels = mask.valid_count(),
            total_pixels = mask.len(),
            max_iterations = self.params.max_iterations,
            "Starting IR-MAD iterations"
        );

        let outcome = drive(&self.params, bands, mask.valid_count(), |weights, rho_prev| {
            run_iteration(&observations.view(), bands, weights, rho_prev, &chi2)
        })?;
        let step = outcome.last;

        info!(
            iterations = outcome.history.len(),
            delta = step.delta,
            mean_chi_squared = step.chi_squared.mean().unwrap_or(0.0),
            termination = ?outcome.termination,
            "IR-MAD finished"
        );

        Ok(ImadModel {
            bands,
            mean: step.mean,
            canonical: step.canonical,
            iterations: outcome.history.len(),
            history: outcome.history,
            weights: step.weights,
            delta: step.delta,
            termination: outcome.termination,
        })
    }

    /// Fit on an image pair, then transform the same pair.
    ///
    /// Exactly `self.fit(pre, post)?.transform(pre, post)`.
    pub fn fit_transform<T, U>(&self, pre: &BandStack<T>, post: &BandStack<U>) -> Result<ImadResult>
    where
        T: RasterElement,
        U: RasterElement,
    {
        self.fit(pre, post)?.transform(pre, post)
    }
}

/// IR-MAD behind the [`Algorithm`] trait. Parameters arrive with each
/// call; use [`Imad`] to hold a configuration between calls.
#[derive(Debug, Clone, Default)]
pub struct ImadAlgorithm;

impl Algorithm for ImadAlgorithm {
    type Input = (BandStack<f64>, BandStack<f64>);
    type Output = ImadResult;
    type Params = ImadParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "IR-MAD"
    }

    fn description(&self) -> &'static str {
        "Iteratively reweighted multivariate alteration detection between two co-registered image dates"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (pre, post) = input;
        imad(&pre, &post, params)
    }
}

impl ImadModel {
    /// Number of bands the model was fitted on
    pub fn n_bands(&self) -> usize {
        self.bands
    }

    /// Canonical correlations of the reported iteration, ascending
    pub fn rho(&self) -> &Array1<f64> {
        &self.canonical.rho
    }

    /// Pre-image canonical transform (`B x B`)
    pub fn a(&self) -> &Array2<f64> {
        &self.canonical.a
    }

    /// Post-image canonical transform (`B x B`)
    pub fn b(&self) -> &Array2<f64> {
        &self.canonical.b
    }

    /// Weighted band means, pre bands first (length `2B`)
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Canonical correlations of every successful iteration, in order
    pub fn history(&self) -> &[Array1<f64>] {
        &self.history
    }

    /// No-change probabilities of the valid pixels after the reported
    /// iteration, in row-major pixel order
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Number of successful iterations, never above `max_iterations`
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Convergence delta of the reported iteration
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Why iterating stopped
    pub fn termination(&self) -> &Termination {
        &self.termination
    }

    /// Apply the fitted transforms to an image pair.
    ///
    /// The pair may have any grid size but must have the model's band
    /// count, and pre and post must match each other.
    pub fn transform<T, U>(&self, pre: &BandStack<T>, post: &BandStack<U>) -> Result<ImadResult>
    where
        T: RasterElement,
        U: RasterElement,
    {
        let mask = ValidityMask::from_pair(pre, post)?;
        let (bands, rows, cols) = pre.shape();
        if bands != self.bands {
            return Err(Error::ShapeMismatch {
                expected: (self.bands, rows, cols),
                actual: pre.shape(),
            });
        }

        let observations = gather_observations(pre, post, &mask);
        let mad = mad_variates(&observations.view(), &self.mean, &self.canonical);
        let chi = chi_squared(&mad, &self.canonical.rho);

        let mut mad_grid = Array3::<f64>::zeros((bands, rows, cols));
        let mut chi_grid = Array2::<f64>::zeros((rows, cols));
        for (j, pixel) in mask.valid_indices().enumerate() {
            let (row, col) = (pixel / cols, pixel % cols);
            chi_grid[(row, col)] = chi[j];
            for k in 0..bands {
                mad_grid[(k, row, col)] = mad[(k, j)];
            }
        }

        Ok(ImadResult {
            mad: mad_grid,
            chi_squared: chi_grid,
            model: self.clone(),
        })
    }
}

/// Run IR-MAD on an image pair (fit, then transform the same pair)
///
/// # Arguments
/// * `pre` - Image stack at the earlier date
/// * `post` - Image stack at the later date, same shape as `pre`
/// * `params` - Iteration parameters
///
/// # Returns
/// MAD variates and chi-squared magnitude on the input grid
pub fn imad<T, U>(pre: &BandStack<T>, post: &BandStack<U>, params: ImadParams) -> Result<ImadResult>
where
    T: RasterElement,
    U: RasterElement,
{
    Imad::new(params).fit_transform(pre, post)
}

/// Probability that a pixel with the given chi-squared statistic is
/// unchanged: `1 - F(chi_squared)` for a chi-squared distribution with
/// `degrees_of_freedom` (the band count).
pub fn no_change_probability(chi_squared: f64, degrees_of_freedom: usize) -> Result<f64> {
    let dist = chi_squared_distribution(degrees_of_freedom)?;
    Ok(1.0 - dist.cdf(chi_squared))
}

fn chi_squared_distribution(degrees_of_freedom: usize) -> Result<ChiSquared> {
    ChiSquared::new(degrees_of_freedom as f64).map_err(|e| Error::InvalidParameter {
        name: "degrees_of_freedom",
        value: degrees_of_freedom.to_string(),
        reason: e.to_string(),
    })
}

/// Result of the reweighting loop
#[derive(Debug)]
struct Outcome {
    /// Last successful iteration
    last: Iteration,
    /// `rho` of every successful iteration
    history: Vec<Array1<f64>>,
    termination: Termination,
}

/// Reweighting loop. `step` runs one iteration given the current weights
/// and the previous canonical correlations.
///
/// Recoverable failures end the loop and the last successful iteration is
/// returned; if the first iteration fails there is nothing to return and
/// the failure is wrapped in `NoConvergedIteration`. Other errors
/// propagate unchanged.
fn drive<F>(params: &ImadParams, bands: usize, valid_pixels: usize, mut step: F) -> Result<Outcome>
where
    F: FnMut(&Array1<f64>, &Array1<f64>) -> Result<Iteration>,
{
    let mut weights = Array1::<f64>::ones(valid_pixels);
    let mut rho_prev = Array1::<f64>::zeros(bands);
    let mut history: Vec<Array1<f64>> = Vec::new();
    let mut last_good: Option<Iteration> = None;

    let (termination, failure) = loop {
        let iteration = history.len();
        if iteration >= params.max_iterations {
            break (Termination::MaxIterations, None);
        }

        match step(&weights, &rho_prev) {
            Ok(it) => {
                debug!(iteration, delta = it.delta, rho = ?it.canonical.rho, "IR-MAD iteration finished");
                history.push(it.canonical.rho.clone());
                weights = it.weights.clone();
                rho_prev = it.canonical.rho.clone();
                let converged = it.delta <= params.min_delta;
                last_good = Some(it);
                if converged {
                    break (Termination::Converged, None);
                }
            }
            Err(e) if e.is_recoverable() => {
                warn!(iteration, error = %e, "IR-MAD iteration failed, keeping the previous iteration");
                let reason = e.to_string();
                break (Termination::Aborted { iteration, reason }, Some(e));
            }
            Err(e) => return Err(e),
        }
    };

    match (last_good, failure) {
        (Some(last), _) => Ok(Outcome { last, history, termination }),
        (None, Some(cause)) => Err(Error::NoConvergedIteration {
            cause: Box::new(cause),
        }),
        (None, None) => Err(Error::Other("IR-MAD stopped before its first iteration".into())),
    }
}

/// One pass: weighted moments, canonical correlation, variates, new weights
fn run_iteration(
    observations: &ArrayView2<'_, f64>,
    bands: usize,
    weights: &Array1<f64>,
    rho_prev: &Array1<f64>,
    chi2: &ChiSquared,
) -> Result<Iteration> {
    let moments = WeightedMoments::compute(observations, weights)?;
    let blocks = moments.blocks(bands);
    let canonical = canonical_correlation(&blocks.s11, &blocks.s12, &blocks.s21, &blocks.s22)?;

    let delta: f64 = (&canonical.rho - rho_prev).mapv(f64::abs).sum();
    if !delta.is_finite() {
        return Err(Error::NumericDivergence { delta });
    }

    let mad = mad_variates(observations, &moments.mean, &canonical);
    let chi_squared = chi_squared(&mad, &canonical.rho);
    let weights = chi_squared.mapv(|c| 1.0 - chi2.cdf(c));

    Ok(Iteration {
        mean: moments.mean,
        canonical,
        delta,
        chi_squared,
        weights,
    })
}

/// `T = aᵗ(X - mean_pre) - bᵗ(Y - mean_post)`, `B x n_valid`
fn mad_variates(
    observations: &ArrayView2<'_, f64>,
    mean: &Array1<f64>,
    canonical: &CanonicalCorrelation,
) -> Array2<f64> {
    let bands = canonical.a.nrows();
    let pre = observations.slice(s![..bands, ..]);
    let post = observations.slice(s![bands.., ..]);
    let mean_pre = mean.slice(s![..bands]).insert_axis(Axis(1));
    let mean_post = mean.slice(s![bands..]).insert_axis(Axis(1));

    let u = canonical.a.t().dot(&(&pre - &mean_pre));
    let v = canonical.b.t().dot(&(&post - &mean_post));
    u - v
}

/// Per-pixel `Σ_k T_k² / (2(1 - rho_k))`
fn chi_squared(mad: &Array2<f64>, rho: &Array1<f64>) -> Array1<f64> {
    let variance = rho.mapv(|r| (2.0 * (1.0 - r)).max(MIN_MAD_VARIANCE));
    let normalized = mad.mapv(|t| t * t) / &variance.insert_axis(Axis(1));
    normalized.sum_axis(Axis(0))
}
