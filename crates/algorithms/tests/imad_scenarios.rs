//! End-to-end IR-MAD scenarios on synthetic image pairs.
//!
//! The "pre" image is uniform noise per band (independent bands, values in
//! [100, 1000) so the no-data sentinel never occurs by accident). The
//! "post" image is the pre image plus small Gaussian noise, optionally with
//! a block of real change added.

use madchange_algorithms::imagery::{
    imad, no_change_probability, spectral_distance, Imad, ImadAlgorithm, ImadParams, Termination,
};
use madchange_core::{Algorithm, BandStack, Error};
use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

const BANDS: usize = 4;
const SIZE: usize = 50;

/// Rows/cols of the changed block in `changed_pair`
const BLOCK: std::ops::Range<usize> = 20..30;

fn noise_pair(seed: u64, bands: usize, rows: usize, cols: usize) -> (Array3<f64>, Array3<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 5.0).unwrap();
    let pre = Array3::from_shape_fn((bands, rows, cols), |_| rng.gen_range(100.0..1000.0));
    let post = pre.mapv(|v| v + noise.sample(&mut rng));
    (pre, post)
}

fn unchanged_pair(seed: u64) -> (BandStack<f64>, BandStack<f64>) {
    let (pre, post) = noise_pair(seed, BANDS, SIZE, SIZE);
    (BandStack::from_array(pre).unwrap(), BandStack::from_array(post).unwrap())
}

/// 10x10 block offset by a large constant in every post band
fn changed_pair(seed: u64) -> (BandStack<f64>, BandStack<f64>) {
    let (pre, mut post) = noise_pair(seed, BANDS, SIZE, SIZE);
    for b in 0..BANDS {
        for r in BLOCK {
            for c in BLOCK {
                post[(b, r, c)] += 2000.0;
            }
        }
    }
    (BandStack::from_array(pre).unwrap(), BandStack::from_array(post).unwrap())
}

fn in_block(r: usize, c: usize) -> bool {
    BLOCK.contains(&r) && BLOCK.contains(&c)
}

fn percentile(values: &mut [f64], q: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let idx = ((values.len() - 1) as f64 * q).round() as usize;
    values[idx]
}

// ---------------------------------------------------------------------------
// No-change pair
// ---------------------------------------------------------------------------

#[test]
fn unchanged_pair_correlates_fully() {
    let (pre, post) = unchanged_pair(1);
    let params = ImadParams::default();
    let result = imad(&pre, &post, params.clone()).unwrap();
    let model = &result.model;

    assert_eq!(model.termination(), &Termination::Converged);
    assert!(model.iterations() <= params.max_iterations);
    for &r in model.rho().iter() {
        assert!(r > 0.99 && r <= 1.0, "rho should approach 1, got {}", r);
    }

    // under no change chi² ~ chi²(B), mean B
    let mean_chi = result.chi_squared.mean().unwrap();
    assert!(mean_chi > 0.0 && mean_chi < 2.0 * BANDS as f64, "mean chi² = {}", mean_chi);

    // stable: last two iterations agree within min_delta
    let history = model.history();
    if history.len() >= 2 {
        let last = &history[history.len() - 1];
        let prev = &history[history.len() - 2];
        let delta: f64 = (last - prev).mapv(f64::abs).sum();
        assert!(delta <= params.min_delta);
        assert_eq!(delta, model.delta());
    }
}

#[test]
fn identical_pair_has_no_change() {
    let (pre, _) = noise_pair(13, BANDS, SIZE, SIZE);
    let pre = BandStack::from_array(pre).unwrap();
    let result = imad(&pre, &pre.clone(), ImadParams::default()).unwrap();
    let model = &result.model;

    assert_eq!(model.termination(), &Termination::Converged);
    for &r in model.rho().iter() {
        assert!((r - 1.0).abs() < 1e-9, "rho should be 1, got {}", r);
    }
    let mean_chi = result.chi_squared.mean().unwrap();
    assert!(mean_chi < 1e-6, "mean chi² = {}", mean_chi);
    assert!(result.mad.iter().all(|t| t.abs() < 1e-6));
}

#[test]
fn linear_rescaling_is_not_change() {
    // a pure gain/offset between dates is exactly what MAD is invariant to
    let (pre, _) = noise_pair(14, BANDS, SIZE, SIZE);
    let post = pre.mapv(|v| 1.3 * v + 7.0);
    let pre = BandStack::from_array(pre).unwrap();
    let post = BandStack::from_array(post).unwrap();
    let result = imad(&pre, &post, ImadParams::default()).unwrap();
    let model = &result.model;

    assert_eq!(model.termination(), &Termination::Converged);
    for &r in model.rho().iter() {
        assert!((r - 1.0).abs() < 1e-9, "rho should be 1, got {}", r);
    }
    let mean_chi = result.chi_squared.mean().unwrap();
    assert!(mean_chi < 1e-3, "mean chi² = {}", mean_chi);
    assert!(model.weights().iter().all(|&w| w > 0.99));
}

#[test]
fn output_shape_matches_input() {
    for (bands, rows, cols) in [(1, 9, 13), (3, 20, 7), (BANDS, SIZE, SIZE)] {
        let (pre, post) = noise_pair(7, bands, rows, cols);
        let pre = BandStack::from_array(pre).unwrap();
        let post = BandStack::from_array(post).unwrap();
        let result = imad(&pre, &post, ImadParams::default()).unwrap();
        assert_eq!(result.mad.dim(), (bands, rows, cols));
        assert_eq!(result.chi_squared.dim(), (rows, cols));
    }
}

// ---------------------------------------------------------------------------
// Changed block
// ---------------------------------------------------------------------------

#[test]
fn changed_block_ranks_in_upper_tail() {
    let (pre, post) = changed_pair(2);
    let result = imad(&pre, &post, ImadParams::default()).unwrap();
    let chi = &result.chi_squared;

    let mut all: Vec<f64> = chi.iter().copied().collect();
    let p95 = percentile(&mut all, 0.95);

    let mut block_sum = 0.0;
    let mut block_above = 0usize;
    let mut rest_sum = 0.0;
    for ((r, c), &v) in chi.indexed_iter() {
        if in_block(r, c) {
            block_sum += v;
            if v > p95 {
                block_above += 1;
            }
        } else {
            rest_sum += v;
        }
    }
    let block_n = BLOCK.len() * BLOCK.len();
    let block_mean = block_sum / block_n as f64;
    let rest_mean = rest_sum / (SIZE * SIZE - block_n) as f64;

    assert!(
        block_mean > 10.0 * rest_mean,
        "block mean chi² {} should dwarf background {}",
        block_mean,
        rest_mean
    );
    assert!(
        block_above as f64 >= 0.9 * block_n as f64,
        "only {}/{} block pixels above the 95th percentile",
        block_above,
        block_n
    );
}

#[test]
fn extreme_chi_squared_gets_lower_weight() {
    let (pre, post) = changed_pair(3);
    let model = Imad::default().fit(&pre, &post).unwrap();
    let result = model.transform(&pre, &post).unwrap();

    // weights follow the valid pixels in row-major order; all pixels are valid here
    let chi: Vec<f64> = result.chi_squared.iter().copied().collect();
    let weights = model.weights();
    assert_eq!(weights.len(), chi.len());

    let mut order: Vec<usize> = (0..chi.len()).collect();
    order.sort_by(|&i, &j| chi[i].total_cmp(&chi[j]));
    let median = order[order.len() / 2];
    let extreme = order[order.len() - 1];

    assert!(
        weights[extreme] < weights[median],
        "weight at chi² {} ({}) should be below weight at chi² {} ({})",
        chi[extreme],
        weights[extreme],
        chi[median],
        weights[median]
    );
    for &i in &order {
        let expected = no_change_probability(chi[i], BANDS).unwrap();
        assert!((weights[i] - expected).abs() < 1e-12);
    }
}

#[test]
fn spectral_distance_flags_block() {
    let (pre, post) = changed_pair(4);
    let dist = spectral_distance(&pre, &post).unwrap();
    assert!(dist[(25, 25)] > 3900.0);
    assert!(dist[(5, 5)] < 60.0);
}

// ---------------------------------------------------------------------------
// Masking
// ---------------------------------------------------------------------------

#[test]
fn nodata_pixels_are_zero_for_every_iteration_count() {
    let (mut pre, mut post) = noise_pair(5, BANDS, SIZE, SIZE);
    let mut rng = StdRng::seed_from_u64(55);
    let mut masked = Array2::from_elem((SIZE, SIZE), false);
    for r in 0..SIZE {
        for c in 0..SIZE {
            match rng.gen_range(0..20) {
                0 => pre[(0, r, c)] = 0.0,
                1 => post[(0, r, c)] = 0.0,
                _ => continue,
            }
            masked[(r, c)] = true;
        }
    }
    let pre = BandStack::from_array(pre).unwrap();
    let post = BandStack::from_array(post).unwrap();

    for max_iterations in [1, 2, 5, 25] {
        let params = ImadParams { max_iterations, ..Default::default() };
        let result = imad(&pre, &post, params).unwrap();
        for ((r, c), &is_masked) in masked.indexed_iter() {
            if is_masked {
                assert_eq!(result.chi_squared[(r, c)], 0.0);
                for b in 0..BANDS {
                    assert_eq!(result.mad[(b, r, c)], 0.0);
                }
            } else {
                assert!(result.chi_squared[(r, c)] > 0.0);
            }
        }
        let valid = masked.iter().filter(|&&m| !m).count();
        assert_eq!(result.model.weights().len(), valid);
    }
}

#[test]
fn all_nodata_has_no_result() {
    let pre: BandStack<u16> = BandStack::zeros(BANDS, SIZE, SIZE).unwrap();
    let post: BandStack<u16> = BandStack::zeros(BANDS, SIZE, SIZE).unwrap();
    let err = imad(&pre, &post, ImadParams::default()).unwrap_err();
    assert!(matches!(err, Error::NoConvergedIteration { .. }), "got {:?}", err);
}

// ---------------------------------------------------------------------------
// Composition, bounds, configuration
// ---------------------------------------------------------------------------

#[test]
fn fit_then_transform_equals_fit_transform() {
    let (pre, post) = changed_pair(6);
    let detector = Imad::new(ImadParams { max_iterations: 10, min_delta: 0.01 });

    let model = detector.fit(&pre, &post).unwrap();
    let separate = model.transform(&pre, &post).unwrap();
    let combined = detector.fit_transform(&pre, &post).unwrap();

    assert_eq!(separate.mad, combined.mad);
    assert_eq!(separate.chi_squared, combined.chi_squared);
    assert_eq!(separate.model, combined.model);
}

#[test]
fn single_iteration_ignores_min_delta() {
    let (pre, post) = changed_pair(8);
    for min_delta in [1e-9, 0.02, 1e9] {
        let params = ImadParams { max_iterations: 1, min_delta };
        let result = imad(&pre, &post, params).unwrap();
        assert_eq!(result.model.iterations(), 1);
        assert_eq!(result.model.history().len(), 1);
    }
}

#[test]
fn iteration_count_never_exceeds_limit() {
    let (pre, post) = changed_pair(9);
    for max_iterations in 1..=6 {
        let params = ImadParams { max_iterations, min_delta: 1e-12 };
        let model = Imad::new(params).fit(&pre, &post).unwrap();
        assert!(model.iterations() <= max_iterations);
        assert!(model.iterations() >= 1);
    }
}

#[test]
fn band_count_mismatch_fails_fast() {
    let (pre, _) = noise_pair(10, 4, 20, 20);
    let (_, post) = noise_pair(10, 3, 20, 20);
    let err = imad(
        &BandStack::from_array(pre).unwrap(),
        &BandStack::from_array(post).unwrap(),
        ImadParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { expected: (4, 20, 20), actual: (3, 20, 20) }));
}

#[test]
fn integer_stacks_match_float_stacks() {
    let (pre, post) = noise_pair(11, 3, 30, 30);
    let pre_u16 = BandStack::from_array(pre.mapv(|v| v.round() as u16)).unwrap();
    let post_u16 = BandStack::from_array(post.mapv(|v| v.round() as u16)).unwrap();

    let from_int = imad(&pre_u16, &post_u16, ImadParams::default()).unwrap();
    let from_float = imad(&pre_u16.to_f64(), &post_u16.to_f64(), ImadParams::default()).unwrap();
    assert_eq!(from_int.chi_squared, from_float.chi_squared);
    assert_eq!(from_int.mad, from_float.mad);
}

#[test]
fn algorithm_trait_runs_imad() {
    let (pre, post) = changed_pair(12);
    let params = ImadParams { max_iterations: 2, min_delta: 1e-9 };
    let algo = ImadAlgorithm;
    assert_eq!(algo.name(), "IR-MAD");

    let out = algo.execute((pre.clone(), post.clone()), params.clone()).unwrap();
    let direct = Imad::new(params).fit_transform(&pre, &post).unwrap();
    assert_eq!(out.model.iterations(), direct.model.iterations());
    assert_eq!(out.chi_squared, direct.chi_squared);
    assert_eq!(out.mad, direct.mad);

    let defaults = algo.execute_default((pre.clone(), post.clone())).unwrap();
    let direct = imad(&pre, &post, ImadParams::default()).unwrap();
    assert_eq!(defaults.chi_squared, direct.chi_squared);
}

// ---------------------------------------------------------------------------
// Independent invocations per tile
// ---------------------------------------------------------------------------

#[test]
fn parallel_tiles_match_sequential() {
    let tiles: Vec<(BandStack<f64>, BandStack<f64>)> = (0..8).map(|i| changed_pair(100 + i)).collect();
    let detector = Imad::default();

    let sequential: Vec<_> = tiles
        .iter()
        .map(|(pre, post)| detector.fit_transform(pre, post).unwrap())
        .collect();
    let parallel: Vec<_> = tiles
        .par_iter()
        .map(|(pre, post)| detector.fit_transform(pre, post).unwrap())
        .collect();

    for (s, p) in sequential.iter().zip(&parallel) {
        assert_eq!(s.mad, p.mad);
        assert_eq!(s.chi_squared, p.chi_squared);
        assert_eq!(s.model, p.model);
    }
}
