//! Synthetic datasets and games with known values.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::prelude::*;

use crate::data::Dataset;
use crate::model::{ModelError, SupervisedModel};
use crate::utility::Utility;
use crate::value::{Status, ValuationResult};

/// Generate random dense features, uniform in `[min, max]`.
pub fn random_dense(rows: usize, cols: usize, seed: u64, min: f64, max: f64) -> Array2<f64> {
    assert!(max >= min);
    let mut rng = StdRng::seed_from_u64(seed);
    let width = max - min;
    Array2::from_shape_fn((rows, cols), |_| min + rng.gen::<f64>() * width)
}

/// Generate regression targets as a linear model of features plus uniform noise.
///
/// Returns `(targets, weights, bias)`.
pub fn regression_targets_linear(
    x: ArrayView2<'_, f64>,
    seed: u64,
    noise_amplitude: f64,
) -> (Array1<f64>, Array1<f64>, f64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let weights: Array1<f64> = (0..x.ncols()).map(|_| rng.gen::<f64>() * 2.0 - 1.0).collect();
    let bias: f64 = rng.gen::<f64>() * 0.5 - 0.25;

    let mut targets = x.dot(&weights) + bias;
    if noise_amplitude > 0.0 {
        targets.mapv_inplace(|y| y + (rng.gen::<f64>() * 2.0 - 1.0) * noise_amplitude);
    }
    (targets, weights, bias)
}

/// Deterministic train/valid split indices.
///
/// Returns `(train_idx, valid_idx)`.
pub fn split_indices(rows: usize, valid_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    assert!((0.0..1.0).contains(&valid_fraction));
    let mut idx: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    let valid_len = ((rows as f64) * valid_fraction).round() as usize;
    let valid_len = valid_len.min(rows);
    let (valid, train) = idx.split_at(valid_len);
    (train.to_vec(), valid.to_vec())
}

/// Linear regression dataset with `n_train` training and `n_test` test rows.
pub fn synthetic_regression(
    n_train: usize,
    n_test: usize,
    n_features: usize,
    noise_amplitude: f64,
    seed: u64,
) -> Dataset {
    let rows = n_train + n_test;
    let x = random_dense(rows, n_features, seed, -1.0, 1.0);
    let (y, _, _) = regression_targets_linear(x.view(), seed.wrapping_add(1), noise_amplitude);
    let (train, test) = split_indices(rows, n_test as f64 / rows as f64, seed);
    build(&x, &y, &train, &test)
}

/// Two classes on a line: class 0 around `-1`, class 1 around `+1`.
pub fn synthetic_classification(n_train: usize, n_test: usize, seed: u64) -> Dataset {
    let rows = n_train + n_test;
    let mut rng = StdRng::seed_from_u64(seed);
    let y: Array1<f64> = (0..rows).map(|i| (i % 2) as f64).collect();
    let x = Array2::from_shape_fn((rows, 1), |(i, _)| {
        2.0 * y[i] - 1.0 + rng.gen::<f64>() - 0.5
    });
    let (train, test) = split_indices(rows, n_test as f64 / rows as f64, seed);
    build(&x, &y, &train, &test)
}

fn build(x: &Array2<f64>, y: &Array1<f64>, train: &[usize], test: &[usize]) -> Dataset {
    let take = |rows: &[usize]| {
        let xs = x.select(ndarray::Axis(0), rows);
        let ys = y.select(ndarray::Axis(0), rows);
        (xs, ys)
    };
    let (x_train, y_train) = take(train);
    let (x_test, y_test) = take(test);
    Dataset::new(x_train, y_train, x_test, y_test).expect("synthetic shapes are consistent")
}

// =============================================================================
// Additive game
// =============================================================================

/// Model whose score is the sum of its first training feature, scaled.
///
/// With training points `[[0], [1], ..., [n-1]]` and scale `n(n-1)/2` the
/// resulting utility is additive, `u(S) = Σ_{i ∈ S} i / scale`, with
/// `u(N) = 1`. Every valuation method that satisfies efficiency and the
/// dummy axiom must return `v_i = i / scale`.
#[derive(Debug, Clone)]
pub struct SumModel {
    scale: f64,
    sum: Option<f64>,
}

impl SumModel {
    pub fn new(scale: f64) -> Self {
        Self { scale, sum: None }
    }
}

impl SupervisedModel for SumModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, _y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        self.sum = Some(x.column(0).sum());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let sum = self.sum.ok_or(ModelError::NotFitted)?;
        Ok(Array1::from_elem(x.nrows(), sum))
    }

    fn score(&self, _x: ArrayView2<'_, f64>, _y: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        let sum = self.sum.ok_or(ModelError::NotFitted)?;
        Ok(sum / self.scale)
    }

    fn name(&self) -> &str {
        "SumModel"
    }

    fn hash_params(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.scale.to_le_bytes());
    }
}

fn analytic_scale(n: usize) -> f64 {
    ((n * n.saturating_sub(1)) / 2).max(1) as f64
}

/// Additive utility over `n` points with known values, see [`SumModel`].
pub fn analytic_utility(n: usize) -> Utility<SumModel> {
    let x_train = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
    let data = Dataset::new(
        x_train,
        Array1::zeros(n),
        Array2::zeros((1, 1)),
        Array1::zeros(1),
    )
    .expect("analytic dataset shapes are consistent");
    Utility::builder()
        .model(SumModel::new(analytic_scale(n)))
        .data(data)
        .build()
}

/// Exact values of [`analytic_utility`]: `v_i = i / scale`.
pub fn analytic_values(n: usize) -> ValuationResult {
    let scale = analytic_scale(n);
    let values = (0..n).map(|i| i as f64 / scale).collect();
    let names = (0..n).map(|i| i.to_string()).collect();
    ValuationResult::from_values("analytic", values, names, Status::Converged)
        .expect("one name per value")
}
