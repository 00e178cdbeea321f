//! Least core values of small cooperative games.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use datavalue::model::{LinearRegression, ModelError, SupervisedModel};
use datavalue::testing::data::synthetic_regression;
use datavalue::value::least_core::LEAST_CORE_VALUE;
use datavalue::value::{compute_least_core_values, LeastCoreMode, LeastCoreParams, Status};
use datavalue::{Dataset, Utility, ValuationError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Scores 1 when trained on a strict majority of `n` points, 0 otherwise.
#[derive(Debug, Clone)]
struct MajorityModel {
    n: usize,
    rows: Option<usize>,
}

impl SupervisedModel for MajorityModel {
    fn fit(&mut self, x: ArrayView2<'_, f64>, _y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        self.rows = Some(x.nrows());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        Ok(Array1::zeros(x.nrows()))
    }

    fn score(&self, _x: ArrayView2<'_, f64>, _y: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        let rows = self.rows.ok_or(ModelError::NotFitted)?;
        Ok(if 2 * rows > self.n { 1.0 } else { 0.0 })
    }

    fn name(&self) -> &str {
        "MajorityModel"
    }
}

fn majority_utility(n: usize) -> Utility<MajorityModel> {
    let data = Dataset::new(
        Array2::zeros((n, 1)),
        Array1::zeros(n),
        Array2::zeros((1, 1)),
        Array1::zeros(1),
    )
    .unwrap();
    Utility::builder()
        .model(MajorityModel { n, rows: None })
        .data(data)
        .build()
}

#[test]
fn test_exact_least_core_of_majority_game() {
    let u = majority_utility(3);
    let values = compute_least_core_values(&u, LeastCoreMode::Exact, &LeastCoreParams::default()).unwrap();

    assert_eq!(values.status(), Status::Converged);
    for (_, v) in values.values_by_index() {
        assert_abs_diff_eq!(v, 1.0 / 3.0, epsilon = 1e-8);
    }
    assert_abs_diff_eq!(values.extra(LEAST_CORE_VALUE).unwrap(), 1.0 / 3.0, epsilon = 1e-8);
}

#[test]
fn test_exact_least_core_of_additive_game_is_its_core() {
    let u = analytic_utility(5);
    let values = compute_least_core_values(&u, LeastCoreMode::Exact, &LeastCoreParams::default()).unwrap();

    check_values(&values, &analytic_values(5), 1e-8, 1e-8);
    assert_abs_diff_eq!(values.extra(LEAST_CORE_VALUE).unwrap(), 0.0, epsilon = 1e-8);
}

#[test]
fn test_montecarlo_least_core_is_efficient() {
    let data = synthetic_regression(6, 20, 2, 0.2, 9);
    let u = Utility::builder()
        .model(LinearRegression::new())
        .data(data)
        .build();
    let params = LeastCoreParams {
        n_iterations: Some(40),
        n_jobs: 2,
        seed: Some(5),
        ..LeastCoreParams::default()
    };
    let values = compute_least_core_values(&u, LeastCoreMode::MonteCarlo, &params).unwrap();

    assert_eq!(values.len(), 6);
    check_total_value(&u, &values, 1e-6);
    assert!(values.extra(LEAST_CORE_VALUE).is_some());
}

#[test]
fn test_montecarlo_requires_iterations() {
    let u = analytic_utility(3);
    let err = compute_least_core_values(&u, LeastCoreMode::MonteCarlo, &LeastCoreParams::default())
        .unwrap_err();
    assert!(matches!(err, ValuationError::InvalidArgument(_)));
}

#[test]
fn test_exact_refuses_large_datasets() {
    let u = analytic_utility(13);
    let err = compute_least_core_values(&u, LeastCoreMode::Exact, &LeastCoreParams::default())
        .unwrap_err();
    assert!(matches!(err, ValuationError::TooManyIndices { n: 13, max: 12, .. }));
}
