//! Testing utilities for datavalue.
//!
//! Assertion helpers and small games with known values, usable from both
//! unit tests and integration tests.
//!
//! ```
//! use datavalue::testing::{check_total_value, data::analytic_utility};
//! use datavalue::value::naive_loo;
//! use datavalue::progress::Verbosity;
//!
//! let u = analytic_utility(4);
//! let values = naive_loo(&u, 1, Verbosity::Silent).unwrap();
//! check_total_value(&u, &values, 1e-8);
//! ```

pub mod data;

use crate::model::SupervisedModel;
use crate::numeric::spearman;
use crate::utility::Utility;
use crate::value::ValuationResult;

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for comparing exact values.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Default relative tolerance for Monte Carlo estimates.
pub const DEFAULT_RTOL: f64 = 0.1;

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two f64 values are approximately equal.
///
/// ```
/// # use datavalue::assert_approx_eq;
/// assert_approx_eq!(1.0, 1.0001, 0.001);
/// ```
///
/// # Panics
///
/// Panics if the absolute difference exceeds tolerance.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val: f64 = $left;
        let right_val: f64 = $right;
        let tol: f64 = $tolerance;
        let diff = (left_val - right_val).abs();
        if !(diff <= tol) {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

// =============================================================================
// Valuation Assertions
// =============================================================================

/// Assert that the values add up to the utility of the full dataset.
///
/// # Panics
///
/// Panics if the sum differs from `u(N)` by more than `atol`.
pub fn check_total_value<M: SupervisedModel>(u: &Utility<M>, values: &ValuationResult, atol: f64) {
    let total = u.total().unwrap_or(f64::NAN);
    let sum: f64 = values.values().iter().sum();
    assert!(
        (sum - total).abs() <= atol,
        "{}: values sum to {sum}, expected u(N) = {total} (atol={atol})",
        values.algorithm()
    );
}

/// Assert that estimated values match expected ones, by data index.
///
/// Each value passes if it is within `atol + rtol * |expected|`.
///
/// # Panics
///
/// Panics on a length mismatch or if any value is outside the tolerance.
pub fn check_values(values: &ValuationResult, expected: &ValuationResult, rtol: f64, atol: f64) {
    let got = values.values_by_index();
    let want = expected.values_by_index();
    assert_eq!(
        got.len(),
        want.len(),
        "{}: length mismatch - got {}, expected {}",
        values.algorithm(),
        got.len(),
        want.len()
    );

    let failures: Vec<String> = got
        .iter()
        .zip(&want)
        .filter(|((_, g), (_, w))| !((g - w).abs() <= atol + rtol * w.abs()))
        .map(|((i, g), (_, w))| format!("  [{i:3}] {g:>12.6} != {w:>12.6}"))
        .collect();
    assert!(
        failures.is_empty(),
        "{}: {}/{} values differ (rtol={rtol}, atol={atol})\n{}",
        values.algorithm(),
        failures.len(),
        got.len(),
        failures.join("\n")
    );
}

/// Assert that the Spearman rank correlation of two results is at least
/// `threshold`.
///
/// # Panics
///
/// Panics if the correlation is below `threshold`.
pub fn check_rank_correlation(values: &ValuationResult, expected: &ValuationResult, threshold: f64) {
    let got: Vec<f64> = values.values_by_index().into_iter().map(|(_, v)| v).collect();
    let want: Vec<f64> = expected.values_by_index().into_iter().map(|(_, v)| v).collect();
    let rho = spearman(&got, &want);
    assert!(
        rho >= threshold,
        "{}: rank correlation {rho:.4} below {threshold}",
        values.algorithm()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Status;

    #[test]
    fn test_assert_approx_eq_macro() {
        assert_approx_eq!(1.0, 1.0001, 0.001);
        assert_approx_eq!(-1.5, -1.5001, 0.001, "value {}", 3);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.0, 2.0, 0.1);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 0.1);
    }

    fn result(values: Vec<f64>) -> ValuationResult {
        let names = (0..values.len()).map(|i| i.to_string()).collect();
        ValuationResult::from_values("test", values, names, Status::Converged).unwrap()
    }

    #[test]
    fn test_check_values_with_relative_tolerance() {
        check_values(&result(vec![1.05, 2.1]), &result(vec![1.0, 2.0]), 0.1, 0.0);
    }

    #[test]
    #[should_panic(expected = "1/2 values differ")]
    fn test_check_values_reports_failures() {
        check_values(&result(vec![1.5, 2.0]), &result(vec![1.0, 2.0]), 0.1, 0.0);
    }

    #[test]
    fn test_check_rank_correlation() {
        check_rank_correlation(&result(vec![0.1, 0.5, 0.9]), &result(vec![1.0, 2.0, 3.0]), 0.99);
    }
}
