//! Regression scorers.
//!
//! All scorers follow the "higher is better" convention, so errors are negated.

use ndarray::ArrayView1;

use super::ScoreFn;

/// Coefficient of determination.
///
/// A constant target gives `1.0` for a perfect fit and `0.0` otherwise.
pub fn r2_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return f64::NAN;
    }
    let mean = y_true.sum() / n as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    degenerate_ratio(ss_res, ss_tot)
}

/// `1 - num / den`, with sklearn's convention for a zero denominator.
fn degenerate_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        if num == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - num / den
    }
}

fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count() as f64;
    let mean = values.clone().sum::<f64>() / n;
    values.map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

// =============================================================================
// R²
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct R2;

impl ScoreFn for R2 {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        r2_score(y_true, y_pred)
    }

    fn name(&self) -> &'static str {
        "r2"
    }

    fn range(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, 1.0)
    }
}

// =============================================================================
// Negated errors
// =============================================================================

/// Negative mean squared error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegMeanSquaredError;

impl ScoreFn for NegMeanSquaredError {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        let n = y_true.len() as f64;
        -y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n
    }

    fn name(&self) -> &'static str {
        "neg_mean_squared_error"
    }

    fn range(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, 0.0)
    }
}

/// Negative mean absolute error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegMeanAbsoluteError;

impl ScoreFn for NegMeanAbsoluteError {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        let n = y_true.len() as f64;
        -y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).abs())
            .sum::<f64>()
            / n
    }

    fn name(&self) -> &'static str {
        "neg_mean_absolute_error"
    }

    fn range(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, 0.0)
    }
}

/// Negative median absolute error. Robust to outliers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegMedianAbsoluteError;

impl ScoreFn for NegMedianAbsoluteError {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        let mut errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).abs())
            .collect();
        if errors.is_empty() {
            return f64::NAN;
        }
        errors.sort_by(f64::total_cmp);
        let mid = errors.len() / 2;
        let median = if errors.len() % 2 == 0 {
            (errors[mid - 1] + errors[mid]) / 2.0
        } else {
            errors[mid]
        };
        -median
    }

    fn name(&self) -> &'static str {
        "neg_median_absolute_error"
    }

    fn range(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, 0.0)
    }
}

// =============================================================================
// Explained variance
// =============================================================================

/// `1 - Var(y - ŷ) / Var(y)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplainedVariance;

impl ScoreFn for ExplainedVariance {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        if y_true.is_empty() {
            return f64::NAN;
        }
        let residuals = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p);
        degenerate_ratio(variance(residuals), variance(y_true.iter().copied()))
    }

    fn name(&self) -> &'static str {
        "explained_variance"
    }

    fn range(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, 1.0)
    }
}
