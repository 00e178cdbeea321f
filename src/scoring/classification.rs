//! Classification scorers.

use ndarray::ArrayView1;

use super::ScoreFn;

/// Fraction of exact label matches.
pub fn accuracy_score(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let hits = y_true
        .iter()
        .zip(y_pred.iter())
        .filter(|(t, p)| t == p)
        .count();
    hits as f64 / y_true.len() as f64
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl ScoreFn for Accuracy {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        accuracy_score(y_true, y_pred)
    }

    fn name(&self) -> &'static str {
        "accuracy"
    }

    fn range(&self) -> (f64, f64) {
        (0.0, 1.0)
    }
}
