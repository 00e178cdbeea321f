//! Plot-ready series.
//!
//! Nothing here draws; the functions reduce results and curves to records
//! that any plotting tool can consume, and [`write_json`] exports them.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::value::ValuationResult;

/// Mean and standard deviation of several curves, position by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSummary {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
    /// Number of finite samples at each position.
    pub count: Vec<usize>,
}

impl CurveSummary {
    /// `mean - std`, the lower edge of a shaded band.
    pub fn lower(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.std).map(|(m, s)| m - s).collect()
    }

    /// `mean + std`, the upper edge of a shaded band.
    pub fn upper(&self) -> Vec<f64> {
        self.mean.iter().zip(&self.std).map(|(m, s)| m + s).collect()
    }
}

/// Aggregate curves of possibly different lengths.
///
/// NaN entries (failed fits) are skipped. Positions without any finite
/// sample are NaN. The standard deviation is the sample one, zero for a
/// single sample.
pub fn aggregate_curves(curves: &[Vec<f64>]) -> CurveSummary {
    let len = curves.iter().map(Vec::len).max().unwrap_or(0);
    let mut summary = CurveSummary {
        mean: Vec::with_capacity(len),
        std: Vec::with_capacity(len),
        count: Vec::with_capacity(len),
    };

    for pos in 0..len {
        let samples: Vec<f64> = curves
            .iter()
            .filter_map(|c| c.get(pos).copied())
            .filter(|v| v.is_finite())
            .collect();
        let n = samples.len();
        let (mean, std) = match n {
            0 => (f64::NAN, f64::NAN),
            1 => (samples[0], 0.0),
            _ => {
                let mean = samples.iter().sum::<f64>() / n as f64;
                let var = samples.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
                (mean, var.sqrt())
            }
        };
        summary.mean.push(mean);
        summary.std.push(std);
        summary.count.push(n);
    }
    summary
}

/// One bar of a value plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBar {
    pub index: usize,
    pub name: String,
    pub value: f64,
    pub stderr: f64,
}

/// Values with their standard errors, in the result's current order.
pub fn shapley_errorbars(result: &ValuationResult) -> Vec<ErrorBar> {
    result
        .iter()
        .map(|item| ErrorBar {
            stderr: item.stderr(),
            index: item.index,
            name: item.name,
            value: item.value,
        })
        .collect()
}

/// Write any report record as pretty JSON.
pub fn write_json<T: Serialize + ?Sized, W: Write>(value: &T, writer: W) -> Result<(), ValuationError> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{SortKey, Status};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_aggregate_uneven_curves() {
        let curves = vec![vec![1.0, 2.0, 3.0], vec![3.0, f64::NAN], vec![2.0]];
        let s = aggregate_curves(&curves);
        assert_eq!(s.count, vec![3, 1, 1]);
        assert_abs_diff_eq!(s.mean[0], 2.0);
        assert_abs_diff_eq!(s.std[0], 1.0);
        assert_abs_diff_eq!(s.mean[1], 2.0);
        assert_abs_diff_eq!(s.std[1], 0.0);
        assert_eq!(s.lower()[0], 1.0);
        assert_eq!(s.upper()[0], 3.0);
    }

    #[test]
    fn test_aggregate_empty() {
        let s = aggregate_curves(&[]);
        assert!(s.mean.is_empty());
        let s = aggregate_curves(&[vec![f64::NAN]]);
        assert!(s.mean[0].is_nan());
    }

    #[test]
    fn test_errorbars_follow_sort_order() {
        let mut result = ValuationResult::from_values(
            "test",
            vec![0.1, 0.7, 0.3],
            vec!["a".into(), "b".into(), "c".into()],
            Status::Converged,
        )
        .unwrap();
        result.sort(true, SortKey::Value);
        let bars = shapley_errorbars(&result);
        let names: Vec<&str> = bars.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);

        let mut buf = Vec::new();
        write_json(&bars, &mut buf).unwrap();
        let parsed: Vec<ErrorBar> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, bars);
    }
}
