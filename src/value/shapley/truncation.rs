//! Truncation policies for permutation sampling.
//!
//! While walking a permutation, the marginal contribution of late points is
//! often negligible. A policy decides after each utility evaluation whether
//! to stop evaluating the rest of the permutation; the remaining points then
//! receive a zero marginal.

use std::fmt;

use crate::error::ConfigError;

/// Decides when to stop evaluating a permutation.
pub trait TruncationPolicy: Send + Sync + fmt::Debug {
    /// Called after evaluating the utility on the first `n_evaluated` of `n`
    /// points of a permutation, with resulting `score`. `total` is the
    /// utility of the whole dataset when [`needs_total`](Self::needs_total).
    fn should_truncate(&self, n_evaluated: usize, n: usize, score: f64, total: f64) -> bool;

    /// Whether the policy needs the utility of the whole dataset.
    fn needs_total(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Always evaluate the whole permutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTruncation;

impl TruncationPolicy for NoTruncation {
    fn should_truncate(&self, _: usize, _: usize, _: f64, _: f64) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "NoTruncation"
    }
}

/// Evaluate at most `ceil(fraction * n)` points of each permutation.
#[derive(Debug, Clone, Copy)]
pub struct FixedTruncation {
    fraction: f64,
}

impl FixedTruncation {
    /// `fraction` must be in `(0, 1]`.
    pub fn new(fraction: f64) -> Result<Self, ConfigError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "fraction",
                value: fraction,
                low: 0.0,
                high: 1.0,
            });
        }
        Ok(Self { fraction })
    }
}

impl TruncationPolicy for FixedTruncation {
    fn should_truncate(&self, n_evaluated: usize, n: usize, _: f64, _: f64) -> bool {
        n_evaluated as f64 >= (self.fraction * n as f64).ceil()
    }

    fn name(&self) -> &'static str {
        "FixedTruncation"
    }
}

/// Stop once the running score is within `rtol` of the total utility:
/// `|u(S) - u(N)| < rtol * |u(N)|`.
#[derive(Debug, Clone, Copy)]
pub struct RelativeTruncation {
    rtol: f64,
}

impl RelativeTruncation {
    pub fn new(rtol: f64) -> Result<Self, ConfigError> {
        if !(rtol > 0.0) {
            return Err(ConfigError::NonPositive {
                field: "rtol",
                value: rtol,
            });
        }
        Ok(Self { rtol })
    }
}

impl TruncationPolicy for RelativeTruncation {
    fn should_truncate(&self, _: usize, _: usize, score: f64, total: f64) -> bool {
        (score - total).abs() < self.rtol * total.abs()
    }

    fn needs_total(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "RelativeTruncation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.5, 10, 4, false)]
    #[case(0.5, 10, 5, true)]
    #[case(0.25, 10, 3, true)]
    #[case(1.0, 3, 2, false)]
    fn test_fixed_truncation(
        #[case] fraction: f64,
        #[case] n: usize,
        #[case] evaluated: usize,
        #[case] expected: bool,
    ) {
        let policy = FixedTruncation::new(fraction).unwrap();
        assert_eq!(policy.should_truncate(evaluated, n, 0.0, 0.0), expected);
    }

    #[test]
    fn test_relative_truncation() {
        let policy = RelativeTruncation::new(0.1).unwrap();
        assert!(policy.needs_total());
        assert!(policy.should_truncate(1, 10, 0.95, 1.0));
        assert!(!policy.should_truncate(1, 10, 0.8, 1.0));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(FixedTruncation::new(0.0).is_err());
        assert!(FixedTruncation::new(1.5).is_err());
        assert!(RelativeTruncation::new(-0.1).is_err());
        assert!(!NoTruncation.should_truncate(100, 1, 1.0, 1.0));
    }
}
