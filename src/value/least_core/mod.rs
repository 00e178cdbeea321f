//! Least core values.
//!
//! The least core is the set of allocations `x` of the total utility that
//! minimise the largest subsidy `e` any coalition would need to stay:
//!
//! ```text
//! minimize    e
//! subject to  Σ_{i ∈ N} x_i = u(N)
//!             Σ_{i ∈ S} x_i + e >= u(S)    for every S ⊆ N
//!             e >= 0
//! ```
//!
//! [`exact_least_core`] uses every subset; [`montecarlo_least_core`] a random
//! sample of them, relaxed by `epsilon`. The subsidy `e` is stored in the
//! result under the extra key [`LEAST_CORE_VALUE`].

mod lp;
mod montecarlo;
mod naive;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use lp::{LinearProgram, LpError, LpSolution};
pub use montecarlo::montecarlo_least_core;
pub use naive::exact_least_core;

use crate::error::{ConfigError, ValuationError};
use crate::model::SupervisedModel;
use crate::progress::Verbosity;
use crate::utility::Utility;
use crate::value::{Status, ValuationResult};

/// Extra value holding the subsidy `e` of the solution.
pub const LEAST_CORE_VALUE: &str = "least_core_value";

/// Largest dataset for which every subset is used as a constraint.
pub const MAX_EXACT_LEAST_CORE: usize = 12;

/// Default relaxation of sampled constraints.
pub const DEFAULT_EPSILON: f64 = 0.01;

// =============================================================================
// Mode and parameters
// =============================================================================

/// Algorithm used by [`compute_least_core_values`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeastCoreMode {
    Exact,
    #[default]
    MonteCarlo,
}

impl fmt::Display for LeastCoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LeastCoreMode::Exact => "exact",
            LeastCoreMode::MonteCarlo => "montecarlo",
        })
    }
}

impl FromStr for LeastCoreMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(LeastCoreMode::Exact),
            "montecarlo" | "monte_carlo" => Ok(LeastCoreMode::MonteCarlo),
            other => Err(ConfigError::UnknownName {
                kind: "least core mode",
                name: other.to_string(),
            }),
        }
    }
}

/// Parameters of [`compute_least_core_values`].
#[derive(Debug, Clone, Builder)]
pub struct LeastCoreParams {
    /// Number of sampled subsets. Required for Monte Carlo.
    pub n_iterations: Option<usize>,

    /// Relaxation of sampled constraints. Default: 0.01.
    #[builder(default = DEFAULT_EPSILON)]
    pub epsilon: f64,

    /// Number of parallel jobs; `0` uses all CPUs. Default: 1.
    #[builder(default = 1)]
    pub n_jobs: usize,

    pub seed: Option<u64>,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl Default for LeastCoreParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Compute least core values with either algorithm.
///
/// # Errors
///
/// Monte Carlo fails without `n_iterations`. See each algorithm for the rest.
pub fn compute_least_core_values<M: SupervisedModel>(
    u: &Utility<M>,
    mode: LeastCoreMode,
    params: &LeastCoreParams,
) -> Result<ValuationResult, ValuationError> {
    info!(%mode, n = u.len(), n_jobs = params.n_jobs, "computing least core values");
    match mode {
        LeastCoreMode::Exact => exact_least_core(u, params.n_jobs, params.verbosity),
        LeastCoreMode::MonteCarlo => {
            let n_iterations = params.n_iterations.ok_or_else(|| {
                ValuationError::InvalidArgument(
                    "n_iterations is required for Monte Carlo least core".to_string(),
                )
            })?;
            montecarlo_least_core(
                u,
                n_iterations,
                params.epsilon,
                params.n_jobs,
                params.seed,
                params.verbosity,
            )
        }
    }
}

// =============================================================================
// Shared problem
// =============================================================================

/// Utilities gathered for the least core linear program.
#[derive(Debug, Clone)]
pub(crate) struct LeastCoreProblem {
    pub n: usize,
    pub total: f64,
    pub empty: f64,
    /// Coalitions and their utilities.
    pub coalitions: Vec<(Vec<usize>, f64)>,
}

impl LeastCoreProblem {
    /// Build the linear program over `x_0..x_{n-1}` (free) and `e` (last).
    ///
    /// Coalitions with NaN utility are dropped and repeated coalitions keep
    /// their first occurrence. The empty set always comes first, unrelaxed.
    fn linear_program(&self, epsilon: f64) -> LinearProgram {
        let n = self.n;
        let mut c = vec![0.0; n + 1];
        c[n] = 1.0;

        let mut sum_row = vec![1.0; n + 1];
        sum_row[n] = 0.0;
        let mut lp = (0..n)
            .fold(LinearProgram::minimize(c), |lp, j| lp.free_variable(j))
            .equality(sum_row, self.total);

        let mut empty_row = vec![0.0; n + 1];
        empty_row[n] = -1.0;
        lp = lp.upper_bound(empty_row, -self.empty);

        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        seen.insert(Vec::new());
        let mut n_nan = 0;
        for (subset, utility) in &self.coalitions {
            if utility.is_nan() {
                n_nan += 1;
                continue;
            }
            let mut key = subset.clone();
            key.sort_unstable();
            key.dedup();
            if !seen.insert(key.clone()) {
                continue;
            }
            let mut row = vec![0.0; n + 1];
            for &i in &key {
                row[i] = -1.0;
            }
            row[n] = -1.0;
            lp = lp.upper_bound(row, -(utility - epsilon));
        }
        if n_nan > 0 {
            warn!(n_nan, total = self.coalitions.len(), "dropping coalitions with NaN utility");
        }
        debug!(
            n_constraints = lp.n_constraints(),
            n_coalitions = self.coalitions.len(),
            "built least core linear program"
        );
        lp
    }

    /// Solve the program and package the allocation as a result.
    ///
    /// A program without solution yields NaN values and status `Failed`.
    pub fn solve(
        &self,
        algorithm: &str,
        names: Vec<String>,
        epsilon: f64,
    ) -> Result<ValuationResult, ValuationError> {
        let (values, subsidy, status) = match self.linear_program(epsilon).solve() {
            Ok(solution) => {
                let subsidy = solution.x[self.n];
                let mut values = solution.x;
                values.truncate(self.n);
                (values, subsidy, Status::Converged)
            }
            Err(err) => {
                warn!(algorithm, error = %err, "no least core solution found");
                (vec![f64::NAN; self.n], f64::NAN, Status::Failed)
            }
        };
        Ok(ValuationResult::from_values(algorithm, values, names, status)?
            .with_extra(LEAST_CORE_VALUE, subsidy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_mode_names() {
        assert_eq!("exact".parse::<LeastCoreMode>().unwrap(), LeastCoreMode::Exact);
        assert_eq!("montecarlo".parse::<LeastCoreMode>().unwrap(), LeastCoreMode::MonteCarlo);
        assert!("quadratic".parse::<LeastCoreMode>().is_err());
        assert_eq!(LeastCoreMode::MonteCarlo.to_string(), "montecarlo");
    }

    #[test]
    fn test_glove_game() {
        // Players 0 and 1 own left gloves, player 2 a right glove; a pair is
        // worth 1. The core gives everything to the scarce right glove.
        let u = |s: &[usize]| -> f64 {
            let left = s.iter().filter(|&&i| i < 2).count();
            let right = s.iter().filter(|&&i| i == 2).count();
            left.min(right) as f64
        };
        let coalitions: Vec<(Vec<usize>, f64)> = crate::numeric::powerset(&[0, 1, 2])
            .map(|s| {
                let v = u(&s);
                (s, v)
            })
            .collect();
        let problem = LeastCoreProblem {
            n: 3,
            total: 1.0,
            empty: 0.0,
            coalitions,
        };
        let r = problem.solve("exact_least_core", names(3), 0.0).unwrap();
        assert_eq!(r.status(), Status::Converged);
        let v: Vec<f64> = r.values_by_index().into_iter().map(|(_, v)| v).collect();
        assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(v[2], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(r.extra(LEAST_CORE_VALUE).unwrap(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_empty_core_needs_subsidy() {
        // Majority game on three players: any pair wins. The core is empty and
        // the least core splits equally with subsidy 1/3.
        let coalitions: Vec<(Vec<usize>, f64)> = crate::numeric::powerset(&[0, 1, 2])
            .map(|s| {
                let v = if s.len() >= 2 { 1.0 } else { 0.0 };
                (s, v)
            })
            .collect();
        let problem = LeastCoreProblem {
            n: 3,
            total: 1.0,
            empty: 0.0,
            coalitions,
        };
        let r = problem.solve("exact_least_core", names(3), 0.0).unwrap();
        for (_, v) in r.values_by_index() {
            assert_abs_diff_eq!(v, 1.0 / 3.0, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(r.extra(LEAST_CORE_VALUE).unwrap(), 1.0 / 3.0, epsilon = 1e-8);
    }

    #[test]
    fn test_nan_and_duplicate_coalitions_are_dropped() {
        let problem = LeastCoreProblem {
            n: 2,
            total: 1.0,
            empty: 0.0,
            coalitions: vec![
                (vec![0], 0.5),
                (vec![0], 0.9),
                (vec![1], f64::NAN),
                (vec![], 0.3),
            ],
        };
        let lp = problem.linear_program(0.0);
        // sum row + empty set + {0}
        assert_eq!(lp.n_constraints(), 3);
    }
}
