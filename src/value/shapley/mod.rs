//! Shapley values of data points.
//!
//! The Shapley value of a point is its marginal contribution to the utility,
//! averaged over all orders in which the dataset could be assembled:
//!
//! ```text
//! v(i) = 1/n Σ_{S ⊆ N \ {i}} C(n-1, |S|)^{-1} [u(S ∪ {i}) - u(S)]
//! ```
//!
//! [`compute_shapley_values`] dispatches to every method by [`ShapleyMode`].
//! The exact methods are only tractable for very small datasets; the Monte
//! Carlo methods are steered by a [stopping criterion](crate::value::stopping).

mod knn;
mod montecarlo;
mod naive;
mod owen;
pub mod truncation;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use knn::knn_shapley;
pub use montecarlo::{
    combinatorial_montecarlo_shapley, permutation_montecarlo_shapley, truncated_montecarlo_shapley,
};
pub use naive::{combinatorial_exact_shapley, permutation_exact_shapley};
pub use owen::{owen_sampling_shapley, OwenAlgorithm};
pub use truncation::{FixedTruncation, NoTruncation, RelativeTruncation, TruncationPolicy};

use super::stopping::{MaxUpdates, StoppingCriterion};
use super::ValuationResult;
use crate::error::{ConfigError, ValuationError};
use crate::model::SupervisedModel;
use crate::progress::Verbosity;
use crate::utility::Utility;

/// Largest dataset for which all permutations are enumerated.
pub const MAX_PERMUTATION_EXACT: usize = 10;

/// Largest dataset for which the whole powerset is enumerated.
pub const MAX_COMBINATORIAL_EXACT: usize = 20;

/// Default relative tolerance of truncated Monte Carlo.
const DEFAULT_TRUNCATION_RTOL: f64 = 0.01;

// =============================================================================
// Mode
// =============================================================================

/// Algorithm used by [`compute_shapley_values`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapleyMode {
    CombinatorialExact,
    PermutationExact,
    CombinatorialMontecarlo,
    PermutationMontecarlo,
    #[default]
    TruncatedMontecarlo,
    Owen,
    OwenAntithetic,
    Knn,
}

impl ShapleyMode {
    pub const ALL: [ShapleyMode; 8] = [
        ShapleyMode::CombinatorialExact,
        ShapleyMode::PermutationExact,
        ShapleyMode::CombinatorialMontecarlo,
        ShapleyMode::PermutationMontecarlo,
        ShapleyMode::TruncatedMontecarlo,
        ShapleyMode::Owen,
        ShapleyMode::OwenAntithetic,
        ShapleyMode::Knn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShapleyMode::CombinatorialExact => "combinatorial_exact",
            ShapleyMode::PermutationExact => "permutation_exact",
            ShapleyMode::CombinatorialMontecarlo => "combinatorial_montecarlo",
            ShapleyMode::PermutationMontecarlo => "permutation_montecarlo",
            ShapleyMode::TruncatedMontecarlo => "truncated_montecarlo",
            ShapleyMode::Owen => "owen",
            ShapleyMode::OwenAntithetic => "owen_antithetic",
            ShapleyMode::Knn => "knn",
        }
    }
}

impl fmt::Display for ShapleyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShapleyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owen_sampling" => return Ok(ShapleyMode::Owen),
            "owen_halved" => return Ok(ShapleyMode::OwenAntithetic),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "shapley mode",
                name: s.to_string(),
            })
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Parameters shared by the Shapley methods. Each method reads the ones it needs.
///
/// ```
/// use datavalue::value::shapley::ShapleyParams;
/// use datavalue::value::stopping::{MaxUpdates, StoppingCriterion};
///
/// let params = ShapleyParams::builder()
///     .done(MaxUpdates::new(500).unwrap().boxed())
///     .n_jobs(4)
///     .seed(42)
///     .build();
/// assert_eq!(params.update_period, 10);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ShapleyParams {
    /// Stopping criterion for Monte Carlo methods. Default: 100 updates.
    pub done: Option<Box<dyn StoppingCriterion>>,

    /// Number of parallel jobs; `0` uses all CPUs. Default: 1.
    #[builder(default = 1)]
    pub n_jobs: usize,

    /// Samples per `q` for Owen sampling. Required by the Owen modes.
    pub n_iterations: Option<usize>,

    /// Number of `q` values for Owen sampling. Required by the Owen modes.
    pub max_q: Option<usize>,

    /// Permutation truncation. Default: none for permutation Monte Carlo and
    /// 1% relative tolerance for truncated Monte Carlo.
    pub truncation: Option<Arc<dyn TruncationPolicy>>,

    /// Permutations per worker report in truncated Monte Carlo. Default: 10.
    #[builder(default = 10)]
    pub update_period: usize,

    /// Base seed; each job derives its own stream. Random if unset.
    pub seed: Option<u64>,

    #[builder(default)]
    pub verbosity: Verbosity,
}

impl Default for ShapleyParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ShapleyParams {
    fn stopping(&self) -> Result<Box<dyn StoppingCriterion>, ValuationError> {
        match &self.done {
            Some(done) => Ok(done.clone()),
            None => Ok(MaxUpdates::new(100)?.boxed()),
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Compute Shapley values with any of the available methods.
///
/// # Errors
///
/// Besides the errors of each method, the Owen modes fail without
/// `n_iterations` and `max_q`, and [`ShapleyMode::Knn`] fails for models
/// that do not report a number of neighbours.
pub fn compute_shapley_values<M: SupervisedModel>(
    u: &Utility<M>,
    mode: ShapleyMode,
    params: &ShapleyParams,
) -> Result<ValuationResult, ValuationError> {
    info!(%mode, n = u.len(), n_jobs = params.n_jobs, "computing shapley values");
    let verbosity = params.verbosity;
    match mode {
        ShapleyMode::CombinatorialExact => {
            combinatorial_exact_shapley(u, params.n_jobs, verbosity)
        }
        ShapleyMode::PermutationExact => permutation_exact_shapley(u, verbosity),
        ShapleyMode::CombinatorialMontecarlo => combinatorial_montecarlo_shapley(
            u,
            params.stopping()?.as_ref(),
            params.n_jobs,
            params.seed,
            verbosity,
        ),
        ShapleyMode::PermutationMontecarlo => {
            let truncation: Arc<dyn TruncationPolicy> =
                params.truncation.clone().unwrap_or_else(|| Arc::new(NoTruncation));
            permutation_montecarlo_shapley(
                u,
                params.stopping()?.as_ref(),
                truncation.as_ref(),
                params.n_jobs,
                params.seed,
                verbosity,
            )
        }
        ShapleyMode::TruncatedMontecarlo => {
            let truncation: Arc<dyn TruncationPolicy> = match &params.truncation {
                Some(t) => t.clone(),
                None => Arc::new(RelativeTruncation::new(DEFAULT_TRUNCATION_RTOL)?),
            };
            truncated_montecarlo_shapley(
                u,
                params.stopping()?.as_ref(),
                truncation.as_ref(),
                params.n_jobs,
                params.update_period,
                params.seed,
                verbosity,
            )
        }
        ShapleyMode::Owen | ShapleyMode::OwenAntithetic => {
            let n_iterations = params.n_iterations.ok_or_else(|| {
                ValuationError::InvalidArgument("n_iterations is required for Owen sampling".into())
            })?;
            let max_q = params.max_q.ok_or_else(|| {
                ValuationError::InvalidArgument("max_q is required for Owen sampling".into())
            })?;
            let method = if mode == ShapleyMode::Owen {
                OwenAlgorithm::Standard
            } else {
                OwenAlgorithm::Antithetic
            };
            owen_sampling_shapley(u, n_iterations, max_q, method, params.n_jobs, params.seed, verbosity)
        }
        ShapleyMode::Knn => {
            let k = u
                .model()
                .n_neighbors()
                .ok_or_else(|| ValuationError::NotANeighborsModel(u.model().name().to_string()))?;
            knn_shapley(u.data(), k, verbosity)
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub(crate) fn data_names<M: SupervisedModel>(u: &Utility<M>) -> Vec<String> {
    u.data().data_names().to_vec()
}

pub(crate) fn ensure_len(n: usize) -> Result<(), ValuationError> {
    if n == 0 {
        return Err(ValuationError::InvalidArgument(
            "cannot compute values for an empty dataset".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_nonempty<M: SupervisedModel>(u: &Utility<M>) -> Result<(), ValuationError> {
    ensure_len(u.len())
}

pub(crate) fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(rand::random)
}
