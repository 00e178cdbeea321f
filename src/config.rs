//! Run configuration with builder pattern.
//!
//! [`ValuationConfig`] gathers everything a valuation run needs besides the
//! utility: the algorithm, its stopping rule, parallelism, caching and
//! reproducibility settings. It is built with `bon` and validated on
//! `build()`, or read from JSON with [`ValuationConfig::from_json_reader`].
//!
//! # Example
//!
//! ```
//! use datavalue::config::{ParallelConfig, ValuationConfig};
//! use datavalue::value::ShapleyMode;
//!
//! let config = ValuationConfig::builder()
//!     .mode(ShapleyMode::PermutationMontecarlo)
//!     .max_updates(500)
//!     .value_tolerance(1e-3)
//!     .parallel(ParallelConfig::threads(4))
//!     .seed(42)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.parallel.n_jobs(), 4);
//!
//! let parsed = ValuationConfig::from_json_str(r#"{"mode": "owen", "n_iterations": 10, "max_q": 5}"#)
//!     .unwrap();
//! assert_eq!(parsed.mode, ShapleyMode::Owen);
//! ```

use std::io::Read;
use std::sync::Arc;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::error::{ConfigError, ValuationError};
use crate::progress::Verbosity;
use crate::value::shapley::{RelativeTruncation, ShapleyParams, TruncationPolicy};
use crate::value::stopping::{AbsoluteStandardError, MaxTime, MaxUpdates, StoppingCriterion};
use crate::value::{LeastCoreParams, ShapleyMode};

const DEFAULT_MAX_UPDATES: usize = 100;
const DEFAULT_UPDATE_PERIOD: usize = 10;

// =============================================================================
// ParallelConfig
// =============================================================================

/// Where jobs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelBackend {
    /// Everything on the calling thread.
    Sequential,
    /// A local rayon pool or scoped threads.
    #[default]
    Threads,
}

/// Parallel execution settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub backend: ParallelBackend,
    /// Number of workers. `None` uses all available cores.
    pub n_workers: Option<usize>,
}

impl ParallelConfig {
    pub fn sequential() -> Self {
        Self {
            backend: ParallelBackend::Sequential,
            n_workers: None,
        }
    }

    pub fn threads(n_workers: usize) -> Self {
        Self {
            backend: ParallelBackend::Threads,
            n_workers: Some(n_workers),
        }
    }

    /// Job count in the convention of the algorithms: `0` means all cores.
    pub fn n_jobs(&self) -> usize {
        match self.backend {
            ParallelBackend::Sequential => 1,
            ParallelBackend::Threads => self.n_workers.unwrap_or(0),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.n_workers == Some(0) {
            return Err(ConfigError::ZeroJobs);
        }
        Ok(())
    }
}

// =============================================================================
// ValuationConfig
// =============================================================================

/// Configuration of a valuation run.
///
/// The stopping rule of Monte Carlo methods is the disjunction of the limits
/// that are set: `max_updates`, `value_tolerance` (absolute standard error)
/// and `max_time` (seconds).
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
#[serde(default)]
pub struct ValuationConfig {
    /// Shapley algorithm. Default: truncated Monte Carlo.
    #[builder(default)]
    pub mode: ShapleyMode,

    // === Stopping ===
    /// Stop after this many updates of the most updated value. Default: 100.
    pub max_updates: Option<usize>,

    /// Stop once every standard error is below this threshold.
    pub value_tolerance: Option<f64>,

    /// Stop after this many seconds.
    pub max_time: Option<f64>,

    // === Algorithm parameters ===
    /// Relative tolerance of permutation truncation. Default: 0.01 for
    /// truncated Monte Carlo, none otherwise.
    pub truncation_rtol: Option<f64>,

    /// Samples per `q` for Owen sampling, sampled subsets for least core.
    pub n_iterations: Option<usize>,

    /// Number of `q` values for Owen sampling.
    pub max_q: Option<usize>,

    /// Relaxation of least core constraints. Default: 0.01.
    #[builder(default = crate::value::least_core::DEFAULT_EPSILON)]
    pub epsilon: f64,

    /// Permutations per worker report in truncated Monte Carlo. Default: 10.
    #[builder(default = DEFAULT_UPDATE_PERIOD)]
    pub update_period: usize,

    /// Independent repetitions of the whole computation. Default: 1.
    #[builder(default = 1)]
    pub n_runs: usize,

    // === Resources ===
    #[builder(default)]
    pub parallel: ParallelConfig,

    /// Utility memoization. `None` disables caching.
    pub cache: Option<CacheConfig>,

    // === Reproducibility ===
    /// Base random seed. Random if unset.
    pub seed: Option<u64>,

    // === Logging ===
    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

impl<S: valuation_config_builder::IsComplete> ValuationConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any parameter is invalid:
    /// - zero `max_updates`, `n_runs`, `update_period`, `n_iterations` or workers
    /// - non-positive `value_tolerance`, `max_time` or `truncation_rtol`
    /// - `max_q < 2`
    pub fn build(self) -> Result<ValuationConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            mode: ShapleyMode::default(),
            max_updates: None,
            value_tolerance: None,
            max_time: None,
            truncation_rtol: None,
            n_iterations: None,
            max_q: None,
            epsilon: crate::value::least_core::DEFAULT_EPSILON,
            update_period: DEFAULT_UPDATE_PERIOD,
            n_runs: 1,
            parallel: ParallelConfig::default(),
            cache: None,
            seed: None,
            verbosity: Verbosity::default(),
        }
    }
}

impl ValuationConfig {
    /// Read and validate a JSON configuration. Missing fields take their defaults.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ValuationError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ValuationError> {
        Self::from_json_reader(json.as_bytes())
    }

    /// Check every parameter, as `build` and the JSON readers do.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("max_updates", self.max_updates),
            ("n_iterations", self.n_iterations),
            ("n_runs", Some(self.n_runs)),
            ("update_period", Some(self.update_period)),
        ];
        for (field, value) in counts {
            if value == Some(0) {
                return Err(ConfigError::NonPositiveCount { field, value: 0 });
            }
        }

        let positives = [
            ("value_tolerance", self.value_tolerance),
            ("max_time", self.max_time),
            ("truncation_rtol", self.truncation_rtol),
        ];
        for (field, value) in positives {
            if let Some(v) = value.filter(|v| !(*v > 0.0)) {
                return Err(ConfigError::NonPositive { field, value: v });
            }
        }
        if !(self.epsilon >= 0.0) {
            return Err(ConfigError::NonPositive {
                field: "epsilon",
                value: self.epsilon,
            });
        }

        if let Some(q) = self.max_q.filter(|&q| q < 2) {
            return Err(ConfigError::TooSmall {
                field: "max_q",
                value: q,
                min: 2,
            });
        }
        self.parallel.validate()
    }

    /// Stopping criterion combining every configured limit with OR.
    ///
    /// Without any limit, stops after 100 updates.
    pub fn stopping_criterion(&self) -> Result<Box<dyn StoppingCriterion>, ConfigError> {
        let mut criteria: Vec<Box<dyn StoppingCriterion>> = Vec::new();
        if let Some(n) = self.max_updates {
            criteria.push(MaxUpdates::new(n)?.boxed());
        }
        if let Some(threshold) = self.value_tolerance {
            criteria.push(AbsoluteStandardError::new(threshold, 1.0, 4)?.boxed());
        }
        if let Some(seconds) = self.max_time {
            criteria.push(MaxTime::new(seconds)?.boxed());
        }

        let mut criteria = criteria.into_iter();
        match criteria.next() {
            Some(first) => Ok(criteria.fold(first, |acc, c| acc | c)),
            None => Ok(MaxUpdates::new(DEFAULT_MAX_UPDATES)?.boxed()),
        }
    }

    /// Parameters for [`compute_shapley_values`](crate::value::compute_shapley_values).
    pub fn shapley_params(&self) -> Result<ShapleyParams, ConfigError> {
        let truncation = self
            .truncation_rtol
            .map(|rtol| RelativeTruncation::new(rtol).map(|t| Arc::new(t) as Arc<dyn TruncationPolicy>))
            .transpose()?;
        Ok(ShapleyParams {
            done: Some(self.stopping_criterion()?),
            n_jobs: self.parallel.n_jobs(),
            n_iterations: self.n_iterations,
            max_q: self.max_q,
            truncation,
            update_period: self.update_period,
            seed: self.seed,
            verbosity: self.verbosity,
        })
    }

    /// Parameters for [`compute_least_core_values`](crate::value::compute_least_core_values).
    pub fn least_core_params(&self) -> LeastCoreParams {
        LeastCoreParams {
            n_iterations: self.n_iterations,
            epsilon: self.epsilon,
            n_jobs: self.parallel.n_jobs(),
            seed: self.seed,
            verbosity: self.verbosity,
        }
    }

    /// Seed of run `run`, derived from the base seed.
    pub fn run_seed(&self, run: usize) -> Option<u64> {
        self.seed.map(|s| s.wrapping_add((run as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}
