//! datavalue: data valuation for supervised learning.
//!
//! Assigns a value to every point (or group of points) of a training set,
//! measuring its contribution to the test performance of a model.
//!
//! # Key Types
//!
//! - [`Dataset`] - Training and test data, optionally grouped
//! - [`SupervisedModel`] - The contract models must satisfy
//! - [`Utility`] - Model, data and scorer as a function of index subsets
//! - [`ValuationResult`] - Values with running variances and counts
//! - [`ValuationConfig`] - Configuration builder for a valuation run
//!
//! # Algorithms
//!
//! - Leave-one-out: [`value::naive_loo`]
//! - Shapley values: [`value::compute_shapley_values`] with any [`ShapleyMode`]
//! - Least core: [`value::compute_least_core_values`] with any [`LeastCoreMode`]
//!
//! Monte Carlo methods stop according to [`value::stopping`] criteria.
//!
//! # Example
//!
//! ```
//! use datavalue::testing::data::analytic_utility;
//! use datavalue::value::{compute_shapley_values, ShapleyMode, ShapleyParams};
//!
//! let u = analytic_utility(4);
//! let values = compute_shapley_values(&u, ShapleyMode::PermutationExact, &ShapleyParams::default())
//!     .unwrap();
//! assert!((values.values().iter().sum::<f64>() - 1.0).abs() < 1e-10);
//! ```

// Re-export approx traits for users who want to compare values
pub use approx;

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod numeric;
pub mod parallel;
pub mod progress;
pub mod reporting;
pub mod scoring;
pub mod testing;
pub mod utility;
pub mod utils;
pub mod value;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use config::{ParallelConfig, ValuationConfig};
pub use data::Dataset;
pub use error::{ConfigError, ValuationError};
pub use model::SupervisedModel;
pub use progress::Verbosity;
pub use scoring::Scorer;
pub use utility::Utility;
pub use value::{LeastCoreMode, ShapleyMode, Status, ValuationResult};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
