//! Data valuation algorithms and their results.
//!
//! Every algorithm consumes a [`Utility`](crate::utility::Utility) and returns
//! a [`ValuationResult`] with one value per data index:
//!
//! - [`naive_loo`]: leave-one-out
//! - [`shapley`]: exact, Monte Carlo, Owen sampling and KNN Shapley values
//! - [`least_core`]: exact and Monte Carlo least core
//!
//! Iterative methods are steered by [`stopping`] criteria.

pub mod least_core;
mod loo;
mod result;
pub mod shapley;
mod status;
pub mod stopping;

pub use least_core::{compute_least_core_values, LeastCoreMode, LeastCoreParams};
pub use loo::naive_loo;
pub use result::{SortKey, ValuationResult, ValueItem};
pub use shapley::{compute_shapley_values, ShapleyMode, ShapleyParams};
pub use status::Status;
