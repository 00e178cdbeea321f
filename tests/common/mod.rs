//! Shared helpers for integration tests.
//!
//! For assertion helpers and games with known values, use `datavalue::testing`.

#![allow(dead_code)]

use datavalue::value::stopping::{MaxUpdates, StoppingCriterion};
use datavalue::value::ShapleyParams;

// Re-export testing utilities for convenience
#[allow(unused_imports)]
pub use datavalue::testing::data::{analytic_utility, analytic_values};
#[allow(unused_imports)]
pub use datavalue::testing::{check_rank_correlation, check_total_value, check_values};

/// Parameters for a seeded Monte Carlo run of `max_updates` updates.
pub fn montecarlo_params(max_updates: usize, n_jobs: usize, seed: u64) -> ShapleyParams {
    let done: Box<dyn StoppingCriterion> = MaxUpdates::new(max_updates)
        .expect("positive max_updates")
        .boxed();
    ShapleyParams {
        done: Some(done),
        n_jobs,
        seed: Some(seed),
        ..ShapleyParams::default()
    }
}
