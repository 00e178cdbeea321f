//! Model performance as points are removed or added in value order.
//!
//! Removing the most valuable points first should hurt the test score more
//! than removing random points; adding them first should help more. These
//! curves are the usual sanity check of a valuation.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValuationError;
use crate::model::SupervisedModel;
use crate::utility::Utility;
use crate::utils::run_with_threads;
use crate::value::ValuationResult;

/// Fit on `subset` and score on the test set, ignoring the utility's cache
/// and error policy. Failures give NaN.
fn score_subset<M: SupervisedModel>(u: &Utility<M>, subset: &[usize]) -> f64 {
    let data = u.data();
    let Ok((x, y)) = data.training_subset(subset) else {
        return f64::NAN;
    };
    let mut model = u.model().clone();
    model
        .fit(x.view(), y.view())
        .and_then(|()| u.scorer().score(&model, data.x_test(), data.y_test()))
        .unwrap_or(f64::NAN)
}

/// Test scores after removing the points of `order` one at a time.
///
/// The model is retrained after each removal. The last point is never
/// removed, so the curve has `order.len() - 1` entries.
pub fn backward_elimination<M: SupervisedModel>(u: &Utility<M>, order: &[usize]) -> Vec<f64> {
    let mut remaining = u.indices();
    order
        .iter()
        .take(order.len().saturating_sub(1))
        .map(|&i| {
            remaining.retain(|&j| j != i);
            score_subset(u, &remaining)
        })
        .collect()
}

/// Test scores after adding the points of `order` one at a time.
pub fn forward_selection<M: SupervisedModel>(u: &Utility<M>, order: &[usize]) -> Vec<f64> {
    (1..=order.len())
        .map(|k| score_subset(u, &order[..k]))
        .collect()
}

/// Curves of [`compute_fb_scores`], one entry per valuation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FbScores {
    pub backward: Vec<Vec<f64>>,
    pub backward_reversed: Vec<Vec<f64>>,
    pub backward_random: Vec<Vec<f64>>,
    pub forward: Vec<Vec<f64>>,
    pub forward_reversed: Vec<Vec<f64>>,
    pub forward_random: Vec<Vec<f64>>,
    pub num_points: usize,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Backward,
    Forward,
}

#[derive(Debug, Clone, Copy)]
enum Order {
    ByValue,
    Reversed,
    Random,
}

/// Backward and forward curves for every result, in value order, reversed
/// order and a random order, computed on `n_jobs` threads (`0` uses all CPUs).
///
/// Each result is traversed in its current order, so sort it first, e.g.
/// `result.sort(true, SortKey::Value)` to start with the most valuable point.
pub fn compute_fb_scores<M: SupervisedModel>(
    u: &Utility<M>,
    results: &[ValuationResult],
    n_jobs: usize,
    seed: u64,
) -> Result<FbScores, ValuationError> {
    let directions = [Direction::Backward, Direction::Forward];
    let orderings = [Order::ByValue, Order::Reversed, Order::Random];
    let mut tasks = Vec::with_capacity(6 * results.len());
    for direction in directions {
        for ordering in orderings {
            for run in 0..results.len() {
                tasks.push((direction, ordering, run));
            }
        }
    }
    debug!(n_runs = results.len(), n_tasks = tasks.len(), "computing fb scores");

    let tasks: Vec<_> = tasks.into_iter().enumerate().collect();
    let curves = run_with_threads(n_jobs, |par| {
        par.maybe_par_map(tasks, |(task_id, (direction, ordering, run))| {
            let mut order = results[run].indices();
            match ordering {
                Order::ByValue => {}
                Order::Reversed => order.reverse(),
                Order::Random => {
                    let mut rng =
                        Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(task_id as u64));
                    order.shuffle(&mut rng);
                }
            }
            match direction {
                Direction::Backward => backward_elimination(u, &order),
                Direction::Forward => forward_selection(u, &order),
            }
        })
    })?;

    let mut groups = curves.chunks(results.len().max(1)).map(<[Vec<f64>]>::to_vec);
    let mut next = || groups.next().unwrap_or_default();
    Ok(FbScores {
        backward: next(),
        backward_reversed: next(),
        backward_random: next(),
        forward: next(),
        forward_reversed: next(),
        forward_random: next(),
        num_points: u.len(),
    })
}
