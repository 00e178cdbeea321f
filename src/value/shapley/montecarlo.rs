//! Monte Carlo approximations of Shapley values.
//!
//! - [`permutation_montecarlo_shapley`]: sample permutations and average the
//!   marginal contribution of each point, in independent jobs.
//! - [`truncated_montecarlo_shapley`]: the same sampling with workers streaming
//!   batches into a shared [`Coordinator`] that checks convergence globally.
//! - [`combinatorial_montecarlo_shapley`]: sample subsets of `N \ {i}`
//!   uniformly and reweight by the combinatorial Shapley coefficient.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, warn};

use super::truncation::TruncationPolicy;
use super::{data_names, ensure_nonempty, resolve_seed};
use crate::error::ValuationError;
use crate::model::SupervisedModel;
use crate::numeric::{binomial, random_subset};
use crate::parallel::{Coordinator, MapReduceJob};
use crate::progress::{ValuationLogger, Verbosity};
use crate::utility::Utility;
use crate::utils::resolve_threads;
use crate::value::stopping::StoppingCriterion;
use crate::value::ValuationResult;

// =============================================================================
// Permutations
// =============================================================================

/// Marginal contributions along one random permutation.
///
/// Once `truncation` fires, the remaining points get a zero marginal
/// without evaluating the utility.
fn permutation_marginals<M: SupervisedModel, R: Rng>(
    u: &Utility<M>,
    indices: &[usize],
    truncation: &dyn TruncationPolicy,
    total: f64,
    rng: &mut R,
) -> Result<Vec<(usize, f64)>, ValuationError> {
    let mut permutation = indices.to_vec();
    permutation.shuffle(rng);

    let n = permutation.len();
    let mut marginals = Vec::with_capacity(n);
    let mut prev = u.evaluate(&[])?;
    let mut truncated = false;
    for k in 0..n {
        let score = if truncated {
            prev
        } else {
            u.evaluate(&permutation[..=k])?
        };
        marginals.push((permutation[k], score - prev));
        prev = score;
        if !truncated && truncation.should_truncate(k + 1, n, score, total) {
            truncated = true;
        }
    }
    Ok(marginals)
}

fn total_for<M: SupervisedModel>(
    u: &Utility<M>,
    truncation: &dyn TruncationPolicy,
) -> Result<f64, ValuationError> {
    if truncation.needs_total() {
        u.total()
    } else {
        Ok(f64::NAN)
    }
}

fn merge_all(algorithm: &str, parts: &[ValuationResult]) -> Result<ValuationResult, ValuationError> {
    parts
        .iter()
        .try_fold(ValuationResult::empty(algorithm), |acc, r| acc.merge(r))
}

/// Shapley values from independently sampled permutations.
///
/// Each of `n_jobs` jobs samples permutations until its own copy of `done`
/// is satisfied; the job results are then merged. `truncation` may cut
/// permutations short.
pub fn permutation_montecarlo_shapley<M: SupervisedModel>(
    u: &Utility<M>,
    done: &dyn StoppingCriterion,
    truncation: &dyn TruncationPolicy,
    n_jobs: usize,
    seed: Option<u64>,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "permutation_montecarlo_shapley";

    ensure_nonempty(u)?;
    let seed = resolve_seed(seed);
    let logger = ValuationLogger::new(verbosity, ALGORITHM, None);
    let indices = u.indices();
    let names = data_names(u);
    let total = total_for(u, truncation)?;
    debug!(n = indices.len(), seed, truncation = truncation.name(), "sampling permutations");

    let job = MapReduceJob::new(
        vec![()],
        |_: &[()], job_id| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(job_id as u64));
            let mut done = done.box_clone();
            let mut result = ValuationResult::zeros(ALGORITHM, indices.clone(), names.clone())?;
            while !done.evaluate(&mut result).is_done() {
                for (idx, marginal) in permutation_marginals(u, &indices, truncation, total, &mut rng)? {
                    result.update(idx, marginal)?;
                }
                logger.set_completion(done.completion());
            }
            Ok(result)
        },
        |parts: Vec<ValuationResult>| merge_all(ALGORITHM, &parts),
    )
    .n_jobs(n_jobs)
    .chunkify_inputs(false);

    let result = job
        .run()?
        .pop()
        .unwrap_or_else(|| ValuationResult::empty(ALGORITHM));
    logger.finish(&result);
    Ok(result)
}

/// Truncated Monte Carlo Shapley.
///
/// `n_jobs` workers (`0` uses all CPUs) sample permutations on scoped
/// threads and report to a shared coordinator every `update_period`
/// permutations. The coordinator merges the reports, checks `done` on the
/// accumulated result and stops all workers once it is satisfied.
/// Permutations producing NaN marginals are discarded.
pub fn truncated_montecarlo_shapley<M: SupervisedModel>(
    u: &Utility<M>,
    done: &dyn StoppingCriterion,
    truncation: &dyn TruncationPolicy,
    n_jobs: usize,
    update_period: usize,
    seed: Option<u64>,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "truncated_montecarlo_shapley";

    ensure_nonempty(u)?;
    let seed = resolve_seed(seed);
    let n_workers = resolve_threads(n_jobs);
    let update_period = update_period.max(1);
    let logger = ValuationLogger::new(verbosity, ALGORITHM, None);
    let indices = u.indices();
    let names = data_names(u);
    let total = total_for(u, truncation)?;
    debug!(n = indices.len(), n_workers, update_period, seed, "starting truncated montecarlo");

    let coordinator = Coordinator::new(ValuationResult::empty(ALGORITHM), done.box_clone());
    coordinator.run_workers(n_workers, |worker_id, coord| {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(worker_id as u64));
        while !coord.is_done() {
            let mut batch = ValuationResult::zeros(ALGORITHM, indices.clone(), names.clone())?;
            let mut n_permutations = 0;
            while n_permutations < update_period && !coord.is_done() {
                let marginals = permutation_marginals(u, &indices, truncation, total, &mut rng)?;
                if marginals.iter().any(|(_, m)| m.is_nan()) {
                    warn!(worker_id, "NaN marginal in permutation, discarding it");
                    continue;
                }
                for (idx, marginal) in marginals {
                    batch.update(idx, marginal)?;
                }
                n_permutations += 1;
            }
            if n_permutations > 0 {
                coord.submit(&batch)?;
                logger.set_completion(coord.completion());
            }
        }
        Ok(())
    })?;

    let mut result = coordinator.into_result();
    if result.is_empty() {
        result = ValuationResult::zeros(ALGORITHM, indices, names)?;
    }
    logger.finish(&result);
    Ok(result)
}

// =============================================================================
// Subsets
// =============================================================================

/// One job of [`combinatorial_montecarlo_shapley`]: values for `indices`.
fn combinatorial_montecarlo_job<M: SupervisedModel, R: Rng>(
    u: &Utility<M>,
    indices: &[usize],
    names: &[String],
    done: &dyn StoppingCriterion,
    rng: &mut R,
    logger: &ValuationLogger,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "combinatorial_montecarlo_shapley";

    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != indices.len() {
        return Err(ValuationError::InvalidArgument(
            "repeated indices passed".to_string(),
        ));
    }

    let all = u.indices();
    let n = all.len();
    // Sampling uniformly from the powerset of n - 1 elements gives each
    // subset mass 2^-(n-1); the extra 1/n is the Shapley normalisation.
    let correction = 2f64.powi(n as i32 - 1) / n as f64;

    let chunk_names = indices.iter().map(|&i| names[i].clone()).collect();
    let mut result = ValuationResult::zeros(ALGORITHM, indices.to_vec(), chunk_names)?;
    let mut done = done.box_clone();
    let mut cycle = indices.iter().cycle();
    while !done.evaluate(&mut result).is_done() {
        let Some(&idx) = cycle.next() else { break };
        let others: Vec<usize> = all.iter().copied().filter(|&j| j != idx).collect();
        let subset = random_subset(&others, 0.5, rng);
        let mut with_idx = subset.clone();
        with_idx.push(idx);
        let marginal =
            (u.evaluate(&with_idx)? - u.evaluate(&subset)?) / binomial(n - 1, subset.len());
        result.update(idx, correction * marginal)?;
        logger.set_completion(done.completion());
    }
    Ok(result)
}

/// Shapley values from uniformly sampled subsets, using the combinatorial
/// definition.
///
/// Indices are split across `n_jobs` jobs, each cycling through its chunk
/// and sampling one subset of `N \ {i}` per step until its copy of `done`
/// is satisfied.
pub fn combinatorial_montecarlo_shapley<M: SupervisedModel>(
    u: &Utility<M>,
    done: &dyn StoppingCriterion,
    n_jobs: usize,
    seed: Option<u64>,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "combinatorial_montecarlo_shapley";

    ensure_nonempty(u)?;
    let seed = resolve_seed(seed);
    let logger = ValuationLogger::new(verbosity, ALGORITHM, None);
    let names = data_names(u);

    let job = MapReduceJob::new(
        u.indices(),
        |chunk: &[usize], job_id| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(job_id as u64));
            combinatorial_montecarlo_job(u, chunk, &names, done, &mut rng, &logger)
        },
        |parts: Vec<ValuationResult>| merge_all(ALGORITHM, &parts),
    )
    .n_jobs(n_jobs);

    let result = job
        .run()?
        .pop()
        .unwrap_or_else(|| ValuationResult::empty(ALGORITHM));
    logger.finish(&result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::data::analytic_utility;
    use crate::value::shapley::truncation::{FixedTruncation, NoTruncation};
    use crate::value::stopping::MaxUpdates;

    #[test]
    fn test_permutation_marginals_sum_to_total() {
        let u = analytic_utility(6);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let marginals = permutation_marginals(&u, &u.indices(), &NoTruncation, f64::NAN, &mut rng).unwrap();
        let sum: f64 = marginals.iter().map(|(_, m)| m).sum();
        approx::assert_abs_diff_eq!(sum, u.total().unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_truncated_permutation_has_zero_tail() {
        let u = analytic_utility(6);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let policy = FixedTruncation::new(0.5).unwrap();
        let marginals = permutation_marginals(&u, &u.indices(), &policy, f64::NAN, &mut rng).unwrap();
        assert!(marginals[3..].iter().all(|&(_, m)| m == 0.0));
    }

    #[test]
    fn test_combinatorial_job_rejects_repeated_indices() {
        let u = analytic_utility(4);
        let names = data_names(&u);
        let done = MaxUpdates::new(1).unwrap();
        let logger = ValuationLogger::silent("test");
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let res = combinatorial_montecarlo_job(&u, &[0, 1, 1], &names, &done, &mut rng, &logger);
        assert!(matches!(res, Err(ValuationError::InvalidArgument(_))));
    }

    #[test]
    fn test_permutation_montecarlo_is_reproducible() {
        let u = analytic_utility(5);
        let done = MaxUpdates::new(20).unwrap();
        let run = || {
            permutation_montecarlo_shapley(&u, &done, &NoTruncation, 2, Some(7), Verbosity::Silent)
                .unwrap()
                .values()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_each_permutation_job_runs_its_own_criterion() {
        let u = analytic_utility(4);
        let done = MaxUpdates::new(10).unwrap();
        let result =
            permutation_montecarlo_shapley(&u, &done, &NoTruncation, 3, Some(0), Verbosity::Silent)
                .unwrap();
        assert!(result.counts().iter().all(|&c| c == 30));
    }
}
