//! Least core over randomly sampled coalitions.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, warn};

use super::LeastCoreProblem;
use crate::error::ValuationError;
use crate::model::SupervisedModel;
use crate::numeric::random_powerset;
use crate::parallel::MapReduceJob;
use crate::progress::{ValuationLogger, Verbosity};
use crate::utility::Utility;
use crate::utils::resolve_threads;
use crate::value::shapley::{ensure_nonempty, resolve_seed};
use crate::value::ValuationResult;

/// Approximate least core values from `n_iterations` random coalitions.
///
/// Coalitions are drawn uniformly from the powerset, split evenly over
/// `n_jobs` jobs (`0` uses all CPUs), and their constraints relaxed by
/// `epsilon`. More iterations than there are subsets are capped at `2^n`.
/// If the linear program has no solution the values are NaN and the status
/// is `Failed`.
///
/// # Errors
///
/// Fails if `n_iterations` is smaller than the number of data points.
pub fn montecarlo_least_core<M: SupervisedModel>(
    u: &Utility<M>,
    n_iterations: usize,
    epsilon: f64,
    n_jobs: usize,
    seed: Option<u64>,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "montecarlo_least_core";

    ensure_nonempty(u)?;
    let n = u.len();
    if n_iterations < n {
        return Err(ValuationError::InvalidArgument(format!(
            "n_iterations ({n_iterations}) must be at least the number of data points ({n})"
        )));
    }
    let n_iterations = match 1usize.checked_shl(n as u32) {
        Some(n_subsets) if n_iterations > n_subsets => {
            warn!(n_iterations, n_subsets, "more iterations than subsets, capping at 2^{n}");
            n_subsets
        }
        _ => n_iterations,
    };

    let seed = resolve_seed(seed);
    let threads = resolve_threads(n_jobs);
    let indices = u.indices();
    let logger = ValuationLogger::new(verbosity, ALGORITHM, Some(n_iterations as u64));
    debug!(n, n_iterations, threads, seed, "sampling coalitions");

    let job = MapReduceJob::new(
        vec![()],
        |_: &[()], job_id| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(job_id as u64));
            random_powerset(&indices, 0.5, &mut rng)
                .take(samples_for_job(n_iterations, threads, job_id))
                .map(|subset| {
                    let utility = u.evaluate(&subset)?;
                    logger.inc(1);
                    Ok((subset, utility))
                })
                .collect::<Result<Vec<_>, ValuationError>>()
        },
        |parts: Vec<Vec<(Vec<usize>, f64)>>| Ok(parts.concat()),
    )
    .n_jobs(n_jobs)
    .chunkify_inputs(false);

    let coalitions = job.run()?.pop().unwrap_or_default();
    let n_nan = coalitions.iter().filter(|(_, v)| v.is_nan()).count();
    if n_nan > 0 {
        warn!(n_nan, total = coalitions.len(), "utility returned NaN values");
    }

    let problem = LeastCoreProblem {
        n,
        total: u.total()?,
        empty: u.evaluate(&[])?,
        coalitions,
    };
    logger.step("solving linear program");
    let result = problem.solve(ALGORITHM, u.data().data_names().to_vec(), epsilon)?;
    logger.finish(&result);
    Ok(result)
}

/// Share of `total` samples drawn by `job_id`; the first `total % threads`
/// jobs take one extra.
fn samples_for_job(total: usize, threads: usize, job_id: usize) -> usize {
    let threads = threads.max(1);
    total / threads + usize::from(job_id % threads < total % threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::data::analytic_utility;
    use crate::value::least_core::LEAST_CORE_VALUE;
    use crate::value::Status;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_samples_split_covers_total() {
        for (total, threads) in [(10, 3), (9, 3), (2, 4), (7, 1)] {
            let split: Vec<usize> = (0..threads)
                .map(|job| samples_for_job(total, threads, job))
                .collect();
            assert_eq!(split.iter().sum::<usize>(), total, "{total} over {threads}");
        }
        assert_eq!(
            (0..3).map(|job| samples_for_job(10, 3, job)).collect::<Vec<_>>(),
            vec![4, 3, 3]
        );
    }

    #[test]
    fn test_rejects_too_few_iterations() {
        let u = analytic_utility(5);
        let res = montecarlo_least_core(&u, 4, 0.0, 1, Some(0), Verbosity::Silent);
        assert!(matches!(res, Err(ValuationError::InvalidArgument(_))));
    }

    #[test]
    fn test_allocation_is_efficient() {
        let u = analytic_utility(4);
        let r = montecarlo_least_core(&u, 200, 0.01, 2, Some(7), Verbosity::Silent).unwrap();
        assert_eq!(r.algorithm(), "montecarlo_least_core");
        assert_eq!(r.status(), Status::Converged);
        assert_abs_diff_eq!(r.values().iter().sum::<f64>(), u.total().unwrap(), epsilon = 1e-8);
        assert!(r.extra(LEAST_CORE_VALUE).unwrap() >= -1e-9);
    }

    #[test]
    fn test_same_seed_same_values() {
        let u = analytic_utility(4);
        let a = montecarlo_least_core(&u, 16, 0.0, 1, Some(3), Verbosity::Silent).unwrap();
        let b = montecarlo_least_core(&u, 16, 0.0, 1, Some(3), Verbosity::Silent).unwrap();
        assert_eq!(a.values(), b.values());
    }
}
