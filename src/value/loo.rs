//! Leave-one-out values.

use tracing::debug;

use super::{Status, ValuationResult};
use crate::error::ValuationError;
use crate::model::SupervisedModel;
use crate::progress::{ValuationLogger, Verbosity};
use crate::utility::Utility;
use crate::utils::run_with_threads;

/// Value of each index as the drop in utility when it is removed:
/// `v_i = u(N) - u(N \ {i})`.
///
/// Needs `n + 1` utility evaluations, parallelised over `n_jobs` threads
/// (`0` uses all CPUs).
pub fn naive_loo<M: SupervisedModel>(
    u: &Utility<M>,
    n_jobs: usize,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "naive_loo";

    let indices = u.indices();
    let logger = ValuationLogger::new(verbosity, ALGORITHM, Some(indices.len() as u64));
    let total = u.total()?;
    debug!(total, n = indices.len(), "computing leave-one-out values");

    let values = run_with_threads(n_jobs, |par| {
        par.maybe_par_try_map(indices.clone(), |i| {
            let rest: Vec<usize> = indices.iter().copied().filter(|&j| j != i).collect();
            let value = total - u.evaluate(&rest)?;
            logger.inc(1);
            Ok::<_, ValuationError>(value)
        })
    })??;

    let result = ValuationResult::from_values(
        ALGORITHM,
        values,
        u.data().data_names().to_vec(),
        Status::Converged,
    )?;
    logger.finish(&result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::data::analytic_utility;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_loo_on_additive_game() {
        let u = analytic_utility(5);
        let result = naive_loo(&u, 1, Verbosity::Silent).unwrap();
        assert_eq!(result.algorithm(), "naive_loo");
        assert_eq!(result.status(), Status::Converged);
        for item in result.iter() {
            assert_abs_diff_eq!(item.value, item.index as f64 / 10.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_loo_parallel_matches_sequential() {
        let u = analytic_utility(6);
        let seq = naive_loo(&u, 1, Verbosity::Silent).unwrap();
        let par = naive_loo(&u, 3, Verbosity::Silent).unwrap();
        assert_eq!(seq.values(), par.values());
    }
}
