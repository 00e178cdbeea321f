//! Exact least core over the full powerset.

use super::{LeastCoreProblem, MAX_EXACT_LEAST_CORE};
use crate::error::ValuationError;
use crate::model::SupervisedModel;
use crate::numeric::powerset;
use crate::progress::{ValuationLogger, Verbosity};
use crate::utility::Utility;
use crate::utils::run_with_threads;
use crate::value::shapley::ensure_nonempty;
use crate::value::ValuationResult;

/// Least core values using every subset of the data as a constraint.
///
/// Utilities are evaluated on `n_jobs` threads (`0` uses all CPUs). If the
/// linear program has no solution the values are NaN and the status is
/// `Failed`.
///
/// # Errors
///
/// [`ValuationError::TooManyIndices`] for more than 12 data points.
pub fn exact_least_core<M: SupervisedModel>(
    u: &Utility<M>,
    n_jobs: usize,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "exact_least_core";

    let n = u.len();
    if n > MAX_EXACT_LEAST_CORE {
        return Err(ValuationError::TooManyIndices {
            algorithm: ALGORITHM,
            n,
            max: MAX_EXACT_LEAST_CORE,
        });
    }
    ensure_nonempty(u)?;

    let indices = u.indices();
    let logger = ValuationLogger::new(verbosity, ALGORITHM, Some(1u64 << n));
    let subsets: Vec<Vec<usize>> = powerset(&indices).collect();
    let coalitions = run_with_threads(n_jobs, |par| {
        par.maybe_par_try_map(subsets, |subset| {
            let utility = u.evaluate(&subset)?;
            logger.inc(1);
            Ok::<_, ValuationError>((subset, utility))
        })
    })??;

    let problem = LeastCoreProblem {
        n,
        total: u.total()?,
        empty: u.evaluate(&[])?,
        coalitions,
    };
    logger.step("solving linear program");
    let result = problem.solve(ALGORITHM, u.data().data_names().to_vec(), 0.0)?;
    logger.finish(&result);
    Ok(result)
}
