//! Exact Shapley values by enumeration.
//!
//! Both methods need an exponential number of utility evaluations and are
//! meant for small datasets and as ground truth in tests.

use super::{data_names, MAX_COMBINATORIAL_EXACT, MAX_PERMUTATION_EXACT};
use crate::error::ValuationError;
use crate::model::SupervisedModel;
use crate::numeric::{binomial, factorial, powerset};
use crate::parallel::MapReduceJob;
use crate::progress::{ValuationLogger, Verbosity};
use crate::utility::Utility;
use crate::value::{Status, ValuationResult};

/// Call `f` on every permutation of `items` (Heap's algorithm).
fn for_each_permutation<E>(
    items: &mut [usize],
    mut f: impl FnMut(&[usize]) -> Result<(), E>,
) -> Result<(), E> {
    let n = items.len();
    let mut c = vec![0usize; n];
    f(items)?;
    let mut i = 1;
    while i < n {
        if c[i] < i {
            if i % 2 == 0 {
                items.swap(0, i);
            } else {
                items.swap(c[i], i);
            }
            f(items)?;
            c[i] += 1;
            i = 1;
        } else {
            c[i] = 0;
            i += 1;
        }
    }
    Ok(())
}

/// Shapley values as the average marginal contribution over all `n!`
/// permutations.
///
/// # Errors
///
/// [`ValuationError::TooManyIndices`] for more than 10 data points.
pub fn permutation_exact_shapley<M: SupervisedModel>(
    u: &Utility<M>,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "permutation_exact_shapley";

    let n = u.len();
    if n > MAX_PERMUTATION_EXACT {
        return Err(ValuationError::TooManyIndices {
            algorithm: ALGORITHM,
            n,
            max: MAX_PERMUTATION_EXACT,
        });
    }

    let logger = ValuationLogger::new(verbosity, ALGORITHM, Some(factorial(n) as u64));
    let mut indices = u.indices();
    let mut sums = vec![0.0; n];
    let empty = u.evaluate(&[])?;

    for_each_permutation(&mut indices, |perm| {
        let mut prev = empty;
        for k in 0..perm.len() {
            let score = u.evaluate(&perm[..=k])?;
            sums[perm[k]] += score - prev;
            prev = score;
        }
        logger.inc(1);
        Ok::<(), ValuationError>(())
    })?;

    let n_perms = factorial(n);
    let values = sums.into_iter().map(|s| s / n_perms).collect();
    let result = ValuationResult::from_values(ALGORITHM, values, data_names(u), Status::Converged)?;
    logger.finish(&result);
    Ok(result)
}

/// Shapley values from the combinatorial definition
///
/// `v_i = 1/n Σ_{S ⊆ N \ {i}} C(n-1, |S|)^{-1} [u(S ∪ {i}) - u(S)]`.
///
/// Indices are split across `n_jobs` parallel jobs (`0` uses all CPUs).
///
/// # Errors
///
/// [`ValuationError::TooManyIndices`] for more than 20 data points.
pub fn combinatorial_exact_shapley<M: SupervisedModel>(
    u: &Utility<M>,
    n_jobs: usize,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "combinatorial_exact_shapley";

    let n = u.len();
    if n > MAX_COMBINATORIAL_EXACT {
        return Err(ValuationError::TooManyIndices {
            algorithm: ALGORITHM,
            n,
            max: MAX_COMBINATORIAL_EXACT,
        });
    }

    let logger = ValuationLogger::new(verbosity, ALGORITHM, Some(n as u64));
    let all = u.indices();
    let names = data_names(u);

    let job = MapReduceJob::new(
        all.clone(),
        |chunk: &[usize], _job_id| {
            let chunk_names = chunk.iter().map(|&i| names[i].clone()).collect();
            let mut result = ValuationResult::zeros(ALGORITHM, chunk.to_vec(), chunk_names)?;
            for &i in chunk {
                let others: Vec<usize> = all.iter().copied().filter(|&j| j != i).collect();
                let mut value = 0.0;
                for subset in powerset(&others) {
                    let mut with_i = subset.clone();
                    with_i.push(i);
                    let marginal = u.evaluate(&with_i)? - u.evaluate(&subset)?;
                    value += marginal / binomial(n - 1, subset.len());
                }
                result.update(i, value / n as f64)?;
                logger.inc(1);
            }
            Ok(result)
        },
        |parts: Vec<ValuationResult>| {
            parts
                .iter()
                .try_fold(ValuationResult::empty(ALGORITHM), |acc, r| acc.merge(r))
        },
    )
    .n_jobs(n_jobs);

    let mut result = job
        .run()?
        .pop()
        .unwrap_or_else(|| ValuationResult::empty(ALGORITHM));
    result.set_status(Status::Converged);
    logger.finish(&result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_visits_every_permutation_once() {
        let mut items = vec![0, 1, 2, 3];
        let mut seen = std::collections::HashSet::new();
        for_each_permutation(&mut items, |p| {
            assert!(seen.insert(p.to_vec()));
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(seen.len(), 24);
    }

    #[test]
    fn test_heap_empty_input() {
        let mut count = 0;
        for_each_permutation(&mut [], |_| {
            count += 1;
            Ok::<(), ()>(())
        })
        .unwrap();
        assert_eq!(count, 1);
    }
}
