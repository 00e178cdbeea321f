//! Exact Shapley values for K-nearest-neighbour classifiers.
//!
//! For the utility `u(S) = 1/K Σ_{k ≤ min(K, |S|)} 1[y_{α_k(S)} = y_test]`,
//! where `α_k(S)` is the k-th nearest point of `S` to a test point, the
//! Shapley values have a closed form (Jia et al., 2019). Sorting training
//! points by distance, `α_1` closest and `α_N` farthest:
//!
//! ```text
//! s(α_N) = 1[y_{α_N} = y_test] / max(N, K)
//! s(α_i) = s(α_{i+1}) + (1[y_{α_i} = y_test] - 1[y_{α_{i+1}} = y_test]) / K · min(K, i) / i
//! ```
//!
//! Values are averaged over the test set, so no model is ever fitted.

use super::ensure_len;
use crate::data::Dataset;
use crate::error::{ConfigError, ValuationError};
use crate::model::squared_distance;
use crate::progress::{ValuationLogger, Verbosity};
use crate::value::{Status, ValuationResult};

/// KNN Shapley values of every training point for `k` neighbours.
///
/// The variance of each value is taken across test points.
///
/// # Errors
///
/// Fails if `k == 0` or the dataset is grouped, since the closed form
/// values individual training rows.
pub fn knn_shapley(
    data: &Dataset,
    k: usize,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    const ALGORITHM: &str = "knn_shapley";

    if k == 0 {
        return Err(ConfigError::NonPositiveCount {
            field: "n_neighbors",
            value: k,
        }
        .into());
    }
    if data.is_grouped() {
        return Err(ValuationError::InvalidArgument(
            "KNN Shapley values individual rows and does not support grouped datasets".to_string(),
        ));
    }
    ensure_len(data.len())?;

    let n = data.len();
    let x_train = data.x_train();
    let y_train = data.y_train();
    let logger = ValuationLogger::new(verbosity, ALGORITHM, Some(data.y_test().len() as u64));
    let mut result = ValuationResult::zeros(ALGORITHM, data.indices(), data.data_names().to_vec())?;
    let mut values = vec![0.0; n];

    for (x, &y) in data.x_test().outer_iter().zip(data.y_test().iter()) {
        let mut order: Vec<(f64, usize)> = x_train
            .outer_iter()
            .enumerate()
            .map(|(i, row)| (squared_distance(row, x), i))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let matches = |pos: usize| -> f64 {
            if y_train[order[pos].1] == y {
                1.0
            } else {
                0.0
            }
        };

        // Positions are 0-based here; the recursion is over 1-based ranks.
        values[order[n - 1].1] = matches(n - 1) / n.max(k) as f64;
        for pos in (0..n - 1).rev() {
            let rank = pos + 1;
            values[order[pos].1] = values[order[pos + 1].1]
                + (matches(pos) - matches(pos + 1)) / k as f64 * k.min(rank) as f64
                    / rank as f64;
        }

        for (i, &v) in values.iter().enumerate() {
            result.update(i, v)?;
        }
        logger.inc(1);
    }

    result.set_status(Status::Converged);
    logger.finish(&result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn line() -> Dataset {
        Dataset::new(
            array![[0.0], [1.0], [2.0], [3.0]],
            array![1.0, 1.0, 0.0, 0.0],
            array![[0.1], [2.9]],
            array![1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_values_sum_to_top_k_accuracy() {
        let data = line();
        let k = 2;
        let r = knn_shapley(&data, k, Verbosity::Silent).unwrap();
        // Both test points have two matching nearest neighbours: u(N) = 1.
        assert_abs_diff_eq!(r.values().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_closer_matching_points_are_worth_more() {
        let data = Dataset::new(
            array![[0.0], [1.0], [2.0], [3.0]],
            array![1.0, 0.0, 1.0, 0.0],
            array![[0.1]],
            array![1.0],
        )
        .unwrap();
        let v = knn_shapley(&data, 1, Verbosity::Silent).unwrap().values();
        assert_abs_diff_eq!(v[0], 5.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], -1.0 / 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[2], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[3], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_small_dataset_is_additive() {
        // With N <= K every point contributes 1/K when it matches.
        let data = line();
        let r = knn_shapley(&data, 10, Verbosity::Silent).unwrap();
        for v in r.values() {
            assert_abs_diff_eq!(v, 0.05, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rejects_zero_neighbours_and_groups() {
        let data = line();
        assert!(knn_shapley(&data, 0, Verbosity::Silent).is_err());
        let grouped = line().grouped(&["a", "a", "b", "b"]).unwrap();
        assert!(knn_shapley(&grouped, 1, Verbosity::Silent).is_err());
    }
}
