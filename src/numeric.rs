//! Numeric helpers: subset enumeration and sampling, running moments,
//! combinatorics, sample-size bounds and rank statistics.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::ValuationError;

// =============================================================================
// Subsets
// =============================================================================

/// Iterator over every subset of a set of indices.
///
/// Subsets are produced in bitmask order starting from the empty set.
/// Created by [`powerset`].
#[derive(Debug, Clone)]
pub struct Powerset<'a> {
    indices: &'a [usize],
    mask: u64,
    end: u64,
}

impl Iterator for Powerset<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.mask >= self.end {
            return None;
        }
        let subset = self
            .indices
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.mask & (1u64 << bit) != 0)
            .map(|(_, &idx)| idx)
            .collect();
        self.mask += 1;
        Some(subset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = (self.end - self.mask) as usize;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for Powerset<'_> {}

/// All `2^n` subsets of `indices`.
///
/// # Panics
///
/// Panics if `indices` has 64 or more elements.
pub fn powerset(indices: &[usize]) -> Powerset<'_> {
    assert!(indices.len() < 64, "powerset of {} elements", indices.len());
    Powerset {
        indices,
        mask: 0,
        end: 1u64 << indices.len(),
    }
}

/// Sample a subset where each element is included independently with probability `q`.
pub fn random_subset<R: Rng + ?Sized>(indices: &[usize], q: f64, rng: &mut R) -> Vec<usize> {
    indices
        .iter()
        .copied()
        .filter(|_| rng.gen::<f64>() < q)
        .collect()
}

/// Infinite stream of random subsets with inclusion probability `q`.
///
/// With `q = 0.5` this is the uniform distribution over the powerset.
pub fn random_powerset<'a, R: Rng + ?Sized>(
    indices: &'a [usize],
    q: f64,
    rng: &'a mut R,
) -> impl Iterator<Item = Vec<usize>> + 'a {
    std::iter::repeat_with(move || random_subset(indices, q, rng))
}

/// Sample a subset of exactly `size` distinct elements.
pub fn random_subset_of_size<R: Rng + ?Sized>(
    indices: &[usize],
    size: usize,
    rng: &mut R,
) -> Result<Vec<usize>, ValuationError> {
    if size > indices.len() {
        return Err(ValuationError::InvalidArgument(format!(
            "cannot sample {size} elements from a set of {}",
            indices.len()
        )));
    }
    Ok(indices.choose_multiple(rng, size).copied().collect())
}

// =============================================================================
// Running Moments
// =============================================================================

/// Update a running mean and (population) variance with one new value.
///
/// Returns `(new_mean, new_variance)` after `count + 1` observations.
#[inline]
pub fn running_moments(prev_mean: f64, prev_var: f64, count: usize, new_value: f64) -> (f64, f64) {
    let n = count as f64 + 1.0;
    let mean = prev_mean + (new_value - prev_mean) / n;
    let var = prev_var + ((new_value - prev_mean) * (new_value - mean) - prev_var) / n;
    (mean, var)
}

// =============================================================================
// Combinatorics
// =============================================================================

/// `n!` as a float.
pub fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

/// Binomial coefficient `C(n, k)` as a float. Zero when `k > n`.
pub fn binomial(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    let k = k.min(n - k);
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

// =============================================================================
// Sample-size Bounds
// =============================================================================

/// Number of permutations needed for an `(eps, delta)` approximation of every
/// Shapley value, for utilities with range `u_range`.
pub fn num_samples_permutation_hoeffding(eps: f64, delta: f64, u_range: f64) -> usize {
    ((2.0 / delta).ln() * 2.0 * u_range.powi(2) / eps.powi(2)).ceil() as usize
}

/// Lower bound on the number of samples for an `(eps, delta)` estimate of a
/// mean of variables bounded within `score_range`.
pub fn lower_bound_hoeffding(delta: f64, eps: f64, score_range: f64) -> usize {
    (score_range.powi(2) * (2.0 / delta).ln() / (2.0 * eps.powi(2))).ceil() as usize
}

// =============================================================================
// Rank Statistics
// =============================================================================

/// Fractional ranks (1-based), ties receive the average of their positions.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Pearson correlation. `NaN` if either input is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    assert_eq!(a.len(), b.len());
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// Spearman rank correlation of two equally long sequences.
pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    pearson(&ranks(a), &ranks(b))
}

/// Fraction of the `k` highest entries of `expected` that are also among the
/// `k` highest entries of `estimated`.
pub fn top_k_value_accuracy(expected: &[f64], estimated: &[f64], k: usize) -> f64 {
    let top = |values: &[f64]| {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        order.truncate(k);
        order
    };
    let top_expected = top(expected);
    let top_estimated = top(estimated);
    let hits = top_expected
        .iter()
        .filter(|i| top_estimated.contains(i))
        .count();
    hits as f64 / k.max(1) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use rstest::rstest;

    #[test]
    fn test_powerset_enumerates_all_subsets() {
        let sets: Vec<_> = powerset(&[3, 5, 7]).collect();
        assert_eq!(sets.len(), 8);
        assert_eq!(sets[0], Vec::<usize>::new());
        assert!(sets.contains(&vec![3, 7]));
        assert_eq!(sets[7], vec![3, 5, 7]);
    }

    #[test]
    fn test_powerset_empty() {
        let sets: Vec<_> = powerset(&[]).collect();
        assert_eq!(sets, vec![Vec::<usize>::new()]);
    }

    #[test]
    fn test_random_subset_extremes() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let idx: Vec<usize> = (0..10).collect();
        assert!(random_subset(&idx, 0.0, &mut rng).is_empty());
        assert_eq!(random_subset(&idx, 1.0, &mut rng), idx);
    }

    #[test]
    fn test_random_powerset_mean_size() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let idx: Vec<usize> = (0..20).collect();
        let n_samples = 2000;
        let total: usize = random_powerset(&idx, 0.5, &mut rng)
            .take(n_samples)
            .map(|s| s.len())
            .sum();
        let mean = total as f64 / n_samples as f64;
        assert_abs_diff_eq!(mean, 10.0, epsilon = 0.5);
    }

    #[test]
    fn test_random_subset_of_size() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let idx: Vec<usize> = (0..10).collect();
        let s = random_subset_of_size(&idx, 4, &mut rng).unwrap();
        assert_eq!(s.len(), 4);
        assert!(random_subset_of_size(&idx, 11, &mut rng).is_err());
    }

    #[rstest]
    #[case(5, 0, 1.0)]
    #[case(5, 2, 10.0)]
    #[case(10, 5, 252.0)]
    #[case(3, 4, 0.0)]
    fn test_binomial(#[case] n: usize, #[case] k: usize, #[case] expected: f64) {
        assert_abs_diff_eq!(binomial(n, k), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0), 1.0);
        assert_eq!(factorial(5), 120.0);
    }

    #[test]
    fn test_spearman_perfect_and_inverse() {
        let a = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(spearman(&a, &[10.0, 20.0, 30.0, 40.0]), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spearman(&a, &[4.0, 3.0, 2.0, 1.0]), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_top_k_value_accuracy() {
        let expected = [0.1, 0.5, 0.9, 0.3];
        let estimated = [0.2, 0.8, 0.7, 0.1];
        assert_abs_diff_eq!(top_k_value_accuracy(&expected, &estimated, 2), 1.0);
        assert_abs_diff_eq!(top_k_value_accuracy(&expected, &estimated, 1), 0.0);
    }

    #[test]
    fn test_hoeffding_bounds_monotone_in_eps() {
        let loose = num_samples_permutation_hoeffding(0.1, 0.05, 1.0);
        let tight = num_samples_permutation_hoeffding(0.01, 0.05, 1.0);
        assert!(tight > loose);
        assert!(lower_bound_hoeffding(0.05, 0.01, 1.0) > lower_bound_hoeffding(0.05, 0.1, 1.0));
    }

    proptest! {
        #[test]
        fn prop_running_moments_match_batch(values in prop::collection::vec(-100.0f64..100.0, 1..50)) {
            let mut mean = 0.0;
            let mut var = 0.0;
            for (count, &v) in values.iter().enumerate() {
                (mean, var) = running_moments(mean, var, count, v);
            }
            let n = values.len() as f64;
            let batch_mean = values.iter().sum::<f64>() / n;
            let batch_var = values.iter().map(|v| (v - batch_mean).powi(2)).sum::<f64>() / n;
            prop_assert!((mean - batch_mean).abs() < 1e-8);
            prop_assert!((var - batch_var).abs() < 1e-6);
        }
    }
}
