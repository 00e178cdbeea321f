//! Memoization of expensive evaluations.
//!
//! Utility evaluations are pure functions of the subset of indices they are
//! given, so their results can be cached across calls and across workers.
//! A [`Memoizer`] pairs a [`CacheBackend`] with a [`CacheConfig`]:
//!
//! - Keys are blake3 hashes of a caller-provided signature plus the arguments
//!   fed to the [`CacheKeyBuilder`]. Arguments that should not influence
//!   caching are simply left out of the key.
//! - Only calls that take at least `time_threshold` are stored, since caching
//!   fast calls costs more than recomputing them.
//! - With `allow_repeated_evaluations`, stochastic functions are re-evaluated
//!   and averaged until the standard error of the running mean falls below
//!   `rtol_stderr` times the mean, and at least `min_repetitions` values were seen.

mod key;
mod memory;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bon::Builder;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use key::{CacheKey, CacheKeyBuilder};
pub use memory::InMemoryCache;

use crate::numeric::running_moments;

// =============================================================================
// Configuration
// =============================================================================

/// How results are admitted to and served from a cache.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Minimum evaluation time for a result to be cached. Default: 300ms.
    #[builder(default = Duration::from_millis(300))]
    pub time_threshold: Duration,

    /// Average repeated evaluations of the same arguments. Default: false.
    #[builder(default)]
    pub allow_repeated_evaluations: bool,

    /// Relative tolerance on the standard error of repeated evaluations. Default: 0.1.
    #[builder(default = 0.1)]
    pub rtol_stderr: f64,

    /// Minimum number of evaluations before a repeated value is settled. Default: 3.
    #[builder(default = 3)]
    pub min_repetitions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

// =============================================================================
// Backend
// =============================================================================

/// A cached value with running statistics over repeated evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: f64,
    pub variance: f64,
    pub count: usize,
}

impl CacheEntry {
    pub fn single(value: f64) -> Self {
        Self {
            value,
            variance: 0.0,
            count: 1,
        }
    }

    /// Fold one more evaluation into the running mean and variance.
    pub fn update(self, value: f64) -> Self {
        let (mean, variance) = running_moments(self.value, self.variance, self.count, value);
        Self {
            value: mean,
            variance,
            count: self.count + 1,
        }
    }

    fn is_settled(&self, config: &CacheConfig) -> bool {
        let stderr = (self.variance / self.count.max(1) as f64).sqrt();
        self.count >= config.min_repetitions && stderr <= config.rtol_stderr * self.value.abs()
    }
}

/// Hit, miss and insertion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

/// Storage for memoized values.
pub trait CacheBackend: Send + Sync + fmt::Debug {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    fn set(&self, key: CacheKey, entry: CacheEntry);

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}

// =============================================================================
// Memoizer
// =============================================================================

/// Applies a [`CacheConfig`] policy on top of a shared [`CacheBackend`].
#[derive(Debug, Clone)]
pub struct Memoizer {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl Memoizer {
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    /// Memoizer over a fresh [`InMemoryCache`].
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(InMemoryCache::new()), config)
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.backend.stats()
    }

    /// Serve `key` from the cache or evaluate `compute`.
    ///
    /// Errors from `compute` are returned and never cached.
    pub fn try_get_or_compute<E>(
        &self,
        key: CacheKey,
        mut compute: impl FnMut() -> Result<f64, E>,
    ) -> Result<f64, E> {
        if let Some(entry) = self.backend.get(&key) {
            if !self.config.allow_repeated_evaluations || entry.is_settled(&self.config) {
                return Ok(entry.value);
            }
            let updated = entry.update(compute()?);
            self.backend.set(key, updated);
            return Ok(updated.value);
        }

        let start = Instant::now();
        let value = compute()?;
        let elapsed = start.elapsed();
        if elapsed >= self.config.time_threshold {
            debug!(?key, ?elapsed, "caching evaluation");
            self.backend.set(key, CacheEntry::single(value));
        }
        Ok(value)
    }
}

/// A function over index sets whose results go through a [`Memoizer`].
///
/// # Example
///
/// ```
/// use datavalue::cache::{memoized, CacheConfig, Memoizer};
/// use std::time::Duration;
///
/// let config = CacheConfig::builder().time_threshold(Duration::ZERO).build();
/// let f = memoized(b"sum", Memoizer::in_memory(config), |s: &[usize]| s.iter().sum::<usize>() as f64);
/// assert_eq!(f.call(&[1, 2]), 3.0);
/// assert_eq!(f.call(&[2, 1]), 3.0);
/// assert_eq!(f.memoizer().stats().hits, 1);
/// ```
pub struct Memoized<F> {
    fun: F,
    signature: Vec<u8>,
    memoizer: Memoizer,
}

/// Wrap `fun` so that calls are cached under `signature`.
pub fn memoized<F>(signature: &[u8], memoizer: Memoizer, fun: F) -> Memoized<F>
where
    F: Fn(&[usize]) -> f64,
{
    Memoized {
        fun,
        signature: signature.to_vec(),
        memoizer,
    }
}

impl<F: Fn(&[usize]) -> f64> Memoized<F> {
    pub fn call(&self, indices: &[usize]) -> f64 {
        let key = CacheKey::builder(&self.signature).indices(indices).finish();
        let result: Result<f64, std::convert::Infallible> =
            self.memoizer.try_get_or_compute(key, || Ok((self.fun)(indices)));
        match result {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    pub fn memoizer(&self) -> &Memoizer {
        &self.memoizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant_config() -> CacheConfig {
        CacheConfig::builder().time_threshold(Duration::ZERO).build()
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.time_threshold, Duration::from_millis(300));
        assert!(!config.allow_repeated_evaluations);
        assert_eq!(config.min_repetitions, 3);
    }

    #[test]
    fn test_hit_after_first_evaluation() {
        let calls = Cell::new(0);
        let f = memoized(b"f", Memoizer::in_memory(instant_config()), |s: &[usize]| {
            calls.set(calls.get() + 1);
            s.len() as f64
        });
        assert_eq!(f.call(&[1, 2, 3]), 3.0);
        assert_eq!(f.call(&[3, 2, 1]), 3.0);
        assert_eq!(calls.get(), 1);
        let stats = f.memoizer().stats();
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
    }

    #[test]
    fn test_fast_calls_are_not_cached() {
        let config = CacheConfig::builder()
            .time_threshold(Duration::from_secs(3600))
            .build();
        let calls = Cell::new(0);
        let f = memoized(b"f", Memoizer::in_memory(config), |_: &[usize]| {
            calls.set(calls.get() + 1);
            1.0
        });
        f.call(&[0]);
        f.call(&[0]);
        assert_eq!(calls.get(), 2);
        assert!(f.memoizer().backend().is_empty());
    }

    #[test]
    fn test_repeated_evaluations_are_averaged() {
        let config = CacheConfig::builder()
            .time_threshold(Duration::ZERO)
            .allow_repeated_evaluations(true)
            .min_repetitions(4)
            .rtol_stderr(10.0)
            .build();
        let calls = Cell::new(0.0);
        let f = memoized(b"noisy", Memoizer::in_memory(config), |_: &[usize]| {
            calls.set(calls.get() + 1.0);
            calls.get()
        });
        // Values 1, 2, 3, 4 are averaged, then the entry is settled.
        let last = (0..4).map(|_| f.call(&[0])).last().unwrap();
        assert_eq!(last, 2.5);
        assert_eq!(f.call(&[0]), 2.5);
        assert_eq!(calls.get(), 4.0);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let memo = Memoizer::in_memory(instant_config());
        let key = CacheKey::builder(b"e").finish();
        let res: Result<f64, &str> = memo.try_get_or_compute(key, || Err("boom"));
        assert_eq!(res, Err("boom"));
        assert!(memo.backend().is_empty());
    }
}
