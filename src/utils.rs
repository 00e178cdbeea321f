//! Common utilities used across the crate.
//!
//! This module provides parallelism configuration and thread pool helpers
//! shared by the valuation algorithms and the reporting layer.

use rayon::prelude::*;

use crate::error::{ConfigError, ValuationError};

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Algorithms receive this flag from [`run_with_threads`] and pick parallel or
/// sequential iteration accordingly. They never manage thread pools themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }

    /// Fallible parallel map; the first error aborts the collection.
    #[inline]
    pub fn maybe_par_try_map<T, B, E, I, F>(self, iter: I, f: F) -> Result<Vec<B>, E>
    where
        T: Send,
        B: Send,
        E: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> Result<B, E> + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use all available cores)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// # Example
///
/// ```
/// use datavalue::utils::run_with_threads;
///
/// let total = run_with_threads(2, |par| par.maybe_par_map(0..10usize, |i| i * 2))
///     .unwrap()
///     .into_iter()
///     .sum::<usize>();
/// assert_eq!(total, 90);
/// ```
pub fn run_with_threads<T: Send>(
    n_threads: usize,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T, ValuationError> {
    if n_threads == 1 {
        return Ok(f(Parallelism::Sequential));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build()
        .map_err(|e| ValuationError::Parallel(e.to_string()))?;
    let parallelism = if pool.current_num_threads() > 1 {
        Parallelism::Parallel
    } else {
        Parallelism::Sequential
    };
    Ok(pool.install(|| f(parallelism)))
}

/// Number of CPUs available to this process.
pub fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve a user-facing job count into a concrete number of workers.
///
/// Negative values mean "all available CPUs"; zero is rejected.
pub fn effective_n_jobs(n_jobs: i64) -> Result<usize, ConfigError> {
    match n_jobs {
        0 => Err(ConfigError::ZeroJobs),
        n if n < 0 => Ok(available_cpus()),
        n => Ok(n as usize),
    }
}

/// Resolve a thread count where `0` means auto.
#[inline]
pub(crate) fn resolve_threads(n_threads: usize) -> usize {
    if n_threads == 0 {
        available_cpus()
    } else {
        n_threads
    }
}
