//! Owen sampling of Shapley values.
//!
//! The Shapley value of `i` equals the integral over `q ∈ [0, 1]` of the
//! expected marginal `u(S ∪ {i}) - u(S)`, where `S` contains every other
//! point independently with probability `q` (the multilinear extension of
//! the utility). The outer integral uses the trapezoidal rule on `max_q`
//! points and the inner expectation uses `n_iterations` samples.

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{data_names, ensure_nonempty, resolve_seed};
use crate::error::{ConfigError, ValuationError};
use crate::model::SupervisedModel;
use crate::numeric::random_subset;
use crate::parallel::MapReduceJob;
use crate::progress::{ValuationLogger, Verbosity};
use crate::utility::Utility;
use crate::value::{Status, ValuationResult};

/// Variant of Owen sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwenAlgorithm {
    /// Integrate `q` over `[0, 1]`.
    #[default]
    Standard,
    /// Integrate `q` over `[0, 1/2]`, pairing every sample with its complement.
    Antithetic,
}

impl OwenAlgorithm {
    fn q_stop(self) -> f64 {
        match self {
            OwenAlgorithm::Standard => 1.0,
            OwenAlgorithm::Antithetic => 0.5,
        }
    }
}

impl fmt::Display for OwenAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OwenAlgorithm::Standard => "standard",
            OwenAlgorithm::Antithetic => "antithetic",
        })
    }
}

impl FromStr for OwenAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(OwenAlgorithm::Standard),
            "antithetic" | "halved" => Ok(OwenAlgorithm::Antithetic),
            other => Err(ConfigError::UnknownName {
                kind: "owen algorithm",
                name: other.to_string(),
            }),
        }
    }
}

/// Owen sampling estimate of the Shapley values.
///
/// `n_iterations` subsets are sampled at each of `max_q` evenly spaced
/// values of `q`. Indices are split across `n_jobs` jobs.
///
/// # Errors
///
/// Fails if `n_iterations` is zero or `max_q < 2`.
pub fn owen_sampling_shapley<M: SupervisedModel>(
    u: &Utility<M>,
    n_iterations: usize,
    max_q: usize,
    method: OwenAlgorithm,
    n_jobs: usize,
    seed: Option<u64>,
    verbosity: Verbosity,
) -> Result<ValuationResult, ValuationError> {
    if n_iterations == 0 {
        return Err(ConfigError::NonPositiveCount {
            field: "n_iterations",
            value: n_iterations,
        }
        .into());
    }
    if max_q < 2 {
        return Err(ConfigError::TooSmall {
            field: "max_q",
            value: max_q,
            min: 2,
        }
        .into());
    }
    ensure_nonempty(u)?;

    let algorithm = format!("owen_sampling_shapley_{method}");
    if method == OwenAlgorithm::Antithetic {
        warn!("antithetic Owen sampling has high variance for small n_iterations");
    }
    let seed = resolve_seed(seed);
    let logger = ValuationLogger::new(verbosity, &algorithm, Some(u.len() as u64));
    let all = u.indices();
    let names = data_names(u);
    let q_stop = method.q_stop();
    let q_steps: Vec<f64> = (0..max_q)
        .map(|j| q_stop * j as f64 / (max_q - 1) as f64)
        .collect();

    let job = MapReduceJob::new(
        all.clone(),
        |chunk: &[usize], job_id| {
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed.wrapping_add(job_id as u64));
            let chunk_names = chunk.iter().map(|&i| names[i].clone()).collect();
            let mut result = ValuationResult::zeros(algorithm.as_str(), chunk.to_vec(), chunk_names)?;

            for &i in chunk {
                let others: Vec<usize> = all.iter().copied().filter(|&j| j != i).collect();
                let mut e = vec![0.0; max_q];
                for (j, &q) in q_steps.iter().enumerate() {
                    for _ in 0..n_iterations {
                        let subset = random_subset(&others, q, &mut rng);
                        let mut marginal = marginal_of(u, i, &subset)?;
                        if method == OwenAlgorithm::Antithetic && q != 0.5 {
                            let complement: Vec<usize> = others
                                .iter()
                                .copied()
                                .filter(|k| !subset.contains(k))
                                .collect();
                            marginal = (marginal + marginal_of(u, i, &complement)?) / 2.0;
                        }
                        e[j] += marginal;
                    }
                    e[j] /= n_iterations as f64;
                }
                // Trapezoids of width q_stop / (max_q - 1). The antithetic
                // integral over [0, 1/2] counts twice, which cancels q_stop.
                let value =
                    e.windows(2).map(|w| w[0] + w[1]).sum::<f64>() / (2 * (max_q - 1)) as f64;
                result.update(i, value)?;
                logger.inc(1);
            }
            Ok(result)
        },
        |parts: Vec<ValuationResult>| {
            parts
                .iter()
                .try_fold(ValuationResult::empty(algorithm.as_str()), |acc, r| acc.merge(r))
        },
    )
    .n_jobs(n_jobs);

    let mut result = job
        .run()?
        .pop()
        .unwrap_or_else(|| ValuationResult::empty(algorithm.as_str()));
    result.set_status(Status::Converged);
    logger.finish(&result);
    Ok(result)
}

fn marginal_of<M: SupervisedModel>(
    u: &Utility<M>,
    i: usize,
    subset: &[usize],
) -> Result<f64, ValuationError> {
    let mut with_i = subset.to_vec();
    with_i.push(i);
    Ok(u.evaluate(&with_i)? - u.evaluate(subset)?)
}
