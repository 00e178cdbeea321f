//! Error types shared across the crate.
//!
//! Each layer has its own error enum; [`ValuationError`] is the top-level
//! error returned by valuation algorithms and wraps the others.

use crate::data::DatasetError;
use crate::model::ModelError;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors raised while validating configuration and algorithm parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A count parameter must be at least 1.
    #[error("{field} must be at least 1, got {value}")]
    NonPositiveCount { field: &'static str, value: usize },

    /// A count parameter is below the smallest meaningful value.
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        value: usize,
        min: usize,
    },

    /// A parameter must lie in an open interval.
    #[error("{field} must be in ({low}, {high}), got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        low: f64,
        high: f64,
    },

    /// A duration or threshold must be positive.
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    /// `n_jobs = 0` is not a valid number of workers.
    #[error("n_jobs == 0 is not a valid number of jobs")]
    ZeroJobs,

    /// Unknown name for an enum-like option.
    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },
}

// =============================================================================
// ValuationError
// =============================================================================

/// Errors returned by valuation algorithms and the utilities they build on.
#[derive(Debug, thiserror::Error)]
pub enum ValuationError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Exact algorithms refuse datasets whose enumeration would be intractable.
    #[error("{algorithm} is only feasible for at most {max} data points, got {n}")]
    TooManyIndices {
        algorithm: &'static str,
        n: usize,
        max: usize,
    },

    /// An algorithm received an argument outside its domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A data index is not part of a valuation result.
    #[error("index {0} not found in valuation result")]
    UnknownIndex(usize),

    /// Results computed by different algorithms cannot be combined.
    #[error("cannot combine results from algorithms '{left}' and '{right}'")]
    AlgorithmMismatch { left: String, right: String },

    /// Two results disagree on the name of a shared index.
    #[error("data names mismatch for index {index}: '{left}' != '{right}'")]
    NameMismatch {
        index: usize,
        left: String,
        right: String,
    },

    /// KNN Shapley requires a model reporting its number of neighbours.
    #[error("model '{0}' does not expose n_neighbors; KNN Shapley needs a nearest-neighbour model")]
    NotANeighborsModel(String),

    /// A thread pool or worker could not be set up or panicked.
    #[error("parallel execution failed: {0}")]
    Parallel(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience alias for results in this crate.
pub type Result<T, E = ValuationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::OutOfRange {
            field: "rtol",
            value: 2.0,
            low: 0.0,
            high: 1.0,
        };
        assert_eq!(err.to_string(), "rtol must be in (0, 1), got 2");
    }

    #[test]
    fn test_too_many_indices_display() {
        let err = ValuationError::TooManyIndices {
            algorithm: "permutation_exact_shapley",
            n: 12,
            max: 10,
        };
        assert!(err.to_string().contains("at most 10"));
    }

    #[test]
    fn test_from_config_error() {
        let err: ValuationError = ConfigError::ZeroJobs.into();
        assert!(matches!(err, ValuationError::Config(ConfigError::ZeroJobs)));
    }
}
