//! Supervised model contract and reference models.
//!
//! Valuation treats models as black boxes: they are fitted on a subset of the
//! training data and scored on the test set. Anything implementing
//! [`SupervisedModel`] can be plugged into a [`Utility`](crate::utility::Utility).
//!
//! Two reference models ship with the crate:
//!
//! - [`LinearRegression`]: ordinary least squares
//! - [`KNeighborsClassifier`]: majority vote among the `k` nearest neighbours

mod knn;
mod linear;

pub use knn::KNeighborsClassifier;
pub(crate) use knn::squared_distance;
pub use linear::LinearRegression;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::scoring::r2_score;

// =============================================================================
// ModelError
// =============================================================================

/// Errors raised while fitting or evaluating a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("model must be fitted before predicting")]
    NotFitted,

    #[error("expected {expected} features, got {got}")]
    FeatureMismatch { expected: usize, got: usize },

    #[error("normal equations are singular")]
    Singular,

    #[error("{0}")]
    Other(String),
}

// =============================================================================
// SupervisedModel
// =============================================================================

/// Minimal contract for models that can be valued against.
///
/// Models are cloned once per utility evaluation, so `fit` may mutate freely.
pub trait SupervisedModel: Clone + Send + Sync {
    /// Fit the model to features `x` (rows = samples) and targets `y`.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError>;

    /// Predict one target per row of `x`.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError>;

    /// Default score on held-out data. Higher is better.
    ///
    /// The default is the coefficient of determination (R²).
    fn score(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        let pred = self.predict(x)?;
        Ok(r2_score(y, pred.view()))
    }

    /// Human-readable model name, used for logging and cache keys.
    fn name(&self) -> &str;

    /// Feed every hyperparameter that affects `fit` into `hasher`.
    ///
    /// Together with [`name`](Self::name) this identifies the model in cache
    /// keys, so two configurations must never hash alike. The default adds
    /// nothing and suits models without hyperparameters.
    fn hash_params(&self, _hasher: &mut blake3::Hasher) {}

    /// Number of neighbours for nearest-neighbour models; `None` otherwise.
    fn n_neighbors(&self) -> Option<usize> {
        None
    }
}

/// Check that `x` has the number of features the model was fitted with.
pub(crate) fn check_features(expected: usize, x: ArrayView2<'_, f64>) -> Result<(), ModelError> {
    if x.ncols() != expected {
        return Err(ModelError::FeatureMismatch {
            expected,
            got: x.ncols(),
        });
    }
    Ok(())
}
