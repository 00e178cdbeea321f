//! Scoring functions for utilities.
//!
//! A scorer turns a fitted model and a test set into a single number where
//! higher is better. Scorers are selected at runtime through the [`Scorer`]
//! enum, either by constructor or by sklearn-style name:
//!
//! - `r2`, `explained_variance`
//! - `neg_mean_squared_error`, `neg_mean_absolute_error`, `neg_median_absolute_error`
//! - `accuracy`
//! - `squashed_r2`, `squashed_variance`: the above mapped into `(0, 1)` with a sigmoid
//!
//! User closures are supported via [`CustomScorer`].

mod classification;
mod regression;

use std::fmt;
use std::sync::Arc;

pub use classification::{accuracy_score, Accuracy};
pub use regression::{
    r2_score, ExplainedVariance, NegMeanAbsoluteError, NegMeanSquaredError,
    NegMedianAbsoluteError, R2,
};

use ndarray::{ArrayView1, ArrayView2};

use crate::error::ConfigError;
use crate::model::{ModelError, SupervisedModel};

// =============================================================================
// ScoreFn
// =============================================================================

/// A score computed from true and predicted targets.
pub trait ScoreFn: Send + Sync {
    fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64;

    fn name(&self) -> &'static str;

    /// Bounds of the attainable scores, used for sample-size estimates.
    fn range(&self) -> (f64, f64) {
        (f64::NEG_INFINITY, f64::INFINITY)
    }
}

// =============================================================================
// Custom Scorer
// =============================================================================

/// Type alias for the custom scorer function.
pub type CustomScoreFn = Arc<dyn Fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64 + Send + Sync>;

/// A user-provided scoring closure.
///
/// # Example
///
/// ```
/// use datavalue::scoring::{CustomScorer, Scorer};
///
/// let max_error = CustomScorer::new("neg_max_error", |y, p| {
///     -y.iter().zip(p.iter()).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max)
/// });
/// let scorer = Scorer::Custom(max_error);
/// assert_eq!(scorer.name(), "neg_max_error");
/// ```
#[derive(Clone)]
pub struct CustomScorer {
    name: String,
    score_fn: CustomScoreFn,
    range: (f64, f64),
}

impl CustomScorer {
    pub fn new(
        name: impl Into<String>,
        score_fn: impl Fn(ArrayView1<'_, f64>, ArrayView1<'_, f64>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            score_fn: Arc::new(score_fn),
            range: (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    /// Declare the range of attainable scores.
    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.range = (low, high);
        self
    }

    pub fn score(&self, y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> f64 {
        (self.score_fn)(y_true, y_pred)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CustomScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomScorer")
            .field("name", &self.name)
            .field("range", &self.range)
            .finish()
    }
}

// =============================================================================
// Scorer
// =============================================================================

/// A dynamically selected scoring function.
#[derive(Debug, Clone, Default)]
pub enum Scorer {
    /// Use the model's own [`SupervisedModel::score`].
    #[default]
    ModelDefault,
    R2(R2),
    NegMeanSquaredError(NegMeanSquaredError),
    NegMeanAbsoluteError(NegMeanAbsoluteError),
    NegMedianAbsoluteError(NegMedianAbsoluteError),
    ExplainedVariance(ExplainedVariance),
    Accuracy(Accuracy),
    Custom(CustomScorer),
    /// Inner score mapped through `1 / (1 + exp(-x))`.
    Squashed(Box<Scorer>),
}

impl Scorer {
    pub fn r2() -> Self {
        Self::R2(R2)
    }

    pub fn neg_mse() -> Self {
        Self::NegMeanSquaredError(NegMeanSquaredError)
    }

    pub fn accuracy() -> Self {
        Self::Accuracy(Accuracy)
    }

    /// R² squashed into `(0, 1)`.
    pub fn squashed_r2() -> Self {
        Self::Squashed(Box::new(Self::r2()))
    }

    /// Explained variance squashed into `(0, 1)`.
    pub fn squashed_variance() -> Self {
        Self::Squashed(Box::new(Self::ExplainedVariance(ExplainedVariance)))
    }

    /// Parse an sklearn-style scorer name.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Ok(match name {
            "default" | "model" => Self::ModelDefault,
            "r2" => Self::r2(),
            "neg_mean_squared_error" => Self::neg_mse(),
            "neg_mean_absolute_error" => Self::NegMeanAbsoluteError(NegMeanAbsoluteError),
            "neg_median_absolute_error" => Self::NegMedianAbsoluteError(NegMedianAbsoluteError),
            "explained_variance" => Self::ExplainedVariance(ExplainedVariance),
            "accuracy" => Self::accuracy(),
            "squashed_r2" => Self::squashed_r2(),
            "squashed_variance" => Self::squashed_variance(),
            other => {
                return Err(ConfigError::UnknownName {
                    kind: "scorer",
                    name: other.to_string(),
                })
            }
        })
    }

    /// Score a fitted model on `(x, y)`.
    pub fn score<M: SupervisedModel>(
        &self,
        model: &M,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<f64, ModelError> {
        match self {
            Self::ModelDefault => model.score(x, y),
            Self::Squashed(inner) => inner.score(model, x, y).map(sigmoid),
            _ => {
                let pred = model.predict(x)?;
                Ok(self.score_predictions(y, pred.view()).unwrap_or(f64::NAN))
            }
        }
    }

    /// Score predictions directly.
    ///
    /// Returns `None` for [`Scorer::ModelDefault`], which needs the model itself.
    pub fn score_predictions(
        &self,
        y_true: ArrayView1<'_, f64>,
        y_pred: ArrayView1<'_, f64>,
    ) -> Option<f64> {
        Some(match self {
            Self::ModelDefault => return None,
            Self::R2(s) => s.score(y_true, y_pred),
            Self::NegMeanSquaredError(s) => s.score(y_true, y_pred),
            Self::NegMeanAbsoluteError(s) => s.score(y_true, y_pred),
            Self::NegMedianAbsoluteError(s) => s.score(y_true, y_pred),
            Self::ExplainedVariance(s) => s.score(y_true, y_pred),
            Self::Accuracy(s) => s.score(y_true, y_pred),
            Self::Custom(s) => s.score(y_true, y_pred),
            Self::Squashed(inner) => sigmoid(inner.score_predictions(y_true, y_pred)?),
        })
    }

    pub fn name(&self) -> String {
        match self {
            Self::ModelDefault => "default".to_string(),
            Self::R2(s) => s.name().to_string(),
            Self::NegMeanSquaredError(s) => s.name().to_string(),
            Self::NegMeanAbsoluteError(s) => s.name().to_string(),
            Self::NegMedianAbsoluteError(s) => s.name().to_string(),
            Self::ExplainedVariance(s) => s.name().to_string(),
            Self::Accuracy(s) => s.name().to_string(),
            Self::Custom(s) => s.name().to_string(),
            Self::Squashed(inner) => match inner.as_ref() {
                Self::ExplainedVariance(_) => "squashed_variance".to_string(),
                other => format!("squashed_{}", other.name()),
            },
        }
    }

    /// Bounds of attainable scores.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::ModelDefault => (f64::NEG_INFINITY, f64::INFINITY),
            Self::R2(s) => s.range(),
            Self::NegMeanSquaredError(s) => s.range(),
            Self::NegMeanAbsoluteError(s) => s.range(),
            Self::NegMedianAbsoluteError(s) => s.range(),
            Self::ExplainedVariance(s) => s.range(),
            Self::Accuracy(s) => s.range(),
            Self::Custom(s) => s.range,
            Self::Squashed(_) => (0.0, 1.0),
        }
    }
}

impl fmt::Display for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[inline]
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
