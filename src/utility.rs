//! Utility: the payoff function of data valuation.
//!
//! A [`Utility`] binds a model, a dataset and a scorer. Evaluating it on a
//! subset `S` of data indices fits a fresh clone of the model on the training
//! units in `S` and scores it on the test set.
//!
//! # Example
//!
//! ```
//! use datavalue::data::Dataset;
//! use datavalue::model::LinearRegression;
//! use datavalue::scoring::Scorer;
//! use datavalue::utility::Utility;
//! use ndarray::array;
//!
//! let data = Dataset::new(
//!     array![[0.0], [1.0], [2.0]],
//!     array![0.0, 2.0, 4.0],
//!     array![[3.0]],
//!     array![6.0],
//! )
//! .unwrap();
//! let u = Utility::builder()
//!     .model(LinearRegression::new())
//!     .data(data)
//!     .scorer(Scorer::neg_mse())
//!     .build();
//!
//! assert_eq!(u.evaluate(&[]).unwrap(), 0.0);
//! assert!(u.evaluate(&[0, 1]).unwrap() > -1e-6);
//! ```

use std::sync::Arc;

use bon::bon;
use tracing::warn;

use crate::cache::{CacheBackend, CacheConfig, CacheKey, CacheStats, Memoizer};
use crate::data::Dataset;
use crate::error::ValuationError;
use crate::model::{ModelError, SupervisedModel};
use crate::scoring::Scorer;

/// Model, data and scorer bundled into a function of index subsets.
///
/// Cloning is cheap for the dataset and the cache, which are shared.
#[derive(Debug, Clone)]
pub struct Utility<M> {
    model: M,
    data: Arc<Dataset>,
    scorer: Scorer,
    default_score: f64,
    catch_errors: bool,
    show_warnings: bool,
    memoizer: Option<Memoizer>,
    signature: [u8; 32],
}

#[bon]
impl<M: SupervisedModel> Utility<M> {
    /// Build a utility.
    ///
    /// - `scorer`: defaults to the model's own score.
    /// - `default_score`: returned for the empty set, and for failed fits when
    ///   `catch_errors` is set. Default: 0.
    /// - `catch_errors`: turn model errors into `default_score`. Default: true.
    /// - `show_warnings`: log caught errors. Default: false.
    /// - `cache_config` / `cache_backend`: enable memoization. Giving only a
    ///   config uses an in-memory backend; giving only a backend uses the
    ///   default config.
    #[builder]
    pub fn new(
        model: M,
        data: Dataset,
        #[builder(default)] scorer: Scorer,
        #[builder(default = 0.0)] default_score: f64,
        #[builder(default = true)] catch_errors: bool,
        #[builder(default = false)] show_warnings: bool,
        cache_config: Option<CacheConfig>,
        cache_backend: Option<Arc<dyn CacheBackend>>,
    ) -> Self {
        let memoizer = match (cache_backend, cache_config) {
            (Some(backend), config) => Some(Memoizer::new(backend, config.unwrap_or_default())),
            (None, Some(config)) => Some(Memoizer::in_memory(config)),
            (None, None) => None,
        };

        let mut hasher = blake3::Hasher::new();
        hasher.update(model.name().as_bytes());
        model.hash_params(&mut hasher);
        hasher.update(scorer.name().as_bytes());
        hasher.update(&default_score.to_le_bytes());
        hasher.update(&[catch_errors as u8]);
        data.hash_into(&mut hasher);
        let signature = *hasher.finalize().as_bytes();

        Self {
            model,
            data: Arc::new(data),
            scorer,
            default_score,
            catch_errors,
            show_warnings,
            memoizer,
            signature,
        }
    }
}

impl<M: SupervisedModel> Utility<M> {
    /// Score of a model trained on the units in `subset`.
    ///
    /// The empty set scores `default_score` without touching the model.
    /// Out-of-range indices are always an error; model failures are an error
    /// only when `catch_errors` is off.
    pub fn evaluate(&self, subset: &[usize]) -> Result<f64, ValuationError> {
        if subset.is_empty() {
            return Ok(self.default_score);
        }
        match &self.memoizer {
            Some(memoizer) => {
                let key = CacheKey::builder(&self.signature).indices(subset).finish();
                memoizer.try_get_or_compute(key, || self.fit_and_score(subset))
            }
            None => self.fit_and_score(subset),
        }
    }

    /// Utility of the whole dataset.
    pub fn total(&self) -> Result<f64, ValuationError> {
        self.evaluate(&self.data.indices())
    }

    fn fit_and_score(&self, subset: &[usize]) -> Result<f64, ValuationError> {
        let (x, y) = self.data.training_subset(subset)?;
        let scored: Result<f64, ModelError> = (|| {
            let mut model = self.model.clone();
            model.fit(x.view(), y.view())?;
            self.scorer.score(&model, self.data.x_test(), self.data.y_test())
        })();

        match scored {
            Ok(score) => Ok(score),
            Err(err) if self.catch_errors => {
                if self.show_warnings {
                    warn!(
                        model = self.model.name(),
                        subset_len = subset.len(),
                        error = %err,
                        "model failed, using default score"
                    );
                }
                Ok(self.default_score)
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn default_score(&self) -> f64 {
        self.default_score
    }

    /// Number of valued units.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.data.indices()
    }

    /// Identifies model, scorer and data; keys cached evaluations.
    pub fn signature(&self) -> &[u8; 32] {
        &self.signature
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.memoizer.as_ref().map(Memoizer::stats)
    }

    /// Width of the scorer's range, if bounded.
    pub fn score_range(&self) -> Option<f64> {
        let (low, high) = self.scorer.range();
        (low.is_finite() && high.is_finite()).then(|| high - low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::model::LinearRegression;
    use ndarray::array;
    use std::time::Duration;

    fn line_data() -> Dataset {
        Dataset::new(
            array![[0.0], [1.0], [2.0], [3.0]],
            array![1.0, 3.0, 5.0, 7.0],
            array![[4.0], [5.0]],
            array![9.0, 11.0],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_subset_returns_default_score() {
        let u = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .default_score(-3.0)
            .build();
        assert_eq!(u.evaluate(&[]).unwrap(), -3.0);
    }

    #[test]
    fn test_evaluate_fits_on_subset() {
        let u = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .scorer(Scorer::neg_mse())
            .build();
        let full = u.total().unwrap();
        assert!(full.abs() < 1e-6);
        // A single point yields a constant model, which is wrong on the test set.
        assert!(u.evaluate(&[0]).unwrap() < -1.0);
    }

    #[test]
    fn test_out_of_range_index_is_error() {
        let u = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .build();
        assert!(matches!(
            u.evaluate(&[7]),
            Err(ValuationError::Dataset(_))
        ));
    }

    #[derive(Debug, Clone)]
    struct Failing;

    impl SupervisedModel for Failing {
        fn fit(
            &mut self,
            _: ndarray::ArrayView2<'_, f64>,
            _: ndarray::ArrayView1<'_, f64>,
        ) -> Result<(), ModelError> {
            Err(ModelError::Other("nope".into()))
        }

        fn predict(
            &self,
            _: ndarray::ArrayView2<'_, f64>,
        ) -> Result<ndarray::Array1<f64>, ModelError> {
            Err(ModelError::NotFitted)
        }

        fn name(&self) -> &str {
            "Failing"
        }
    }

    #[test]
    fn test_catch_errors() {
        let caught = Utility::builder()
            .model(Failing)
            .data(line_data())
            .default_score(0.25)
            .show_warnings(true)
            .build();
        assert_eq!(caught.evaluate(&[0, 1]).unwrap(), 0.25);

        let raised = Utility::builder()
            .model(Failing)
            .data(line_data())
            .catch_errors(false)
            .build();
        assert!(matches!(
            raised.evaluate(&[0, 1]),
            Err(ValuationError::Model(ModelError::Other(_)))
        ));
    }

    #[test]
    fn test_cache_serves_repeated_subsets() {
        let u = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .cache_config(CacheConfig::builder().time_threshold(Duration::ZERO).build())
            .build();
        let a = u.evaluate(&[0, 2]).unwrap();
        let b = u.evaluate(&[2, 0]).unwrap();
        assert_eq!(a, b);
        let stats = u.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_shared_backend_separates_utilities() {
        let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());
        let config = CacheConfig::builder().time_threshold(Duration::ZERO).build();
        let u1 = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .scorer(Scorer::r2())
            .cache_backend(backend.clone())
            .cache_config(config.clone())
            .build();
        let u2 = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .scorer(Scorer::neg_mse())
            .cache_backend(backend.clone())
            .cache_config(config)
            .build();
        assert_ne!(u1.signature(), u2.signature());
        u1.evaluate(&[0, 1]).unwrap();
        u2.evaluate(&[0, 1]).unwrap();
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_shared_backend_separates_hyperparameters() {
        use crate::model::KNeighborsClassifier;

        let data = Dataset::new(
            array![[0.0], [1.0], [2.0], [3.0], [4.0]],
            array![1.0, 0.0, 0.0, 0.0, 0.0],
            array![[0.0]],
            array![1.0],
        )
        .unwrap();
        let backend: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());
        let config = CacheConfig::builder().time_threshold(Duration::ZERO).build();
        let knn = |k| {
            Utility::builder()
                .model(KNeighborsClassifier::new(k).unwrap())
                .data(data.clone())
                .cache_backend(backend.clone())
                .cache_config(config.clone())
                .build()
        };
        let one = knn(1);
        let five = knn(5);
        assert_ne!(one.signature(), five.signature());

        assert_eq!(one.total().unwrap(), 1.0);
        assert_eq!(five.total().unwrap(), 0.0);
        assert_eq!(five.cache_stats().unwrap().hits, 0);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_score_range() {
        let u = Utility::builder()
            .model(LinearRegression::new())
            .data(line_data())
            .scorer(Scorer::squashed_r2())
            .build();
        assert_eq!(u.score_range(), Some(1.0));
    }
}
