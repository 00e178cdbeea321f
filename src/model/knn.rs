//! K-nearest-neighbours classifier.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::{check_features, ModelError, SupervisedModel};
use crate::error::ConfigError;
use crate::scoring::accuracy_score;

/// Classifier voting among the `k` nearest training points (Euclidean distance).
///
/// Labels are class ids stored as `f64`. Ties in the vote go to the label of
/// the nearest tied neighbour. With fewer than `k` training rows, all rows vote.
/// The default score is accuracy.
#[derive(Debug, Clone)]
pub struct KNeighborsClassifier {
    n_neighbors: usize,
    x: Option<Array2<f64>>,
    y: Option<Array1<f64>>,
}

impl KNeighborsClassifier {
    /// Fails if `n_neighbors` is zero.
    pub fn new(n_neighbors: usize) -> Result<Self, ConfigError> {
        if n_neighbors == 0 {
            return Err(ConfigError::NonPositiveCount {
                field: "n_neighbors",
                value: n_neighbors,
            });
        }
        Ok(Self {
            n_neighbors,
            x: None,
            y: None,
        })
    }

    fn predict_row(&self, x: &Array2<f64>, y: &Array1<f64>, row: ArrayView1<'_, f64>) -> f64 {
        let mut order: Vec<(f64, usize)> = x
            .outer_iter()
            .enumerate()
            .map(|(i, train)| (squared_distance(train, row), i))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        order.truncate(self.n_neighbors);

        // (label, votes, rank of nearest voter)
        let mut votes: Vec<(f64, usize, usize)> = Vec::new();
        for (rank, &(_, i)) in order.iter().enumerate() {
            let label = y[i];
            match votes.iter_mut().find(|v| v.0 == label) {
                Some(v) => v.1 += 1,
                None => votes.push((label, 1, rank)),
            }
        }
        votes
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)))
            .map_or(f64::NAN, |v| v.0)
    }
}

pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl SupervisedModel for KNeighborsClassifier {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<(), ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        self.x = Some(x.to_owned());
        self.y = Some(y.to_owned());
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        let (train_x, train_y) = match (&self.x, &self.y) {
            (Some(tx), Some(ty)) => (tx, ty),
            _ => return Err(ModelError::NotFitted),
        };
        check_features(train_x.ncols(), x)?;
        Ok(x
            .outer_iter()
            .map(|row| self.predict_row(train_x, train_y, row))
            .collect())
    }

    fn score(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        let pred = self.predict(x)?;
        Ok(accuracy_score(y, pred.view()))
    }

    fn name(&self) -> &str {
        "KNeighborsClassifier"
    }

    fn hash_params(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&(self.n_neighbors as u64).to_le_bytes());
    }

    fn n_neighbors(&self) -> Option<usize> {
        Some(self.n_neighbors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_one_neighbour_memorizes() {
        let x = array![[0.0], [1.0], [5.0], [6.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = KNeighborsClassifier::new(1).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(x.view()).unwrap(), y);
        assert_eq!(model.score(x.view(), y.view()).unwrap(), 1.0);
    }

    #[test]
    fn test_majority_vote() {
        let x = array![[0.0], [0.1], [0.2], [10.0]];
        let y = array![1.0, 1.0, 0.0, 0.0];
        let mut model = KNeighborsClassifier::new(3).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(array![[0.05]].view()).unwrap()[0], 1.0);
    }

    #[test]
    fn test_tie_goes_to_nearest() {
        let x = array![[0.0], [1.0]];
        let y = array![3.0, 7.0];
        let mut model = KNeighborsClassifier::new(2).unwrap();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.predict(array![[0.9]].view()).unwrap()[0], 7.0);
        assert_eq!(model.predict(array![[0.1]].view()).unwrap()[0], 3.0);
    }

    #[test]
    fn test_fewer_rows_than_k() {
        let mut model = KNeighborsClassifier::new(5).unwrap();
        model
            .fit(array![[0.0], [1.0]].view(), array![2.0, 2.0].view())
            .unwrap();
        assert_eq!(model.predict(array![[3.0]].view()).unwrap()[0], 2.0);
        assert_eq!(model.n_neighbors(), Some(5));
    }

    #[test]
    fn test_zero_neighbours_rejected() {
        assert!(matches!(
            KNeighborsClassifier::new(0),
            Err(ConfigError::NonPositiveCount { field: "n_neighbors", value: 0 })
        ));
    }

    #[test]
    fn test_params_hash_depends_on_k() {
        let digest = |k| {
            let mut hasher = blake3::Hasher::new();
            KNeighborsClassifier::new(k).unwrap().hash_params(&mut hasher);
            hasher.finalize()
        };
        assert_eq!(digest(3), digest(3));
        assert_ne!(digest(1), digest(5));
    }

    #[test]
    fn test_not_fitted() {
        let model = KNeighborsClassifier::new(1).unwrap();
        assert_eq!(
            model.predict(array![[0.0]].view()).unwrap_err(),
            ModelError::NotFitted
        );
    }
}
