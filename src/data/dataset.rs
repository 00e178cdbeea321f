//! User-facing dataset abstraction.
//!
//! A [`Dataset`] holds a train/test split of a feature matrix and a target
//! vector. The valued units are the training rows, or groups of training rows
//! when the dataset is grouped with [`Dataset::grouped`].

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Dataset construction and validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    #[error("number of targets ({targets}) does not match number of rows ({rows})")]
    TargetLenMismatch { rows: usize, targets: usize },

    #[error("train set has {train} features but test set has {test}")]
    FeatureMismatch { train: usize, test: usize },

    #[error("train_size must be in (0, 1), got {0}")]
    InvalidTrainSize(f64),

    #[error("split leaves an empty {0} set")]
    EmptySplit(&'static str),

    #[error("expected {expected} {what}, got {got}")]
    NamesLenMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("number of group labels ({labels}) does not match number of training rows ({rows})")]
    GroupLenMismatch { rows: usize, labels: usize },

    #[error("index {index} out of bounds for dataset with {len} units")]
    IndexOutOfBounds { index: usize, len: usize },
}

// =============================================================================
// Groups
// =============================================================================

/// Assignment of training rows to named groups.
///
/// Groups are numbered in order of first appearance of their label.
#[derive(Debug, Clone, PartialEq)]
pub struct Groups {
    labels: Vec<String>,
    members: Vec<Vec<usize>>,
}

impl Groups {
    /// Build groups from one label per training row.
    pub fn from_labels<S: AsRef<str>>(row_labels: &[S]) -> Self {
        let mut labels: Vec<String> = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for (row, label) in row_labels.iter().enumerate() {
            let label = label.as_ref();
            match labels.iter().position(|l| l == label) {
                Some(g) => members[g].push(row),
                None => {
                    labels.push(label.to_string());
                    members.push(vec![row]);
                }
            }
        }
        Self { labels, members }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Group labels, indexed by group.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Training rows of group `g`.
    pub fn rows(&self, g: usize) -> &[usize] {
        &self.members[g]
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// A supervised learning dataset with a train/test split.
#[derive(Debug, Clone)]
pub struct Dataset {
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    x_test: Array2<f64>,
    y_test: Array1<f64>,
    feature_names: Vec<String>,
    target_names: Vec<String>,
    data_names: Vec<String>,
    description: String,
    groups: Option<Groups>,
}

impl Dataset {
    /// Create a dataset from an explicit train/test split.
    pub fn new(
        x_train: Array2<f64>,
        y_train: Array1<f64>,
        x_test: Array2<f64>,
        y_test: Array1<f64>,
    ) -> Result<Self, DatasetError> {
        if x_train.nrows() != y_train.len() {
            return Err(DatasetError::TargetLenMismatch {
                rows: x_train.nrows(),
                targets: y_train.len(),
            });
        }
        if x_test.nrows() != y_test.len() {
            return Err(DatasetError::TargetLenMismatch {
                rows: x_test.nrows(),
                targets: y_test.len(),
            });
        }
        if x_train.ncols() != x_test.ncols() {
            return Err(DatasetError::FeatureMismatch {
                train: x_train.ncols(),
                test: x_test.ncols(),
            });
        }

        let feature_names = (0..x_train.ncols()).map(|i| format!("x{i}")).collect();
        let data_names = (0..x_train.nrows()).map(|i| i.to_string()).collect();
        Ok(Self {
            x_train,
            y_train,
            x_test,
            y_test,
            feature_names,
            target_names: vec!["y".to_string()],
            data_names,
            description: String::new(),
            groups: None,
        })
    }

    /// Shuffle rows deterministically and split them into train and test sets.
    ///
    /// `train_size` is the fraction of rows that go to the training set.
    pub fn from_arrays(
        x: Array2<f64>,
        y: Array1<f64>,
        train_size: f64,
        seed: u64,
    ) -> Result<Self, DatasetError> {
        if x.nrows() != y.len() {
            return Err(DatasetError::TargetLenMismatch {
                rows: x.nrows(),
                targets: y.len(),
            });
        }
        if !(train_size > 0.0 && train_size < 1.0) {
            return Err(DatasetError::InvalidTrainSize(train_size));
        }

        let n = x.nrows();
        let mut idx: Vec<usize> = (0..n).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        idx.shuffle(&mut rng);

        let n_train = ((n as f64) * train_size).round() as usize;
        let (train, test) = idx.split_at(n_train.min(n));
        if train.is_empty() {
            return Err(DatasetError::EmptySplit("train"));
        }
        if test.is_empty() {
            return Err(DatasetError::EmptySplit("test"));
        }

        Self::new(
            x.select(Axis(0), train),
            y.select(Axis(0), train),
            x.select(Axis(0), test),
            y.select(Axis(0), test),
        )
    }

    /// Set feature names; one per column.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Result<Self, DatasetError> {
        if names.len() != self.dim() {
            return Err(DatasetError::NamesLenMismatch {
                what: "feature names",
                expected: self.dim(),
                got: names.len(),
            });
        }
        self.feature_names = names;
        Ok(self)
    }

    pub fn with_target_names(mut self, names: Vec<String>) -> Self {
        self.target_names = names;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set names of the valued units (rows, or groups if grouped).
    pub fn with_data_names(mut self, names: Vec<String>) -> Result<Self, DatasetError> {
        if names.len() != self.len() {
            return Err(DatasetError::NamesLenMismatch {
                what: "data names",
                expected: self.len(),
                got: names.len(),
            });
        }
        self.data_names = names;
        Ok(self)
    }

    /// Group training rows so that each group is valued as a single unit.
    ///
    /// Takes one label per training row. Data names become the group labels.
    pub fn grouped<S: AsRef<str>>(mut self, row_labels: &[S]) -> Result<Self, DatasetError> {
        if row_labels.len() != self.x_train.nrows() {
            return Err(DatasetError::GroupLenMismatch {
                rows: self.x_train.nrows(),
                labels: row_labels.len(),
            });
        }
        let groups = Groups::from_labels(row_labels);
        self.data_names = groups.labels().to_vec();
        self.groups = Some(groups);
        Ok(self)
    }

    /// Number of valued units: groups if grouped, otherwise training rows.
    pub fn len(&self) -> usize {
        match &self.groups {
            Some(g) => g.len(),
            None => self.x_train.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indices of the valued units, `0..len()`.
    pub fn indices(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }

    /// Number of features.
    pub fn dim(&self) -> usize {
        self.x_train.ncols()
    }

    pub fn is_grouped(&self) -> bool {
        self.groups.is_some()
    }

    pub fn groups(&self) -> Option<&Groups> {
        self.groups.as_ref()
    }

    pub fn x_train(&self) -> ArrayView2<'_, f64> {
        self.x_train.view()
    }

    pub fn y_train(&self) -> ArrayView1<'_, f64> {
        self.y_train.view()
    }

    pub fn x_test(&self) -> ArrayView2<'_, f64> {
        self.x_test.view()
    }

    pub fn y_test(&self) -> ArrayView1<'_, f64> {
        self.y_test.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    pub fn data_names(&self) -> &[String] {
        &self.data_names
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Training rows covered by a subset of unit indices.
    pub fn rows_for(&self, subset: &[usize]) -> Result<Vec<usize>, DatasetError> {
        let len = self.len();
        if let Some(&index) = subset.iter().find(|&&i| i >= len) {
            return Err(DatasetError::IndexOutOfBounds { index, len });
        }
        Ok(match &self.groups {
            Some(groups) => subset
                .iter()
                .flat_map(|&g| groups.rows(g).iter().copied())
                .collect(),
            None => subset.to_vec(),
        })
    }

    /// Owned training features and targets for a subset of unit indices.
    pub fn training_subset(
        &self,
        subset: &[usize],
    ) -> Result<(Array2<f64>, Array1<f64>), DatasetError> {
        let rows = self.rows_for(subset)?;
        Ok((
            self.x_train.select(Axis(0), &rows),
            self.y_train.select(Axis(0), &rows),
        ))
    }

    /// Feed the dataset contents into a hasher.
    ///
    /// Used to derive cache keys that change whenever the data changes.
    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        for array in [&self.x_train, &self.x_test] {
            hasher.update(&(array.nrows() as u64).to_le_bytes());
            hasher.update(&(array.ncols() as u64).to_le_bytes());
            for v in array.iter() {
                hasher.update(&v.to_le_bytes());
            }
        }
        for array in [&self.y_train, &self.y_test] {
            for v in array.iter() {
                hasher.update(&v.to_le_bytes());
            }
        }
        if let Some(groups) = &self.groups {
            for g in 0..groups.len() {
                hasher.update(&(g as u64).to_le_bytes());
                for &row in groups.rows(g) {
                    hasher.update(&(row as u64).to_le_bytes());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    fn small() -> Dataset {
        Dataset::new(
            array![[0.0, 1.0], [1.0, 2.0], [2.0, 3.0], [3.0, 4.0]],
            array![0.0, 1.0, 2.0, 3.0],
            array![[4.0, 5.0]],
            array![4.0],
        )
        .unwrap()
    }

    #[test]
    fn test_new_validates_shapes() {
        let err = Dataset::new(
            array![[0.0], [1.0]],
            array![0.0],
            array![[0.0]],
            array![0.0],
        )
        .unwrap_err();
        assert_eq!(err, DatasetError::TargetLenMismatch { rows: 2, targets: 1 });

        let err = Dataset::new(
            array![[0.0]],
            array![0.0],
            array![[0.0, 1.0]],
            array![0.0],
        )
        .unwrap_err();
        assert_eq!(err, DatasetError::FeatureMismatch { train: 1, test: 2 });
    }

    #[test]
    fn test_basic_accessors() {
        let ds = small();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.dim(), 2);
        assert_eq!(ds.indices(), vec![0, 1, 2, 3]);
        assert_eq!(ds.feature_names(), &["x0".to_string(), "x1".to_string()]);
        assert_eq!(ds.data_names()[3], "3");
    }

    #[test]
    fn test_from_arrays_split_is_deterministic() {
        let x = Array::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
        let y = Array::from_shape_fn(10, |i| i as f64);
        let a = Dataset::from_arrays(x.clone(), y.clone(), 0.7, 3).unwrap();
        let b = Dataset::from_arrays(x, y, 0.7, 3).unwrap();
        assert_eq!(a.len(), 7);
        assert_eq!(a.y_test().len(), 3);
        assert_eq!(a.y_train(), b.y_train());
    }

    #[test]
    fn test_from_arrays_rejects_bad_train_size() {
        let x = Array2::<f64>::zeros((4, 1));
        let y = Array1::<f64>::zeros(4);
        assert_eq!(
            Dataset::from_arrays(x, y, 1.0, 0).unwrap_err(),
            DatasetError::InvalidTrainSize(1.0)
        );
    }

    #[test]
    fn test_grouped_maps_units_to_rows() {
        let ds = small().grouped(&["a", "b", "a", "c"]).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.data_names(), &["a", "b", "c"]);
        assert_eq!(ds.rows_for(&[0, 2]).unwrap(), vec![0, 2, 3]);

        let (x, y) = ds.training_subset(&[0]).unwrap();
        assert_eq!(x.nrows(), 2);
        assert_eq!(y, array![0.0, 2.0]);
    }

    #[test]
    fn test_rows_for_out_of_bounds() {
        let ds = small();
        assert_eq!(
            ds.rows_for(&[1, 4]).unwrap_err(),
            DatasetError::IndexOutOfBounds { index: 4, len: 4 }
        );
    }

    #[test]
    fn test_names_validation() {
        let ds = small();
        assert!(ds.clone().with_feature_names(vec!["a".into()]).is_err());
        assert!(ds.with_data_names(vec!["p".into(); 4]).is_ok());
    }
}
