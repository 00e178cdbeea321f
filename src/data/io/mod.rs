//! Dataset loading from JSON files.
//!
//! The expected layout is a single object:
//!
//! ```json
//! {
//!   "features": [[0.1, 2.0], [0.3, 1.0]],
//!   "targets": [1.0, 0.0],
//!   "feature_names": ["a", "b"],
//!   "groups": ["g0", "g0"],
//!   "train_size": 0.8,
//!   "description": "toy data"
//! }
//! ```
//!
//! Only `features` and `targets` are required.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{Dataset, DatasetError};

mod error;

pub use error::DatasetLoadError;

/// On-disk representation of a dataset before splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    /// One group label per row, applied to the training rows after splitting.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    #[serde(default = "default_train_size")]
    pub train_size: f64,
    #[serde(default)]
    pub description: String,
}

fn default_train_size() -> f64 {
    0.8
}

impl RawDataset {
    /// Split into a [`Dataset`] with a deterministic shuffle.
    pub fn into_dataset(self, seed: u64) -> Result<Dataset, DatasetLoadError> {
        let n_rows = self.features.len();
        let n_cols = self.features.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(n_rows * n_cols);
        for (row, values) in self.features.iter().enumerate() {
            if values.len() != n_cols {
                return Err(DatasetLoadError::RaggedRows {
                    row,
                    expected: n_cols,
                    got: values.len(),
                });
            }
            flat.extend_from_slice(values);
        }
        let x = Array2::from_shape_vec((n_rows, n_cols), flat)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let y = Array1::from(self.targets);

        match self.groups {
            None => {
                let mut ds = Dataset::from_arrays(x, y, self.train_size, seed)?
                    .with_description(self.description);
                if let Some(names) = self.feature_names {
                    ds = ds.with_feature_names(names)?;
                }
                Ok(ds)
            }
            Some(labels) => {
                if labels.len() != n_rows {
                    return Err(DatasetError::GroupLenMismatch {
                        rows: n_rows,
                        labels: labels.len(),
                    }
                    .into());
                }
                // Carry the labels through the shuffle by splitting a label column alongside.
                let with_labels = Array2::from_shape_fn((n_rows, n_cols + 1), |(i, j)| {
                    if j < n_cols {
                        x[[i, j]]
                    } else {
                        i as f64
                    }
                });
                let split = Dataset::from_arrays(with_labels, y, self.train_size, seed)?;
                let train_rows: Vec<String> = split
                    .x_train()
                    .column(n_cols)
                    .iter()
                    .map(|&i| labels[i as usize].clone())
                    .collect();
                let strip = |a: ndarray::ArrayView2<'_, f64>| a.slice(ndarray::s![.., ..n_cols]).to_owned();
                let mut ds = Dataset::new(
                    strip(split.x_train()),
                    split.y_train().to_owned(),
                    strip(split.x_test()),
                    split.y_test().to_owned(),
                )?
                .with_description(self.description)
                .grouped(&train_rows)?;
                if let Some(names) = self.feature_names {
                    ds = ds.with_feature_names(names)?;
                }
                Ok(ds)
            }
        }
    }
}

/// Parse a JSON dataset from any reader.
pub fn read_json<R: Read>(reader: R, seed: u64) -> Result<Dataset, DatasetLoadError> {
    let raw: RawDataset = serde_json::from_reader(reader)?;
    raw.into_dataset(seed)
}

/// Load a JSON dataset from a file.
pub fn load_json(path: impl AsRef<Path>, seed: u64) -> Result<Dataset, DatasetLoadError> {
    let file = File::open(path)?;
    read_json(BufReader::new(file), seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOY: &str = r#"{
        "features": [[0.0], [1.0], [2.0], [3.0], [4.0]],
        "targets": [0.0, 1.0, 2.0, 3.0, 4.0],
        "feature_names": ["f"],
        "train_size": 0.6
    }"#;

    #[test]
    fn test_read_json() {
        let ds = read_json(TOY.as_bytes(), 0).unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.y_test().len(), 2);
        assert_eq!(ds.feature_names(), &["f".to_string()]);
        // Targets equal features in the toy data, so the shuffle must keep pairs aligned.
        for (x, y) in ds.x_train().column(0).iter().zip(ds.y_train()) {
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_read_json_ragged_rows() {
        let bad = r#"{"features": [[0.0, 1.0], [1.0]], "targets": [0.0, 1.0]}"#;
        let err = read_json(bad.as_bytes(), 0).unwrap_err();
        assert!(matches!(err, DatasetLoadError::RaggedRows { row: 1, .. }));
    }

    #[test]
    fn test_read_json_grouped() {
        let grouped = r#"{
            "features": [[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]],
            "targets": [0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            "groups": ["a", "a", "b", "b", "c", "c"],
            "train_size": 0.5
        }"#;
        let ds = read_json(grouped.as_bytes(), 7).unwrap();
        assert!(ds.is_grouped());
        assert_eq!(ds.dim(), 1);
        let groups = ds.groups().unwrap();
        let total: usize = (0..groups.len()).map(|g| groups.rows(g).len()).sum();
        assert_eq!(total, 3);
        // Rows keep their labels: a row's feature value identifies its original label.
        for g in 0..groups.len() {
            let label = &groups.labels()[g];
            for &row in groups.rows(g) {
                let original = ds.x_train()[[row, 0]] as usize;
                assert_eq!(label, ["a", "a", "b", "b", "c", "c"][original]);
            }
        }
    }

    #[test]
    fn test_load_json_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOY.as_bytes()).unwrap();
        let ds = load_json(file.path(), 0).unwrap();
        assert_eq!(ds.len(), 3);
    }
}
