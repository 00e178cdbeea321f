//! Datasets for valuation.
//!
//! A [`Dataset`] bundles training and test data. Valuation algorithms assign
//! one value per *unit* of the training set: a row, or a group of rows when the
//! dataset is grouped.
//!
//! Datasets can be built from `ndarray` arrays directly or loaded from JSON
//! with [`io::load_json`].

mod dataset;
pub mod io;

pub use dataset::{Dataset, DatasetError, Groups};
pub use io::{load_json, read_json, DatasetLoadError, RawDataset};
