//! End-to-end runs: datasets from JSON, configuration, caching and result export.

mod common;

use std::io::Write;

use common::*;
use datavalue::cache::CacheConfig;
use datavalue::data::{load_json, read_json};
use datavalue::model::LinearRegression;
use datavalue::value::{compute_shapley_values, naive_loo, ShapleyMode, ValuationResult};
use datavalue::{Utility, ValuationConfig, Verbosity};
use std::time::Duration;

const DATASET: &str = r#"{
    "features": [[0.0, 1.0], [1.0, 0.5], [2.0, 0.1], [3.0, 0.9], [4.0, 0.3],
                 [5.0, 0.7], [6.0, 0.2], [7.0, 0.8], [8.0, 0.4], [9.0, 0.6]],
    "targets": [0.1, 1.2, 1.9, 3.1, 4.0, 5.2, 5.9, 7.1, 8.0, 9.1],
    "feature_names": ["x", "noise"],
    "train_size": 0.6,
    "description": "almost linear"
}"#;

#[test]
fn test_json_dataset_to_values_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(DATASET.as_bytes()).unwrap();

    let data = load_json(file.path(), 0).unwrap();
    assert_eq!(data.len(), 6);

    let u = Utility::builder()
        .model(LinearRegression::new())
        .data(data)
        .build();
    let values = naive_loo(&u, 2, Verbosity::Silent).unwrap();

    let out = tempfile::NamedTempFile::new().unwrap();
    values.to_json_writer(out.reopen().unwrap()).unwrap();
    let restored = ValuationResult::from_json_reader(out.reopen().unwrap()).unwrap();
    assert_eq!(restored.values_by_index(), values.values_by_index());
    assert_eq!(restored.names(), values.names());
}

#[test]
fn test_grouped_dataset_values_groups() {
    let mut raw: serde_json::Value = serde_json::from_str(DATASET).unwrap();
    raw["groups"] = serde_json::json!(["a", "a", "b", "b", "c", "c", "d", "d", "e", "e"]);
    let data = read_json(raw.to_string().as_bytes(), 3).unwrap();
    assert!(data.is_grouped());
    assert!(data.len() <= 5);

    let u = Utility::builder()
        .model(LinearRegression::new())
        .data(data)
        .build();
    let values = naive_loo(&u, 1, Verbosity::Silent).unwrap();
    assert_eq!(values.len(), u.len());
}

#[test]
fn test_config_drives_a_cached_run() {
    let config = ValuationConfig::from_json_str(
        r#"{
            "mode": "permutation_montecarlo",
            "max_updates": 20,
            "seed": 99,
            "parallel": {"backend": "sequential"},
            "cache": {"time_threshold": {"secs": 0, "nanos": 0}}
        }"#,
    )
    .unwrap();
    assert_eq!(config.mode, ShapleyMode::PermutationMontecarlo);
    assert_eq!(config.cache.as_ref().map(|c| c.time_threshold), Some(Duration::ZERO));

    let u = Utility::builder()
        .model(datavalue::testing::data::SumModel::new(15.0))
        .data(analytic_utility(6).data().clone())
        .maybe_cache_config(config.cache.clone())
        .build();
    let params = config.shapley_params().unwrap();
    let first = compute_shapley_values(&u, config.mode, &params).unwrap();
    let second = compute_shapley_values(&u, config.mode, &config.shapley_params().unwrap()).unwrap();

    assert_eq!(first.values_by_index(), second.values_by_index());
    check_values(&first, &analytic_values(6), 1e-10, 1e-10);
    let stats = u.cache_stats().unwrap();
    assert!(stats.hits > 0);
    assert!(stats.sets > 0);
}

#[test]
fn test_cache_config_defaults() {
    let config = CacheConfig::default();
    assert_eq!(config.time_threshold, Duration::from_millis(300));
    assert!(!config.allow_repeated_evaluations);
}
