//! Tests for TOML configuration loading.

use std::fs;

use tapedeck::config::{load_config, load_config_or_default, to_toml, Config};
use tempfile::tempdir;

#[test]
fn empty_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tapedeck.toml");
    fs::write(&path, "").unwrap();

    let config = load_config(&path).unwrap();
    let defaults = Config::default();
    assert_eq!(config.buffer.allocation_length, defaults.buffer.allocation_length);
    assert_eq!(config.seek.minimum_search_range, defaults.seek.minimum_search_range);
    assert_eq!(config.loading.max_buffer_us, defaults.loading.max_buffer_us);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tapedeck.toml");
    fs::write(
        &path,
        r#"
[buffer]
allocation_length = 4096

[seek]
scan_window = 32768
"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.buffer.allocation_length, 4096);
    assert_eq!(config.buffer.initial_metadata_capacity, 1000);
    assert_eq!(config.seek.scan_window, 32768);
    assert_eq!(config.seek.minimum_search_range, 4096);
    assert_eq!(config.loading.read_steps_per_continue, 64);
}

#[test]
fn zero_allocation_length_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tapedeck.toml");
    fs::write(&path, "[buffer]\nallocation_length = 0\n").unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("allocation_length"));
}

#[test]
fn zero_read_steps_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tapedeck.toml");
    fs::write(&path, "[loading]\nread_steps_per_continue = 0\n").unwrap();
    assert!(load_config(&path).is_err());
}

#[test]
fn invalid_toml_names_the_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[buffer\nallocation_length = ").unwrap();

    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(load_config_or_default(Some(&path)).is_err());
}

#[test]
fn rendered_config_loads_back() {
    let mut config = Config::default();
    config.seek.trailing_scan_window = 65536;
    config.loading.max_buffer_us = 5_000_000;

    let dir = tempdir().unwrap();
    let path = dir.path().join("tapedeck.toml");
    fs::write(&path, to_toml(&config).unwrap()).unwrap();

    let loaded = load_config(&path).unwrap();
    assert_eq!(loaded.seek.trailing_scan_window, 65536);
    assert_eq!(loaded.loading.max_buffer_us, 5_000_000);
}
