//! Configuration loading tests

use basalt::config::Config;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_defaults_without_any_file() {
    let config = Config::default();
    assert_eq!(config.execution.vector_size, 2048);
    assert!(config.execution.parallel_execution);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("basalt.toml");
    fs::write(&path, "[logging]\nlevel = \"trace\"\n").expect("write");

    let config = Config::from_file(path.to_str().expect("utf8")).expect("load");
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.execution.vector_size, 2048);
}

#[test]
fn test_execution_section_overrides() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("basalt.toml");
    fs::write(
        &path,
        "[execution]\nvector_size = 1024\nparallel_execution = false\noutput_batch_size = 64\n",
    )
    .expect("write");

    let config = Config::from_file(path.to_str().expect("utf8")).expect("load");
    assert_eq!(config.execution.vector_size, 1024);
    assert!(!config.execution.parallel_execution);
    assert_eq!(config.execution.output_batch_size, 64);
}

#[test]
fn test_worker_threads_resolution() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("basalt.toml");
    fs::write(&path, "[execution]\nworker_threads = 2\n").expect("write");

    let config = Config::from_file(path.to_str().expect("utf8")).expect("load");
    assert_eq!(config.execution.resolved_worker_threads(), 2);

    let default = Config::default();
    assert!(default.execution.resolved_worker_threads() >= 1);
}
