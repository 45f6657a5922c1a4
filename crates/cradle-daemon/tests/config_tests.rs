//! Tests for service configuration loading.

use std::fs;
use std::path::Path;

use cradle_core::{Error, NsType};
use cradle_daemon::config::{
    load_checkpoint_config, load_namespace_config, ProviderConfig, CHECKPOINT_CONFIG,
    NAMESPACE_CONFIG,
};
use tempfile::TempDir;

fn write_ns_config(root: &Path, json: &str) {
    fs::write(root.join(NAMESPACE_CONFIG), json).unwrap();
}

fn write_cp_config(root: &Path, json: &str) {
    fs::write(root.join(CHECKPOINT_CONFIG), json).unwrap();
}

#[test]
fn test_missing_namespace_file_yields_defaults() {
    let root = TempDir::new().unwrap();

    let config = load_namespace_config(root.path()).unwrap();

    assert_eq!(config.capacity_of(NsType::Uts), 5);
    assert_eq!(config.capacity_of(NsType::Ipc), 5);
    // Without configured refs the mount pool cannot be warmed.
    assert_eq!(config.capacity_of(NsType::Mnt), 0);
    assert!(config.mount_refs.is_empty());
    assert_eq!(config.image_store, root.path().join("images"));
}

#[test]
fn test_present_keys_merge_over_defaults() {
    let root = TempDir::new().unwrap();
    write_ns_config(root.path(), r#"{"capacity": {"uts": 2, "mnt": 0}}"#);

    let config = load_namespace_config(root.path()).unwrap();

    assert_eq!(config.capacity_of(NsType::Uts), 2);
    assert_eq!(config.capacity_of(NsType::Ipc), 5);
    assert_eq!(config.capacity_of(NsType::Mnt), 0);
}

#[test]
fn test_mount_refs_must_match_capacity() {
    let root = TempDir::new().unwrap();
    write_ns_config(
        root.path(),
        r#"{"capacity": {"mnt": 2}, "extra_args": {"mnt": ["img-a"]}}"#,
    );

    let err = load_namespace_config(root.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_matching_mount_refs_accepted() {
    let root = TempDir::new().unwrap();
    write_ns_config(
        root.path(),
        r#"{"capacity": {"mnt": 2}, "extra_args": {"mnt": ["img-a", "img-a"]}}"#,
    );

    let config = load_namespace_config(root.path()).unwrap();
    assert_eq!(config.capacity_of(NsType::Mnt), 2);
    assert_eq!(config.mount_refs, vec!["img-a", "img-a"]);
}

#[test]
fn test_non_mount_extra_args_rejected() {
    let root = TempDir::new().unwrap();
    write_ns_config(root.path(), r#"{"extra_args": {"uts": ["surprise"]}}"#);

    let err = load_namespace_config(root.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_malformed_namespace_file_rejected() {
    let root = TempDir::new().unwrap();
    write_ns_config(root.path(), r#"{"capacity": {"uts": -3}}"#);

    let err = load_namespace_config(root.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_missing_checkpoint_file_is_fatal() {
    let root = TempDir::new().unwrap();

    let err = load_checkpoint_config(root.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_malformed_checkpoint_file_is_fatal() {
    let root = TempDir::new().unwrap();
    write_cp_config(root.path(), r#"{"type": "content-addressed", "config": 7}"#);

    let err = load_checkpoint_config(root.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_unknown_provider_type_is_fatal() {
    let root = TempDir::new().unwrap();
    write_cp_config(
        root.path(),
        r#"{"type": "teleport", "config": {"cache_path": "/tmp"}}"#,
    );

    let err = load_checkpoint_config(root.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn test_content_addressed_config_parses() {
    let root = TempDir::new().unwrap();
    write_cp_config(
        root.path(),
        r#"{"type": "content-addressed", "config": {"cache_path": "/srv/ccache"}}"#,
    );

    let config = load_checkpoint_config(root.path()).unwrap();
    match config {
        ProviderConfig::ContentAddressed(c) => {
            assert_eq!(c.cache_path, Path::new("/srv/ccache"));
        }
        other => panic!("unexpected provider config: {other:?}"),
    }
}

#[test]
fn test_runtime_native_config_parses() {
    let root = TempDir::new().unwrap();
    write_cp_config(
        root.path(),
        r#"{"type": "runtime-native", "config": {"store_path": "/srv/store"}}"#,
    );

    let config = load_checkpoint_config(root.path()).unwrap();
    match config {
        ProviderConfig::RuntimeNative(c) => {
            assert_eq!(c.store_path, Path::new("/srv/store"));
        }
        other => panic!("unexpected provider config: {other:?}"),
    }
}
