//! Tests for reading and writing OCI spec documents.

mod common;

use common::*;
use sandrun::spec::{config_path, read_config, write_config};
use sandrun::Error;
use std::collections::HashMap;
use tempfile::TempDir;

#[test]
fn test_annotations_round_trip() {
    let tmp = TempDir::new().unwrap();
    let mut spec = test_spec();
    spec.annotations = HashMap::from([
        ("io.kubernetes.cri-o.ContainerType".to_string(), "sandbox".to_string()),
        ("io.example/unicode".to_string(), "你好，世界".to_string()),
        ("empty".to_string(), String::new()),
    ]);

    let bundle = make_bundle(tmp.path(), &spec);
    let read = read_config(&config_path(&bundle)).unwrap();

    assert_eq!(read.annotations, spec.annotations);
    assert_eq!(read, spec);
}

#[test]
fn test_unknown_fields_survive_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "ociVersion": "1.0.2",
            "root": {"path": "rootfs"},
            "linux": {"namespaces": [{"type": "pid"}], "resources": {"devices": []}},
            "hooks": {"prestart": []}
        }"#,
    )
    .unwrap();

    let spec = read_config(&path).unwrap();
    write_config(&spec, &path).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    assert!(value["hooks"]["prestart"].is_array());
    assert!(value["linux"]["namespaces"].is_array());
    assert!(value["linux"]["resources"]["devices"].is_array());
}

#[test]
fn test_missing_config_is_invalid_spec() {
    let tmp = TempDir::new().unwrap();
    let err = read_config(&config_path(tmp.path())).unwrap_err();
    assert!(matches!(err, Error::InvalidSpec { .. }));
}

#[test]
fn test_limit_helpers() {
    let spec = test_spec();
    assert_eq!(spec.memory_limit(), Some(256 << 20));
    assert!(!spec.has_cpu_limit());
    assert!(spec.has_resource_limits());
    assert_eq!(spec.cgroups_path(), "sandrun/test");
    assert!(spec.cgroup_mount().is_some());
    assert!(spec.terminal());
}
