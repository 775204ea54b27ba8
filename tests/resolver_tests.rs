//! Tests for container-type resolution.

use sandrun::constants::{
    CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_CONTAINER, CONTAINER_TYPE_SANDBOX,
    SANDBOX_ID_ANNOTATION,
};
use sandrun::resolver::{resolve, ContainerType};
use sandrun::Error;
use std::collections::HashMap;

fn annotations(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_sandbox_token() {
    let a = annotations(&[(CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_SANDBOX)]);
    assert_eq!(resolve(&a).unwrap(), ContainerType::NewSandbox);
}

#[test]
fn test_sandbox_token_ignores_sandbox_id() {
    let a = annotations(&[
        (CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_SANDBOX),
        (SANDBOX_ID_ANNOTATION, "other"),
    ]);
    assert_eq!(resolve(&a).unwrap(), ContainerType::NewSandbox);
}

#[test]
fn test_unrelated_annotations_default_to_sandbox() {
    let a = annotations(&[("io.example/owner", "ops")]);
    assert_eq!(resolve(&a).unwrap(), ContainerType::NewSandbox);
}

#[test]
fn test_container_without_sandbox_id() {
    let a = annotations(&[(CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_CONTAINER)]);
    let err = resolve(&a).unwrap_err();
    assert!(matches!(err, Error::MissingSandboxId { .. }));
    assert!(err.to_string().contains(SANDBOX_ID_ANNOTATION));
}

#[test]
fn test_invalid_type_names_value() {
    for value in ["I-am-not-a-valid-type", "你好，世界", "Sandbox", ""] {
        let a = annotations(&[(CONTAINER_TYPE_ANNOTATION, value)]);
        let err = resolve(&a).unwrap_err();
        assert!(
            matches!(&err, Error::InvalidContainerType { value: v, .. } if v == value),
            "value {:?} should be rejected",
            value
        );
        assert!(err.to_string().contains(value));
    }
}

#[test]
fn test_resolution_is_deterministic() {
    let a = annotations(&[
        (CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_CONTAINER),
        (SANDBOX_ID_ANNOTATION, "sb"),
    ]);
    assert_eq!(resolve(&a).unwrap(), resolve(&a).unwrap());
    assert_eq!(resolve(&a).unwrap().token(), CONTAINER_TYPE_CONTAINER);
}

#[test]
fn test_sandbox_id_must_be_valid_identifier() {
    for value in ["../../etc", "a/b", ".hidden", "-flag"] {
        let a = annotations(&[
            (CONTAINER_TYPE_ANNOTATION, CONTAINER_TYPE_CONTAINER),
            (SANDBOX_ID_ANNOTATION, value),
        ]);
        let err = resolve(&a).unwrap_err();
        assert!(
            matches!(&err, Error::InvalidSandboxId { value: v, .. } if v == value),
            "sandbox ID {:?} should be rejected",
            value
        );
        assert!(err.to_string().contains(SANDBOX_ID_ANNOTATION));
    }
}
