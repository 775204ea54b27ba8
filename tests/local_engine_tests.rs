//! Tests for the state-directory sandbox engine.
//!
//! Uses `/bin/true` (or a short shell script) as the hypervisor so launches
//! succeed without a VM.

mod common;

use common::*;
use sandrun::engine::local::{hypervisor_args, LocalEngine};
use sandrun::engine::{ContainerConfig, EngineError, SandboxConfig, SandboxEngine};
use sandrun::kernel::Param;
use sandrun::resolver::ContainerType;
use sandrun::spec::{config_path, read_config};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

fn sandbox_config(dir: &Path, id: &str, hypervisor: &str) -> SandboxConfig {
    let mut runtime = test_runtime_config(dir);
    runtime.hypervisor.path = hypervisor.into();
    let bundle = make_bundle(dir, &test_spec());
    let spec = read_config(&config_path(&bundle)).unwrap();
    SandboxConfig::from_spec(
        &spec,
        &runtime,
        id,
        &bundle,
        "",
        true,
        vec![Param::new("quiet", "")],
    )
    .unwrap()
}

fn container_config(dir: &Path, id: &str) -> ContainerConfig {
    let bundle = make_bundle(dir, &test_spec());
    let spec = read_config(&config_path(&bundle)).unwrap();
    ContainerConfig::from_spec(
        &spec,
        id,
        &bundle,
        "",
        false,
        &ContainerType::ContainerInSandbox {
            sandbox_id: "sb".to_string(),
        },
    )
}

#[tokio::test]
async fn test_list_missing_root_is_empty() {
    let tmp = TempDir::new().unwrap();
    let engine = LocalEngine::new(tmp.path().join("state"));
    assert!(engine.list_sandboxes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_sandbox_records_state() {
    let tmp = TempDir::new().unwrap();
    let engine = LocalEngine::new(tmp.path().join("state"));
    let config = sandbox_config(tmp.path(), "sb", "/bin/true");

    let sandbox = engine.create_sandbox(&config).await.unwrap();
    assert_eq!(sandbox.id, "sb");
    assert_eq!(sandbox.containers.len(), 1);
    assert!(sandbox.representative_pid().unwrap() > 0);

    let dir = tmp.path().join("state").join("sb");
    assert!(dir.join("state.json").is_file());
    let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o700);

    let listed = engine.list_sandboxes().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].uses_id("sb"));
}

#[tokio::test]
async fn test_create_sandbox_twice_fails() {
    let tmp = TempDir::new().unwrap();
    let engine = LocalEngine::new(tmp.path().join("state"));
    let config = sandbox_config(tmp.path(), "sb", "/bin/true");

    engine.create_sandbox(&config).await.unwrap();
    let err = engine.create_sandbox(&config).await.unwrap_err();
    assert!(matches!(err, EngineError::SandboxExists(_)));
}

#[tokio::test]
async fn test_launch_failure() {
    let tmp = TempDir::new().unwrap();
    let engine = LocalEngine::new(tmp.path().join("state"));
    let config = sandbox_config(tmp.path(), "sb", "/nonexistent/hypervisor");

    let err = engine.create_sandbox(&config).await.unwrap_err();
    assert!(matches!(err, EngineError::LaunchFailed { .. }));
    assert!(engine.list_sandboxes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_container_in_sandbox() {
    let tmp = TempDir::new().unwrap();
    let engine = LocalEngine::new(tmp.path().join("state"));
    let sandbox = engine
        .create_sandbox(&sandbox_config(tmp.path(), "sb", "/bin/true"))
        .await
        .unwrap();

    let (updated, container) = engine
        .create_container("sb", &container_config(tmp.path(), "ctr"))
        .await
        .unwrap();
    assert_eq!(container.sandbox_id, "sb");
    assert_eq!(Some(container.pid), sandbox.representative_pid());
    assert_eq!(updated.containers.len(), 2);

    let listed = engine.list_sandboxes().await.unwrap();
    assert!(listed[0].uses_id("ctr"));

    let err = engine
        .create_container("sb", &container_config(tmp.path(), "ctr"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)));
}

#[tokio::test]
async fn test_create_container_missing_sandbox() {
    let tmp = TempDir::new().unwrap();
    let engine = LocalEngine::new(tmp.path().join("state"));
    let err = engine
        .create_container("nope", &container_config(tmp.path(), "ctr"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SandboxNotFound(id) if id == "nope"));
}

#[tokio::test]
async fn test_unrecorded_hypervisor_is_stopped() {
    let tmp = TempDir::new().unwrap();
    let pid_path = tmp.path().join("hypervisor.pid");
    let script = tmp.path().join("hypervisor.sh");
    std::fs::write(
        &script,
        format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_path.display()),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    // A regular file where the state directory should be makes saving fail.
    let state_root = tmp.path().join("state");
    std::fs::write(&state_root, "").unwrap();
    let engine = LocalEngine::new(&state_root);
    let config = sandbox_config(tmp.path(), "sb", &script.to_string_lossy());

    let started = std::time::Instant::now();
    let err = engine.create_sandbox(&config).await.unwrap_err();
    assert!(matches!(err, EngineError::Io(_)), "got {}", err);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));

    // The script may have been killed before it wrote its PID.
    if let Some(pid) = std::fs::read_to_string(&pid_path)
        .ok()
        .and_then(|s| s.trim().parse::<libc::pid_t>().ok())
    {
        // SAFETY: signal 0 only checks for existence.
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "hypervisor {} still running", pid);
    }
}

#[tokio::test]
async fn test_ids_must_name_one_directory() {
    let tmp = TempDir::new().unwrap();
    let state_root = tmp.path().join("state");
    let engine = LocalEngine::new(&state_root);

    let err = engine
        .create_container("../outside", &container_config(tmp.path(), "ctr"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)), "got {}", err);

    let err = engine
        .create_sandbox(&sandbox_config(tmp.path(), "../sb", "/bin/true"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(_)), "got {}", err);
    assert!(!tmp.path().join("sb").exists());
    assert!(!state_root.exists());
}

#[test]
fn test_hypervisor_args() {
    let tmp = TempDir::new().unwrap();
    let config = sandbox_config(tmp.path(), "sb", "/bin/true");
    let args: Vec<String> = hypervisor_args(&config)
        .into_iter()
        .map(|a| a.to_string_lossy().to_string())
        .collect();

    let value_of = |flag: &str| {
        let i = args.iter().position(|a| a == flag).unwrap();
        args[i + 1].clone()
    };
    assert_eq!(value_of("-append"), "quiet");
    assert_eq!(value_of("-smp"), "1");
    assert_eq!(value_of("-m"), "256M");
    assert_eq!(value_of("-name"), "sb");
}
