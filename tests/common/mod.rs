//! Shared fixtures for integration tests.

#![allow(dead_code)]

use sandrun::config::{HypervisorConfig, RuntimeConfig, RuntimeSection};
use sandrun::constants::{CONTAINER_TYPE_ANNOTATION, SANDBOX_ID_ANNOTATION};
use sandrun::engine::mock::MockEngine;
use sandrun::engine::{Container, Sandbox};
use sandrun::spec::{
    config_path, read_config, write_config, OciCpu, OciLinux, OciMemory, OciMount, OciProcess,
    OciResources, OciRoot, OciSpec,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const TEST_CONTAINER_ID: &str = "test-container";
pub const TEST_SANDBOX_ID: &str = "test-sandbox";
pub const TEST_PID: u32 = 100;
pub const TEST_CONSOLE: &str = "/dev/pts/999";

/// Builds a minimal OCI spec with a memory limit, a relative cgroups path and
/// a cgroup mount.
pub fn test_spec() -> OciSpec {
    OciSpec {
        oci_version: "1.0.2".to_string(),
        root: Some(OciRoot {
            path: "rootfs".to_string(),
            ..Default::default()
        }),
        process: Some(OciProcess {
            terminal: true,
            args: vec!["sh".to_string()],
            cwd: "/".to_string(),
            ..Default::default()
        }),
        hostname: "sandrun-test".to_string(),
        mounts: vec![
            OciMount {
                destination: "/proc".to_string(),
                mount_type: "proc".to_string(),
                source: "proc".to_string(),
                ..Default::default()
            },
            OciMount {
                destination: "/sys/fs/cgroup".to_string(),
                mount_type: "cgroup".to_string(),
                source: "cgroup".to_string(),
                options: vec!["ro".to_string()],
                ..Default::default()
            },
        ],
        linux: Some(OciLinux {
            cgroups_path: "sandrun/test".to_string(),
            resources: Some(OciResources {
                memory: Some(OciMemory {
                    limit: Some(256 << 20),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Writes `spec` as a bundle under `dir/bundle` and returns the bundle path.
pub fn make_bundle(dir: &Path, spec: &OciSpec) -> PathBuf {
    let bundle = dir.join("bundle");
    std::fs::create_dir_all(bundle.join("rootfs")).unwrap();
    write_config(spec, &config_path(&bundle)).unwrap();
    bundle
}

/// Rewrites the bundle's annotations in place.
pub fn set_annotations(bundle: &Path, pairs: &[(&str, &str)]) {
    let path = config_path(bundle);
    let mut spec = read_config(&path).unwrap();
    spec.annotations = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    write_config(&spec, &path).unwrap();
}

/// Marks the bundle as a container in `TEST_SANDBOX_ID`.
pub fn annotate_as_container(bundle: &Path) {
    set_annotations(
        bundle,
        &[
            (CONTAINER_TYPE_ANNOTATION, "container"),
            (SANDBOX_ID_ANNOTATION, TEST_SANDBOX_ID),
        ],
    );
}

/// Returns a runtime config whose hypervisor files live under `dir`.
pub fn test_runtime_config(dir: &Path) -> RuntimeConfig {
    RuntimeConfig {
        hypervisor: HypervisorConfig {
            path: dir.join("hypervisor"),
            kernel: dir.join("kernel"),
            image: dir.join("image"),
            kernel_params: "quiet".to_string(),
            default_vcpus: 1,
            default_memory_mib: 512,
        },
        runtime: RuntimeSection {
            state_root: dir.join("state"),
            cgroups_root: Some(dir.join("cgroups")),
        },
    }
}

/// Adds a CPU quota to the OCI spec's resources.
pub fn with_cpu(mut spec: OciSpec, quota: i64, period: u64) -> OciSpec {
    spec.resources_mut().cpu = Some(OciCpu {
        quota: Some(quota),
        period: Some(period),
        ..Default::default()
    });
    spec
}

/// Sandbox with one container running as `TEST_PID`.
pub fn test_sandbox(id: &str) -> Sandbox {
    Sandbox {
        id: id.to_string(),
        containers: vec![Container {
            id: id.to_string(),
            sandbox_id: id.to_string(),
            pid: TEST_PID,
        }],
    }
}

/// Mock engine with no existing sandboxes whose create calls succeed.
pub fn succeeding_engine() -> MockEngine {
    MockEngine::new()
        .with_list(|| Ok(Vec::new()))
        .with_create_sandbox(|config| Ok(test_sandbox(&config.id)))
        .with_create_container(|sandbox_id, config| {
            let container = Container {
                id: config.id.clone(),
                sandbox_id: sandbox_id.to_string(),
                pid: TEST_PID,
            };
            let mut sandbox = test_sandbox(sandbox_id);
            sandbox.containers.push(container.clone());
            Ok((sandbox, container))
        })
}

/// Mock engine with no existing sandboxes and unconfigured create calls.
pub fn listing_only_engine() -> MockEngine {
    MockEngine::new().with_list(|| Ok(Vec::new()))
}

/// Returns true when running as root; permission tests skip themselves.
pub fn running_as_root() -> bool {
    // SAFETY: geteuid has no preconditions.
    unsafe { libc::geteuid() == 0 }
}
