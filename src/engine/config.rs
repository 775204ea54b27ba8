//! Sandbox and container configs derived from an OCI spec.
//!
//! Built fresh for every engine call and never mutated afterwards.

use crate::config::{HypervisorConfig, RuntimeConfig};
use crate::constants::{BUNDLE_PATH_ANNOTATION, RESOLVED_TYPE_ANNOTATION};
use crate::error::{Error, Result};
use crate::kernel::Param;
use crate::resolver::ContainerType;
use crate::spec::{OciMount, OciSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// OCI "no limit" sentinel for quota and memory.
const UNLIMITED: i64 = -1;

/// Hypervisor settings for one sandbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypervisorSpec {
    pub path: PathBuf,
    pub kernel: PathBuf,
    pub image: PathBuf,
    pub kernel_params: Vec<Param>,
}

/// VM sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmResources {
    pub vcpus: u32,
    pub memory_mib: u32,
}

/// Process to run inside the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cmd {
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    pub uid: u32,
    pub gid: u32,
    /// Console device path; empty when the process has no console.
    pub console: String,
    /// Process requested a terminal.
    pub interactive: bool,
    pub detach: bool,
}

/// Container configuration handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub id: String,
    pub rootfs: PathBuf,
    pub readonly: bool,
    pub cmd: Cmd,
    pub mounts: Vec<OciMount>,
    pub annotations: HashMap<String, String>,
}

/// Sandbox configuration handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub id: String,
    pub hostname: String,
    pub hypervisor: HypervisorSpec,
    pub vm: VmResources,
    pub annotations: HashMap<String, String>,
    pub containers: Vec<ContainerConfig>,
}

impl ContainerConfig {
    /// Derives a container config from the OCI spec and request identity.
    pub fn from_spec(
        spec: &OciSpec,
        container_id: &str,
        bundle: &Path,
        console: &str,
        detach: bool,
        container_type: &ContainerType,
    ) -> Self {
        let (root_path, readonly) = spec
            .root
            .as_ref()
            .map_or(("rootfs", false), |r| (r.path.as_str(), r.readonly));
        let rootfs = if Path::new(root_path).is_absolute() {
            PathBuf::from(root_path)
        } else {
            bundle.join(root_path)
        };

        let cmd = match &spec.process {
            Some(p) => Cmd {
                args: p.args.clone(),
                env: p.env.clone(),
                cwd: if p.cwd.is_empty() { "/".to_string() } else { p.cwd.clone() },
                uid: p.user.uid,
                gid: p.user.gid,
                console: console.to_string(),
                interactive: p.terminal,
                detach,
            },
            None => Cmd {
                cwd: "/".to_string(),
                console: console.to_string(),
                detach,
                ..Default::default()
            },
        };

        let mut annotations = spec.annotations.clone();
        annotations.insert(
            BUNDLE_PATH_ANNOTATION.to_string(),
            bundle.to_string_lossy().to_string(),
        );
        annotations.insert(
            RESOLVED_TYPE_ANNOTATION.to_string(),
            container_type.token().to_string(),
        );

        Self {
            id: container_id.to_string(),
            rootfs,
            readonly,
            cmd,
            mounts: spec.mounts.clone(),
            annotations,
        }
    }
}

impl SandboxConfig {
    /// Derives a sandbox config. The sandbox takes the container's ID and
    /// holds that container as its first entry.
    ///
    /// `kernel_params` must already be validated by the caller.
    pub fn from_spec(
        spec: &OciSpec,
        runtime: &RuntimeConfig,
        container_id: &str,
        bundle: &Path,
        console: &str,
        detach: bool,
        kernel_params: Vec<Param>,
    ) -> Result<Self> {
        let vm = vm_resources(spec, &runtime.hypervisor)?;
        let container = ContainerConfig::from_spec(
            spec,
            container_id,
            bundle,
            console,
            detach,
            &ContainerType::NewSandbox,
        );

        let hostname = if spec.hostname.is_empty() {
            container_id.to_string()
        } else {
            spec.hostname.clone()
        };

        Ok(Self {
            id: container_id.to_string(),
            hostname,
            hypervisor: HypervisorSpec {
                path: runtime.hypervisor.path.clone(),
                kernel: runtime.hypervisor.kernel.clone(),
                image: runtime.hypervisor.image.clone(),
                kernel_params,
            },
            vm,
            annotations: spec.annotations.clone(),
            containers: vec![container],
        })
    }
}

/// Sizes the VM from the OCI spec's resource limits.
///
/// Memory is `limit >> 20` MiB and CPU is `ceil(quota / period)` vCPUs; both
/// fall back to the hypervisor defaults when absent, unlimited, or rounding
/// to zero.
pub fn vm_resources(spec: &OciSpec, hv: &HypervisorConfig) -> Result<VmResources> {
    let mut vm = VmResources {
        vcpus: hv.default_vcpus,
        memory_mib: hv.default_memory_mib,
    };

    if let Some(limit) = spec.memory_limit() {
        if limit < 0 && limit != UNLIMITED {
            return Err(Error::ConfigValidation(format!(
                "invalid memory limit {}",
                limit
            )));
        }
        let mib = u32::try_from(limit.max(0) >> 20).unwrap_or(u32::MAX);
        if mib > 0 {
            vm.memory_mib = mib;
        }
    }

    let Some(cpu) = spec.resources().and_then(|r| r.cpu.as_ref()) else {
        return Ok(vm);
    };

    if let Some(quota) = cpu.quota {
        if quota <= 0 && quota != UNLIMITED {
            return Err(Error::ConfigValidation(format!("invalid CPU quota {}", quota)));
        }
    }
    if cpu.period == Some(0) {
        return Err(Error::ConfigValidation("invalid CPU period 0".to_string()));
    }

    if let (Some(quota), Some(period)) = (cpu.quota, cpu.period) {
        if quota > 0 {
            let vcpus = (quota as u64).div_ceil(period);
            vm.vcpus = u32::try_from(vcpus).unwrap_or(u32::MAX).max(1);
        }
    }

    Ok(vm)
}
