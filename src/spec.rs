//! OCI runtime spec (`config.json`) model.
//!
//! Only the fields the create path acts on are typed. Unknown fields are kept
//! in `extra` maps, so annotations and unrecognized keys survive a read and
//! write back unchanged. Typed fields may be written with their defaults even
//! when the input omitted them.

use crate::constants::{CGROUP_MOUNT_TYPE, CONFIG_FILE_NAME};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

type Extra = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// OCI Runtime Spec Types
// =============================================================================

/// OCI Runtime Spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciSpec {
    #[serde(default)]
    pub oci_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<OciRoot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<OciProcess>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
    #[serde(default)]
    pub mounts: Vec<OciMount>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<OciLinux>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI root filesystem config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciRoot {
    pub path: String,
    #[serde(default)]
    pub readonly: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI process config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciProcess {
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub user: OciUser,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub cwd: String,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI user config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciUser {
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI mount config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciMount {
    pub destination: String,
    #[serde(rename = "type", default)]
    pub mount_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI Linux-specific config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciLinux {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cgroups_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<OciResources>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI resource limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<OciMemory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<OciCpu>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI memory limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// OCI CPU limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OciCpu {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<u64>,
    #[serde(flatten)]
    pub extra: Extra,
}

// =============================================================================
// Queries
// =============================================================================

impl OciSpec {
    /// Returns the declared resources, if any.
    pub fn resources(&self) -> Option<&OciResources> {
        self.linux.as_ref().and_then(|l| l.resources.as_ref())
    }

    /// Returns the declared memory limit in bytes.
    pub fn memory_limit(&self) -> Option<i64> {
        self.resources()
            .and_then(|r| r.memory.as_ref())
            .and_then(|m| m.limit)
    }

    /// Returns true if a CPU quota or period is declared.
    pub fn has_cpu_limit(&self) -> bool {
        self.resources()
            .and_then(|r| r.cpu.as_ref())
            .is_some_and(|c| c.quota.is_some() || c.period.is_some())
    }

    /// Returns true if the OCI spec declares memory or CPU limits.
    pub fn has_resource_limits(&self) -> bool {
        self.memory_limit().is_some() || self.has_cpu_limit()
    }

    /// Returns `linux.cgroupsPath`, empty when unset.
    pub fn cgroups_path(&self) -> &str {
        self.linux.as_ref().map_or("", |l| l.cgroups_path.as_str())
    }

    /// Returns the first mount of the cgroup filesystem type.
    pub fn cgroup_mount(&self) -> Option<&OciMount> {
        self.mounts
            .iter()
            .find(|m| m.mount_type == CGROUP_MOUNT_TYPE)
    }

    /// Returns true if the process requests a terminal.
    pub fn terminal(&self) -> bool {
        self.process.as_ref().is_some_and(|p| p.terminal)
    }

    /// Returns the mutable `linux.resources` section, creating it if needed.
    pub fn resources_mut(&mut self) -> &mut OciResources {
        self.linux
            .get_or_insert_with(OciLinux::default)
            .resources
            .get_or_insert_with(OciResources::default)
    }
}

// =============================================================================
// Reading and Writing
// =============================================================================

/// Returns the config.json path for a bundle directory.
pub fn config_path(bundle: &Path) -> PathBuf {
    bundle.join(CONFIG_FILE_NAME)
}

/// Reads and parses an OCI spec document.
pub fn read_config(path: &Path) -> Result<OciSpec> {
    let content = fs::read_to_string(path).map_err(|e| Error::InvalidSpec {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let spec: OciSpec = serde_json::from_str(&content).map_err(|e| Error::InvalidSpec {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    debug!(path = %path.display(), annotations = spec.annotations.len(), "loaded OCI spec");
    Ok(spec)
}

/// Serializes an OCI spec document, replacing any existing file.
pub fn write_config(spec: &OciSpec, path: &Path) -> Result<()> {
    let json =
        serde_json::to_string_pretty(spec).map_err(|e| Error::Serialization(e.to_string()))?;
    fs::write(path, json)?;
    Ok(())
}
