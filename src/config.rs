//! Runtime configuration.
//!
//! Loaded once at startup from a TOML file and passed by reference into the
//! create path. Nothing in this crate mutates it afterwards.
//!
//! ```toml
//! [hypervisor]
//! path = "/usr/bin/qemu-system-x86_64"
//! kernel = "/usr/share/sandrun/vmlinuz"
//! image = "/usr/share/sandrun/rootfs.img"
//! kernel_params = "quiet systemd.show_status=false"
//! default_vcpus = 1
//! default_memory_mib = 2048
//!
//! [runtime]
//! state_root = "/run/sandrun"
//! cgroups_root = "/sys/fs/cgroup"
//! ```

use crate::constants::{
    CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH, DEFAULT_STATE_ROOT, DEFAULT_VCPUS, DEFAULT_VM_MEMORY_MIB,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Hypervisor used to boot sandbox VMs.
    #[serde(default)]
    pub hypervisor: HypervisorConfig,
    /// Host-side runtime settings.
    #[serde(default)]
    pub runtime: RuntimeSection,
}

/// Hypervisor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypervisorConfig {
    /// Hypervisor binary.
    #[serde(default)]
    pub path: PathBuf,
    /// Guest kernel image.
    #[serde(default)]
    pub kernel: PathBuf,
    /// Guest root filesystem image.
    #[serde(default)]
    pub image: PathBuf,
    /// Extra kernel command line, space separated `key=value` tokens.
    #[serde(default)]
    pub kernel_params: String,
    /// vCPUs when the OCI spec has no CPU limit.
    #[serde(default = "default_vcpus")]
    pub default_vcpus: u32,
    /// Memory (MiB) when the OCI spec has no memory limit.
    #[serde(default = "default_memory_mib")]
    pub default_memory_mib: u32,
}

fn default_vcpus() -> u32 {
    DEFAULT_VCPUS
}

fn default_memory_mib() -> u32 {
    DEFAULT_VM_MEMORY_MIB
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            kernel: PathBuf::new(),
            image: PathBuf::new(),
            kernel_params: String::new(),
            default_vcpus: DEFAULT_VCPUS,
            default_memory_mib: DEFAULT_VM_MEMORY_MIB,
        }
    }
}

/// Host-side runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Directory holding per-sandbox state.
    #[serde(default = "default_state_root")]
    pub state_root: PathBuf,
    /// Cgroups root; detected from the mount table when unset.
    #[serde(default)]
    pub cgroups_root: Option<PathBuf>,
}

fn default_state_root() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_ROOT)
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            state_root: default_state_root(),
            cgroups_root: None,
        }
    }
}

impl RuntimeConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidArguments(format!(
                "cannot read runtime configuration {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded runtime configuration");
        Ok(config)
    }

    /// Picks the configuration file: explicit path, then the
    /// `SANDRUN_CONFIG` environment variable, then the system default.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        std::env::var_os(CONFIG_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Checks that the configuration can boot a sandbox.
    pub fn validate(&self) -> Result<()> {
        let hv = &self.hypervisor;
        for (name, value) in [("path", &hv.path), ("kernel", &hv.kernel), ("image", &hv.image)] {
            if value.as_os_str().is_empty() {
                return Err(Error::InvalidArguments(format!(
                    "runtime configuration: hypervisor {} is not set",
                    name
                )));
            }
        }
        if hv.default_vcpus == 0 {
            return Err(Error::InvalidArguments(
                "runtime configuration: default_vcpus must be at least 1".to_string(),
            ));
        }
        if hv.default_memory_mib == 0 {
            return Err(Error::InvalidArguments(
                "runtime configuration: default_memory_mib must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [hypervisor]
            path = "/usr/bin/qemu"
            kernel = "/k"
            image = "/i"
            "#,
        )
        .unwrap();
        assert_eq!(config.hypervisor.default_vcpus, DEFAULT_VCPUS);
        assert_eq!(config.runtime.state_root, PathBuf::from(DEFAULT_STATE_ROOT));
        assert!(config.runtime.cgroups_root.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_is_invalid() {
        let err = RuntimeConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("hypervisor path"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = RuntimeConfig::locate(Some(Path::new("/tmp/x.toml")));
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
    }
}
