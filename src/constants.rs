//! # Runtime Constants
//!
//! Annotation keys, cgroup file names, default paths and input bounds for the
//! create path. These are the single source of truth; other modules refer to
//! them rather than repeating literals.

// =============================================================================
// Annotations
// =============================================================================
//
// Upstream orchestrators (CRI-O style) tag each bundle with the kind of
// request it represents. A missing container-type annotation means "start a
// new sandbox".
// =============================================================================

/// Annotation key carrying the container type.
pub const CONTAINER_TYPE_ANNOTATION: &str = "io.kubernetes.cri-o.ContainerType";

/// Annotation key carrying the target sandbox ID for the container token.
pub const SANDBOX_ID_ANNOTATION: &str = "io.kubernetes.cri-o.SandboxID";

/// Container-type token requesting a new sandbox.
pub const CONTAINER_TYPE_SANDBOX: &str = "sandbox";

/// Container-type token requesting a container inside an existing sandbox.
pub const CONTAINER_TYPE_CONTAINER: &str = "container";

/// Annotation recorded on container configs with the absolute bundle path.
pub const BUNDLE_PATH_ANNOTATION: &str = "io.sandrun.bundle-path";

/// Annotation recorded on container configs with the resolved container type.
pub const RESOLVED_TYPE_ANNOTATION: &str = "io.sandrun.container-type";

// =============================================================================
// Bundle Layout
// =============================================================================

/// Name of the OCI spec document inside a bundle.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Mount type that marks a cgroup filesystem in `mounts[]`.
pub const CGROUP_MOUNT_TYPE: &str = "cgroup";

// =============================================================================
// Cgroups
// =============================================================================

/// Thread membership file inside a cgroup directory.
pub const CGROUPS_TASKS_FILE: &str = "tasks";

/// Process membership file inside a cgroup directory.
pub const CGROUPS_PROCS_FILE: &str = "cgroup.procs";

/// Memory controller directory name.
pub const MEMORY_CONTROLLER: &str = "memory";

/// CPU controller directory name.
pub const CPU_CONTROLLER: &str = "cpu";

/// Cgroups root used when nothing is configured and detection fails.
pub const DEFAULT_CGROUPS_ROOT: &str = "/sys/fs/cgroup";

/// Mount table consulted to detect the cgroups root.
pub const PROC_MOUNTINFO: &str = "/proc/self/mountinfo";

// =============================================================================
// Paths and Configuration
// =============================================================================

/// Default runtime configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sandrun/configuration.toml";

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV_VAR: &str = "SANDRUN_CONFIG";

/// Default directory holding per-sandbox state.
pub const DEFAULT_STATE_ROOT: &str = "/run/sandrun";

/// Per-sandbox state file name.
pub const STATE_FILE_NAME: &str = "state.json";

/// Default vCPUs for a sandbox VM when neither spec nor config says otherwise.
pub const DEFAULT_VCPUS: u32 = 1;

/// Default sandbox VM memory (MiB).
pub const DEFAULT_VM_MEMORY_MIB: u32 = 2048;

// =============================================================================
// Container ID Validation
// =============================================================================

/// Valid characters for container IDs.
///
/// Excludes `/` so IDs can be used as path components under the state root.
pub const CONTAINER_ID_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.";

/// Maximum container ID length.
pub const MAX_CONTAINER_ID_LEN: usize = 128;

/// Validates a container ID.
///
/// IDs must be non-empty, at most [`MAX_CONTAINER_ID_LEN`] bytes, built from
/// [`CONTAINER_ID_VALID_CHARS`], and must not start with `.` or `-`.
#[inline]
#[must_use = "validation result must be checked to ensure container ID is safe"]
pub fn validate_container_id(id: &str) -> std::result::Result<(), &'static str> {
    if id.is_empty() {
        return Err("container ID cannot be empty");
    }
    if id.len() > MAX_CONTAINER_ID_LEN {
        return Err("container ID exceeds maximum length");
    }
    if id.starts_with('.') || id.starts_with('-') {
        return Err("container ID cannot start with '.' or '-'");
    }
    if !id.chars().all(|c| CONTAINER_ID_VALID_CHARS.contains(c)) {
        return Err("container ID contains invalid characters");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_container_id() {
        assert!(validate_container_id("abc-123_x.y").is_ok());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id("../escape").is_err());
        assert!(validate_container_id("-flag").is_err());
        assert!(validate_container_id("a/b").is_err());
        assert!(validate_container_id(&"a".repeat(MAX_CONTAINER_ID_LEN + 1)).is_err());
    }
}
