//! Host cgroup accounting for sandboxes.
//!
//! Computes one directory per controller implicated by the OCI spec's resource
//! limits and places the sandbox's representative process into each of them
//! by writing its PID to `tasks` and `cgroup.procs`.
//!
//! ```text
//! linux.cgroupsPath      result
//! ─────────────────      ───────────────────────────────────────────
//! ""                     no directories
//! "/abs/path"            ["/abs/path"]  (must already exist)
//! "rel/path"             ["<root>/memory/rel/path", "<root>/cpu/rel/path"]
//! "../x"                 error (may not leave the root)
//! ```
//!
//! Directories created before a failure are left in place.

use crate::constants::{
    CGROUPS_PROCS_FILE, CGROUPS_TASKS_FILE, CPU_CONTROLLER, DEFAULT_CGROUPS_ROOT, MEMORY_CONTROLLER,
    PROC_MOUNTINFO,
};
use crate::error::{Error, Result};
use crate::spec::OciSpec;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

// =============================================================================
// Cgroups Root
// =============================================================================

/// Runtime-wide cgroups configuration.
///
/// Built once at startup and handed to [`CgroupManager::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupsConfig {
    root: PathBuf,
}

impl CgroupsConfig {
    /// Uses an explicit cgroups root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Detects the cgroups root from the mount table, falling back to
    /// `/sys/fs/cgroup`.
    pub fn detect() -> Self {
        let root = fs::read_to_string(PROC_MOUNTINFO)
            .ok()
            .and_then(|content| cgroups_root_from_mountinfo(&content))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CGROUPS_ROOT));
        debug!(root = %root.display(), "detected cgroups root");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for CgroupsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CGROUPS_ROOT)
    }
}

/// Extracts the cgroups root from `/proc/self/mountinfo` content.
///
/// Takes the first `cgroup` mount and returns its mount point's parent
/// (`/sys/fs/cgroup/memory` → `/sys/fs/cgroup`). A unified `cgroup2` mount is
/// the root itself.
pub fn cgroups_root_from_mountinfo(content: &str) -> Option<PathBuf> {
    for line in content.lines() {
        // <id> <parent> <maj:min> <root> <mount point> <options> [optional...] - <fstype> <source> <super>
        let Some((pre, post)) = line.split_once(" - ") else {
            continue;
        };
        let Some(fstype) = post.split_whitespace().next() else {
            continue;
        };
        let Some(mount_point) = pre.split_whitespace().nth(4) else {
            continue;
        };
        let mount_point = Path::new(mount_point);
        match fstype {
            "cgroup" => return mount_point.parent().map(Path::to_path_buf),
            "cgroup2" => return Some(mount_point.to_path_buf()),
            _ => {}
        }
    }
    None
}

/// True when joining `path` onto a directory cannot leave that directory.
fn stays_under_root(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// =============================================================================
// Cgroup Manager
// =============================================================================

/// Resolves and materializes sandbox cgroup directories.
#[derive(Debug, Clone)]
pub struct CgroupManager {
    config: CgroupsConfig,
}

impl CgroupManager {
    pub fn new(config: CgroupsConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        self.config.root()
    }

    /// Computes the cgroup directories for a spec.
    ///
    /// Returns `Ok(None)` when the OCI spec declares no memory or CPU limits.
    /// Limits without a cgroup mount in `mounts[]` are an error, as is an
    /// absolute `cgroupsPath` that is not an existing directory, and a
    /// relative one with `..` components.
    pub fn resolve(&self, spec: &OciSpec) -> Result<Option<Vec<PathBuf>>> {
        if !spec.has_resource_limits() {
            return Ok(None);
        }

        let cgroups_path = spec.cgroups_path();

        if spec.cgroup_mount().is_none() {
            return Err(Error::cgroups(
                cgroups_path,
                "cgroup support requested but no cgroup mount present",
            ));
        }

        if cgroups_path.is_empty() {
            return Ok(Some(Vec::new()));
        }

        let path = Path::new(cgroups_path);
        if path.is_absolute() {
            let meta = fs::metadata(path).map_err(|e| Error::cgroups(path, e))?;
            if !meta.is_dir() {
                return Err(Error::cgroups(path, "not a directory"));
            }
            return Ok(Some(vec![path.to_path_buf()]));
        }
        if !stays_under_root(path) {
            return Err(Error::cgroups(path, "cgroups path escapes the cgroups root"));
        }

        let paths = self
            .controllers(spec)
            .into_iter()
            .map(|controller| self.config.root().join(controller).join(path))
            .collect();
        Ok(Some(paths))
    }

    /// Creates each directory and writes `pid` into its membership files.
    pub fn materialize(&self, paths: &[PathBuf], pid: u32) -> Result<()> {
        create_cgroups_files(paths, pid)
    }

    fn controllers(&self, spec: &OciSpec) -> Vec<&'static str> {
        let mut controllers = Vec::with_capacity(2);
        if spec.memory_limit().is_some() {
            controllers.push(MEMORY_CONTROLLER);
        }
        if spec.has_cpu_limit() {
            controllers.push(CPU_CONTROLLER);
        }
        controllers
    }
}

/// Creates each cgroup directory (and parents) and writes the decimal `pid`
/// with no trailing newline into `tasks` and `cgroup.procs`, overwriting
/// prior contents. An empty list is a no-op.
pub fn create_cgroups_files(paths: &[PathBuf], pid: u32) -> Result<()> {
    let pid = pid.to_string();

    for dir in paths {
        fs::create_dir_all(dir).map_err(|e| Error::cgroups(dir, e))?;

        for name in [CGROUPS_TASKS_FILE, CGROUPS_PROCS_FILE] {
            let file = dir.join(name);
            fs::write(&file, &pid).map_err(|e| Error::cgroups(&file, e))?;
        }

        info!(path = %dir.display(), pid = %pid, "joined cgroup");
    }

    Ok(())
}
