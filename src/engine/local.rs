//! Host-local sandbox engine.
//!
//! Each sandbox is one hypervisor process launched detached from the
//! runtime, plus a state record on disk:
//!
//! ```text
//! <state_root>/
//! └── <sandbox-id>/
//!     └── state.json      SandboxRecord (configs, pids, creation time)
//! ```
//!
//! The hypervisor PID is the host-visible PID of every container in the
//! sandbox. Listing reports a sandbox as running while that PID is alive.

use super::{
    Container, ContainerConfig, ContainerStatus, EngineError, Sandbox, SandboxConfig,
    SandboxEngine, SandboxState, SandboxStatus,
};
use crate::constants::{validate_container_id, STATE_FILE_NAME};
use crate::kernel::format_kernel_params;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Persisted sandbox record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SandboxRecord {
    id: String,
    pid: u32,
    created_at: DateTime<Utc>,
    config: SandboxConfig,
    containers: Vec<ContainerRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerRecord {
    id: String,
    pid: u32,
    config: ContainerConfig,
}

impl SandboxRecord {
    fn sandbox(&self) -> Sandbox {
        Sandbox {
            id: self.id.clone(),
            containers: self
                .containers
                .iter()
                .map(|c| Container {
                    id: c.id.clone(),
                    sandbox_id: self.id.clone(),
                    pid: c.pid,
                })
                .collect(),
        }
    }

    fn status(&self) -> SandboxStatus {
        SandboxStatus {
            id: self.id.clone(),
            state: process_state(self.pid),
            containers: self
                .containers
                .iter()
                .map(|c| ContainerStatus {
                    id: c.id.clone(),
                    pid: c.pid,
                })
                .collect(),
            created_at: self.created_at,
        }
    }
}

/// Engine backed by a state directory and a hypervisor binary.
#[derive(Debug)]
pub struct LocalEngine {
    state_root: PathBuf,
    /// Serializes record updates within this process.
    lock: Mutex<()>,
}

impl LocalEngine {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, EngineError> {
        check_id("sandbox", id)?;
        Ok(self.state_root.join(id).join(STATE_FILE_NAME))
    }

    fn load(&self, id: &str) -> Result<SandboxRecord, EngineError> {
        let path = self.record_path(id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::SandboxNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| EngineError::State(format!("{}: {}", path.display(), e)))
    }

    fn save(&self, record: &SandboxRecord) -> Result<(), EngineError> {
        check_id("sandbox", &record.id)?;
        let dir = self.state_root.join(&record.id);
        create_private_dir(&dir)?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| EngineError::State(format!("serialize {}: {}", record.id, e)))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(dir.join(STATE_FILE_NAME))
            .map_err(|e| EngineError::Io(e.error))?;
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, EngineError> {
        self.lock
            .lock()
            .map_err(|e| EngineError::State(format!("lock poisoned: {}", e)))
    }
}

#[async_trait]
impl SandboxEngine for LocalEngine {
    async fn list_sandboxes(&self) -> Result<Vec<SandboxStatus>, EngineError> {
        let entries = match fs::read_dir(&self.state_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sandboxes = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().to_string();
            match self.load(&id) {
                Ok(record) => sandboxes.push(record.status()),
                Err(EngineError::SandboxNotFound(_)) => {}
                Err(e) => warn!(sandbox = %id, error = %e, "skipping unreadable sandbox record"),
            }
        }
        sandboxes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sandboxes)
    }

    async fn create_sandbox(&self, config: &SandboxConfig) -> Result<Sandbox, EngineError> {
        let _guard = self.guard()?;

        if self.record_path(&config.id)?.exists() {
            return Err(EngineError::SandboxExists(config.id.clone()));
        }
        let Some(first) = config.containers.first() else {
            return Err(EngineError::Rejected(format!(
                "sandbox {} has no containers",
                config.id
            )));
        };
        check_id("container", &first.id)?;

        let mut child = launch_hypervisor(config)?;
        let pid = child.id();
        info!(sandbox = %config.id, pid, "launched hypervisor");

        let record = SandboxRecord {
            id: config.id.clone(),
            pid,
            created_at: Utc::now(),
            config: config.clone(),
            containers: vec![ContainerRecord {
                id: first.id.clone(),
                pid,
                config: first.clone(),
            }],
        };
        if let Err(e) = self.save(&record) {
            warn!(
                sandbox = %config.id,
                pid,
                error = %e,
                "recording sandbox failed; stopping hypervisor"
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        // The hypervisor outlives this call; reap it now if it already exited.
        let _ = child.try_wait();
        Ok(record.sandbox())
    }

    async fn create_container(
        &self,
        sandbox_id: &str,
        config: &ContainerConfig,
    ) -> Result<(Sandbox, Container), EngineError> {
        let _guard = self.guard()?;
        check_id("container", &config.id)?;

        let mut record = self.load(sandbox_id)?;
        if record.containers.iter().any(|c| c.id == config.id) {
            return Err(EngineError::Rejected(format!(
                "container {} already exists in sandbox {}",
                config.id, sandbox_id
            )));
        }

        record.containers.push(ContainerRecord {
            id: config.id.clone(),
            pid: record.pid,
            config: config.clone(),
        });
        self.save(&record)?;
        debug!(sandbox = %sandbox_id, container = %config.id, "recorded container");

        let container = Container {
            id: config.id.clone(),
            sandbox_id: sandbox_id.to_string(),
            pid: record.pid,
        };
        Ok((record.sandbox(), container))
    }
}

// =============================================================================
// Hypervisor Process
// =============================================================================

/// Command-line arguments for the hypervisor.
pub fn hypervisor_args(config: &SandboxConfig) -> Vec<OsString> {
    let hv = &config.hypervisor;
    let mut args: Vec<OsString> = Vec::new();
    args.push("-name".into());
    args.push(config.id.clone().into());
    args.push("-kernel".into());
    args.push(hv.kernel.clone().into_os_string());
    let mut drive = OsString::from("file=");
    drive.push(&hv.image);
    drive.push(",format=raw,if=virtio,readonly=on");
    args.push("-drive".into());
    args.push(drive);
    args.push("-append".into());
    args.push(format_kernel_params(&hv.kernel_params).into());
    args.push("-smp".into());
    args.push(config.vm.vcpus.to_string().into());
    args.push("-m".into());
    args.push(format!("{}M", config.vm.memory_mib).into());
    args.push("-nographic".into());
    args
}

fn launch_hypervisor(config: &SandboxConfig) -> Result<Child, EngineError> {
    use std::os::unix::process::CommandExt;

    let path = &config.hypervisor.path;
    Command::new(path)
        .args(hypervisor_args(config))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| EngineError::LaunchFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Rejects IDs that cannot name a single directory under the state root.
fn check_id(kind: &str, id: &str) -> Result<(), EngineError> {
    validate_container_id(id).map_err(|reason| {
        EngineError::Rejected(format!("invalid {} ID {:?}: {}", kind, id, reason))
    })
}

fn process_state(pid: u32) -> SandboxState {
    if pid == 0 {
        return SandboxState::Ready;
    }
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return SandboxState::Stopped;
    };
    // SAFETY: signal 0 only checks for existence and permission.
    let alive = unsafe { libc::kill(pid, 0) } == 0
        || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM);
    if alive {
        SandboxState::Running
    } else {
        SandboxState::Stopped
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}
