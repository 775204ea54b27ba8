//! Sandbox Engine contract.
//!
//! The engine owns sandboxes (lightweight VMs) and the containers running in
//! them. The create path only consumes three operations:
//!
//! ```text
//! list_sandboxes()                      → [SandboxStatus]
//! create_sandbox(SandboxConfig)         → Sandbox
//! create_container(sandbox_id, config)  → (Sandbox, Container)
//! ```
//!
//! # Implementations
//!
//! - [`local::LocalEngine`]: state directory on the host, hypervisor launched
//!   as a detached child process.
//! - [`mock::MockEngine`]: closure-driven test double.

mod config;
pub mod local;
pub mod mock;

pub use config::{Cmd, ContainerConfig, HypervisorSpec, SandboxConfig, VmResources};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors raised by a sandbox engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Sandbox does not exist.
    #[error("sandbox not found: {0}")]
    SandboxNotFound(String),

    /// Sandbox ID already in use.
    #[error("sandbox already exists: {0}")]
    SandboxExists(String),

    /// Engine refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Hypervisor process could not be launched.
    #[error("failed to launch hypervisor {path}: {reason}")]
    LaunchFailed { path: String, reason: String },

    /// State persistence failed.
    #[error("engine state error: {0}")]
    State(String),

    /// I/O error inside the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure injected by [`mock::MockEngine`].
    #[error("mock engine: {0}")]
    Mock(String),
}

impl EngineError {
    /// Returns true if this error was produced by the mock engine.
    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Mock(_))
    }
}

// =============================================================================
// Engine Entities
// =============================================================================

/// A container as returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub id: String,
    pub sandbox_id: String,
    /// Host-visible PID representing the container's process.
    pub pid: u32,
}

/// A sandbox as returned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sandbox {
    pub id: String,
    pub containers: Vec<Container>,
}

impl Sandbox {
    /// PID of the sandbox's first container, used for cgroup membership and
    /// the PID file.
    pub fn representative_pid(&self) -> Option<u32> {
        self.containers.first().map(|c| c.pid)
    }
}

/// Observed sandbox state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxState {
    Ready,
    Running,
    Stopped,
}

/// Container entry in a sandbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub id: String,
    pub pid: u32,
}

/// Sandbox listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatus {
    pub id: String,
    pub state: SandboxState,
    pub containers: Vec<ContainerStatus>,
    pub created_at: DateTime<Utc>,
}

impl SandboxStatus {
    /// Returns true if `id` names this sandbox or one of its containers.
    pub fn uses_id(&self, id: &str) -> bool {
        self.id == id || self.containers.iter().any(|c| c.id == id)
    }
}

// =============================================================================
// Sandbox Engine Trait
// =============================================================================

/// Capability consumed by the create path.
///
/// Implementations must be `Send + Sync`; the create path holds one behind an
/// `Arc` and never mutates configs after handing them over.
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Lists known sandboxes.
    async fn list_sandboxes(&self) -> std::result::Result<Vec<SandboxStatus>, EngineError>;

    /// Creates a sandbox whose first container is described by
    /// `config.containers[0]`.
    async fn create_sandbox(
        &self,
        config: &SandboxConfig,
    ) -> std::result::Result<Sandbox, EngineError>;

    /// Creates a container inside an existing sandbox.
    async fn create_container(
        &self,
        sandbox_id: &str,
        config: &ContainerConfig,
    ) -> std::result::Result<(Sandbox, Container), EngineError>;
}
