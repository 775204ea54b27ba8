//! Error types for the container-creation path.
//!
//! Every error maps to exactly one [`Phase`] of the create state machine so
//! callers (and the CLI) can report which step failed. Engine failures are
//! wrapped, never reinterpreted, so "my request was malformed" stays
//! distinguishable from "the sandbox engine rejected the request".

use crate::engine::EngineError;
use std::path::PathBuf;

/// Result type alias for create-path operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of the create state machine that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Argument, bundle and runtime-configuration checks.
    Validating,
    /// Container-type classification from annotations.
    Resolving,
    /// Building the sandbox config and calling the engine.
    CreatingSandbox,
    /// Building the container config and calling the engine.
    CreatingContainer,
    /// Resolving and materializing host cgroup directories.
    SettingUpCgroups,
    /// Writing the PID file.
    WritingPidFile,
    /// Delegated console setup.
    SettingUpConsole,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::Resolving => write!(f, "resolving"),
            Self::CreatingSandbox => write!(f, "creating sandbox"),
            Self::CreatingContainer => write!(f, "creating container"),
            Self::SettingUpCgroups => write!(f, "setting up cgroups"),
            Self::WritingPidFile => write!(f, "writing pid file"),
            Self::SettingUpConsole => write!(f, "setting up console"),
        }
    }
}

/// Errors that can occur while creating a sandbox or container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Validation Errors (no side effects)
    // =========================================================================
    /// Caller-contract violation (empty ID, missing bundle, duplicate ID...).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The bundle's config.json could not be read or parsed.
    #[error("invalid OCI spec at {path}: {reason}")]
    InvalidSpec { path: PathBuf, reason: String },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Unrecognized container-type annotation value.
    #[error("invalid container type '{value}' (annotation {annotation})")]
    InvalidContainerType { annotation: String, value: String },

    /// Container token used without a usable sandbox ID annotation.
    #[error("container type requires a non-empty {annotation} annotation")]
    MissingSandboxId { annotation: String },

    /// Sandbox ID annotation is not a usable identifier.
    #[error("invalid sandbox ID '{value}' (annotation {annotation}): {reason}")]
    InvalidSandboxId {
        annotation: String,
        value: String,
        reason: String,
    },

    // =========================================================================
    // Derived Configuration Errors
    // =========================================================================
    /// Derived sandbox/container configuration is invalid.
    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    // =========================================================================
    // Finalization Errors
    // =========================================================================
    /// Cgroup path resolution or materialization failed.
    #[error("cgroups setup failed at {path}: {reason}")]
    CgroupsSetupFailed { path: PathBuf, reason: String },

    /// PID file could not be written.
    #[error("could not {action} pid file {path}: {source}")]
    PidFileFailed {
        path: PathBuf,
        action: PidFileAction,
        #[source]
        source: std::io::Error,
    },

    /// Console collaborator failed.
    #[error("console setup failed: {0}")]
    ConsoleSetupFailed(String),

    // =========================================================================
    // Sandbox Engine Errors
    // =========================================================================
    /// Failure surfaced verbatim from the sandbox engine.
    #[error("sandbox engine error while {phase}: {source}")]
    Engine {
        phase: Phase,
        #[source]
        source: EngineError,
    },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// What the PID file manager was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidFileAction {
    /// Removing a stale file left at the target path.
    RemoveStale,
    /// Creating or writing the new file.
    Create,
}

impl std::fmt::Display for PidFileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RemoveStale => write!(f, "remove stale"),
            Self::Create => write!(f, "create"),
        }
    }
}

impl Error {
    /// Returns the create phase that produced this error.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::InvalidArguments(_) | Self::InvalidSpec { .. } => Phase::Validating,
            Self::InvalidContainerType { .. }
            | Self::MissingSandboxId { .. }
            | Self::InvalidSandboxId { .. } => Phase::Resolving,
            Self::ConfigValidation(_) => Phase::CreatingSandbox,
            Self::CgroupsSetupFailed { .. } => Phase::SettingUpCgroups,
            Self::PidFileFailed { .. } => Phase::WritingPidFile,
            Self::ConsoleSetupFailed(_) => Phase::SettingUpConsole,
            Self::Engine { phase, .. } => *phase,
            Self::Io(_) | Self::Serialization(_) => Phase::Validating,
        }
    }

    /// Returns true if the error came from the sandbox engine.
    #[must_use]
    pub fn is_engine_error(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }

    pub(crate) fn cgroups(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::CgroupsSetupFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
