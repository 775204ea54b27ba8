//! Creation orchestrator.
//!
//! Sequences one `create` invocation:
//!
//! ```text
//! Validating ──► Resolving ──┬──► CreatingSandbox ──► SettingUpCgroups ──┐
//!                            │                                           ├──► WritingPidFile ──► SettingUpConsole ──► Done
//!                            └──► CreatingContainer ─────────────────────┘
//! ```
//!
//! Every phase can fail; the first failure ends the invocation and is
//! returned tagged with its [`Phase`](crate::error::Phase). Validation and
//! resolution have no side effects. Once the engine has created something,
//! later failures hand the sandbox to the configured [`FinalizePolicy`].

use crate::cgroups::CgroupManager;
use crate::config::RuntimeConfig;
use crate::console::{ConsoleSetup, NoConsole};
use crate::constants::validate_container_id;
use crate::engine::{
    Container, ContainerConfig, EngineError, Sandbox, SandboxConfig, SandboxEngine,
};
use crate::error::{Error, Phase, Result};
use crate::kernel::{
    find_invalid_param, parse_kernel_params, DefaultKernelParams, KernelParamsBuilder,
};
use crate::pidfile::write_pid_file;
use crate::resolver::{resolve, ContainerType};
use crate::spec::{config_path, read_config, OciSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Request
// =============================================================================

/// Arguments of one create invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub container_id: String,
    pub bundle: PathBuf,
    /// Console device path; empty for none.
    pub console: String,
    /// PID file path; empty for none.
    pub pid_file: PathBuf,
    pub detach: bool,
}

impl CreateRequest {
    pub fn new(container_id: impl Into<String>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            container_id: container_id.into(),
            bundle: bundle.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_console(mut self, console: impl Into<String>) -> Self {
        self.console = console.into();
        self
    }

    #[must_use]
    pub fn with_pid_file(mut self, pid_file: impl Into<PathBuf>) -> Self {
        self.pid_file = pid_file.into();
        self
    }

    #[must_use]
    pub fn with_detach(mut self, detach: bool) -> Self {
        self.detach = detach;
        self
    }
}

// =============================================================================
// Finalize Policy
// =============================================================================

/// Decides what happens to a created sandbox when a later phase fails.
pub trait FinalizePolicy: Send + Sync {
    fn abandon(&self, sandbox: &Sandbox, failed: &Error);
}

/// Keeps the sandbox and logs that it was left behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaveInPlace;

impl FinalizePolicy for LeaveInPlace {
    fn abandon(&self, sandbox: &Sandbox, failed: &Error) {
        warn!(
            sandbox_id = %sandbox.id,
            phase = %failed.phase(),
            error = %failed,
            "create failed after sandbox was created; leaving it in place"
        );
    }
}

// =============================================================================
// Creator
// =============================================================================

/// Runs create invocations against a sandbox engine.
pub struct Creator {
    engine: Arc<dyn SandboxEngine>,
    cgroups: CgroupManager,
    kernel_params: Box<dyn KernelParamsBuilder>,
    console: Box<dyn ConsoleSetup>,
    finalize: Box<dyn FinalizePolicy>,
}

impl std::fmt::Debug for Creator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creator")
            .field("cgroups", &self.cgroups)
            .finish_non_exhaustive()
    }
}

impl Creator {
    /// Builds a creator with the default kernel params, no console hand-off,
    /// and the leave-in-place finalize policy.
    pub fn new(engine: Arc<dyn SandboxEngine>, cgroups: CgroupManager) -> Self {
        Self {
            engine,
            cgroups,
            kernel_params: Box::new(DefaultKernelParams),
            console: Box::new(NoConsole),
            finalize: Box::new(LeaveInPlace),
        }
    }

    #[must_use]
    pub fn with_kernel_params(mut self, builder: Box<dyn KernelParamsBuilder>) -> Self {
        self.kernel_params = builder;
        self
    }

    #[must_use]
    pub fn with_console(mut self, console: Box<dyn ConsoleSetup>) -> Self {
        self.console = console;
        self
    }

    #[must_use]
    pub fn with_finalize_policy(mut self, policy: Box<dyn FinalizePolicy>) -> Self {
        self.finalize = policy;
        self
    }

    /// Creates a sandbox or a container in an existing sandbox, depending on
    /// the bundle's annotations.
    pub async fn create(&self, request: &CreateRequest, runtime: &RuntimeConfig) -> Result<()> {
        let container_id = request.container_id.as_str();
        info!(container_id, bundle = %request.bundle.display(), "creating");

        let (bundle, spec) = self.validate(request, runtime).await?;

        let container_type = resolve(&spec.annotations)?;
        debug!(
            container_id,
            container_type = container_type.token(),
            "resolved container type"
        );

        match container_type {
            ContainerType::NewSandbox => {
                let sandbox = self
                    .create_sandbox(
                        &spec,
                        runtime,
                        container_id,
                        &bundle,
                        &request.console,
                        request.detach,
                    )
                    .await?;
                let pid = self.finalize_step(&sandbox, representative_pid(&sandbox))?;
                self.finalize_step(&sandbox, self.setup_cgroups(&spec, pid))?;
                self.finalize_step(&sandbox, self.finish(request, pid))?;
                info!(container_id, sandbox_id = %sandbox.id, pid, "sandbox created");
            }
            ContainerType::ContainerInSandbox { .. } => {
                let (sandbox, container) = self
                    .create_container(
                        &spec,
                        container_id,
                        &bundle,
                        &request.console,
                        request.detach,
                    )
                    .await?;
                self.finish(request, container.pid)?;
                info!(
                    container_id,
                    sandbox_id = %sandbox.id,
                    pid = container.pid,
                    "container created"
                );
            }
        }

        Ok(())
    }

    /// Creates a new sandbox whose first container is `container_id`.
    ///
    /// Kernel params are validated before the engine is called.
    pub async fn create_sandbox(
        &self,
        spec: &OciSpec,
        runtime: &RuntimeConfig,
        container_id: &str,
        bundle: &Path,
        console: &str,
        detach: bool,
    ) -> Result<Sandbox> {
        let mut params = parse_kernel_params(&runtime.hypervisor.kernel_params);
        params.extend(self.kernel_params.kernel_params(container_id));
        if let Some(param) = find_invalid_param(&params) {
            return Err(Error::ConfigValidation(format!(
                "kernel parameter with empty key (value {:?})",
                param.value
            )));
        }

        let config =
            SandboxConfig::from_spec(spec, runtime, container_id, bundle, console, detach, params)?;
        debug!(
            sandbox_id = %config.id,
            vcpus = config.vm.vcpus,
            memory_mib = config.vm.memory_mib,
            "calling engine to create sandbox"
        );

        self.engine
            .create_sandbox(&config)
            .await
            .map_err(|source| Error::Engine {
                phase: Phase::CreatingSandbox,
                source,
            })
    }

    /// Creates `container_id` inside the sandbox named by the OCI spec's
    /// annotations.
    pub async fn create_container(
        &self,
        spec: &OciSpec,
        container_id: &str,
        bundle: &Path,
        console: &str,
        detach: bool,
    ) -> Result<(Sandbox, Container)> {
        let container_type = resolve(&spec.annotations)?;
        let ContainerType::ContainerInSandbox { sandbox_id } = &container_type else {
            return Err(Error::InvalidArguments(format!(
                "container {} is not annotated as a container in an existing sandbox",
                container_id
            )));
        };

        let config = ContainerConfig::from_spec(
            spec,
            container_id,
            bundle,
            console,
            detach,
            &container_type,
        );
        debug!(container_id, sandbox_id = %sandbox_id, "calling engine to create container");

        self.engine
            .create_container(sandbox_id, &config)
            .await
            .map_err(|source| Error::Engine {
                phase: Phase::CreatingContainer,
                source,
            })
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// Argument, bundle, configuration and duplicate checks. Returns the
    /// canonical bundle path and the parsed spec.
    async fn validate(
        &self,
        request: &CreateRequest,
        runtime: &RuntimeConfig,
    ) -> Result<(PathBuf, OciSpec)> {
        if request.container_id.is_empty() {
            return Err(Error::InvalidArguments("missing container ID".to_string()));
        }
        if request.bundle.as_os_str().is_empty() {
            return Err(Error::InvalidArguments("missing bundle path".to_string()));
        }
        validate_container_id(&request.container_id).map_err(|reason| {
            Error::InvalidArguments(format!(
                "container ID {:?}: {}",
                request.container_id, reason
            ))
        })?;

        if !request.bundle.is_dir() {
            return Err(Error::InvalidArguments(format!(
                "bundle {} is not a directory",
                request.bundle.display()
            )));
        }
        let bundle = request.bundle.canonicalize().map_err(|e| {
            Error::InvalidArguments(format!("bundle {}: {}", request.bundle.display(), e))
        })?;

        runtime.validate()?;
        let spec = read_config(&config_path(&bundle))?;

        let sandboxes = self
            .engine
            .list_sandboxes()
            .await
            .map_err(|source| Error::Engine {
                phase: Phase::Validating,
                source,
            })?;
        if sandboxes.iter().any(|s| s.uses_id(&request.container_id)) {
            return Err(Error::InvalidArguments(format!(
                "ID already in use: {}",
                request.container_id
            )));
        }

        Ok((bundle, spec))
    }

    fn setup_cgroups(&self, spec: &OciSpec, pid: u32) -> Result<()> {
        let Some(paths) = self.cgroups.resolve(spec)? else {
            debug!("no resource limits; skipping cgroups");
            return Ok(());
        };
        self.cgroups.materialize(&paths, pid)
    }

    /// PID file, then console hand-off.
    fn finish(&self, request: &CreateRequest, pid: u32) -> Result<()> {
        write_pid_file(&request.pid_file, pid)?;
        debug!(container_id = %request.container_id, pid, "pid file written");
        self.console
            .setup_console(&request.container_id, &request.console)
    }

    fn finalize_step<T>(&self, sandbox: &Sandbox, step: Result<T>) -> Result<T> {
        if let Err(e) = &step {
            self.finalize.abandon(sandbox, e);
        }
        step
    }
}

fn representative_pid(sandbox: &Sandbox) -> Result<u32> {
    sandbox.representative_pid().ok_or_else(|| Error::Engine {
        phase: Phase::CreatingSandbox,
        source: EngineError::Rejected(format!("sandbox {} has no containers", sandbox.id)),
    })
}
