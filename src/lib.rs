//! # sandrun
//!
//! **OCI Runtime Create Path for Sandbox-Isolated Containers**
//!
//! This crate implements `create` for an OCI runtime whose containers run
//! inside sandboxes (lightweight VMs). A bundle either starts a new sandbox
//! or adds a container to an existing one, depending on its annotations.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              sandrun                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                  Creator (create.rs)                        │    │
//! │  │  validate → resolve → engine → cgroups → pid file → console │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │         │              │              │             │               │
//! │  ┌──────┴─────┐ ┌──────┴─────┐ ┌──────┴─────┐ ┌─────┴──────┐        │
//! │  │  resolver  │ │   kernel   │ │  cgroups   │ │  pidfile   │        │
//! │  │ annotations│ │ cmdline    │ │ tasks +    │ │ temp file  │        │
//! │  │ → type     │ │ params     │ │ procs      │ │ + rename   │        │
//! │  └────────────┘ └────────────┘ └────────────┘ └────────────┘        │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                    SandboxEngine Trait (engine/)                    │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐         │
//! │  │       LocalEngine        │  │        MockEngine        │         │
//! │  │ state dir + hypervisor   │  │   closures, for tests    │         │
//! │  └──────────────────────────┘  └──────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Container Types
//!
//! | `io.kubernetes.cri-o.ContainerType` | Result                          |
//! |-------------------------------------|---------------------------------|
//! | absent or `sandbox`                 | new sandbox, first container    |
//! | `container`                         | container in `SandboxID` sandbox|
//! | anything else                       | `InvalidContainerType` error    |
//!
//! # Failure Model
//!
//! Validation and resolution fail without side effects. After the engine has
//! created a sandbox, a failing cgroup, PID file or console step is reported
//! but the sandbox stays; see [`create::FinalizePolicy`].
//!
//! # Example
//!
//! ```rust,ignore
//! use sandrun::{CgroupManager, CgroupsConfig, CreateRequest, Creator, RuntimeConfig};
//! use sandrun::engine::local::LocalEngine;
//! use std::sync::Arc;
//!
//! let runtime = RuntimeConfig::load(&RuntimeConfig::locate(None))?;
//! let engine = Arc::new(LocalEngine::new(&runtime.runtime.state_root));
//! let creator = Creator::new(engine, CgroupManager::new(CgroupsConfig::detect()));
//!
//! let request = CreateRequest::new("my-container", "/path/to/bundle")
//!     .with_pid_file("/run/my-container.pid");
//! creator.create(&request, &runtime).await?;
//! ```

pub mod cgroups;
pub mod config;
pub mod console;
pub mod constants;
pub mod create;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod pidfile;
pub mod resolver;
pub mod spec;

pub use cgroups::{CgroupManager, CgroupsConfig};
pub use config::RuntimeConfig;
pub use create::{CreateRequest, Creator, FinalizePolicy, LeaveInPlace};
pub use engine::{SandboxEngine, SandboxStatus};
pub use error::{Error, Phase, Result};
pub use resolver::ContainerType;
pub use spec::OciSpec;
