//! Closure-driven test double for [`SandboxEngine`].
//!
//! Each operation delegates to an optional closure. An operation without a
//! closure fails with [`EngineError::Mock`], so tests only wire up the calls
//! they expect to happen.

use super::{
    Container, ContainerConfig, EngineError, Sandbox, SandboxConfig, SandboxEngine, SandboxStatus,
};
use async_trait::async_trait;
use std::sync::Mutex;

type ListFn = Box<dyn Fn() -> Result<Vec<SandboxStatus>, EngineError> + Send + Sync>;
type CreateSandboxFn = Box<dyn Fn(&SandboxConfig) -> Result<Sandbox, EngineError> + Send + Sync>;
type CreateContainerFn =
    Box<dyn Fn(&str, &ContainerConfig) -> Result<(Sandbox, Container), EngineError> + Send + Sync>;

/// Call recorded by [`MockEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ListSandboxes,
    CreateSandbox(SandboxConfig),
    CreateContainer {
        sandbox_id: String,
        config: ContainerConfig,
    },
}

/// Engine whose behavior is supplied by the test.
#[derive(Default)]
pub struct MockEngine {
    list: Option<ListFn>,
    create_sandbox: Option<CreateSandboxFn>,
    create_container: Option<CreateContainerFn>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_list<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<Vec<SandboxStatus>, EngineError> + Send + Sync + 'static,
    {
        self.list = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_create_sandbox<F>(mut self, f: F) -> Self
    where
        F: Fn(&SandboxConfig) -> Result<Sandbox, EngineError> + Send + Sync + 'static,
    {
        self.create_sandbox = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_create_container<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &ContainerConfig) -> Result<(Sandbox, Container), EngineError>
            + Send
            + Sync
            + 'static,
    {
        self.create_container = Some(Box::new(f));
        self
    }

    /// Returns the calls made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: MockCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl std::fmt::Debug for MockEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEngine")
            .field("list", &self.list.is_some())
            .field("create_sandbox", &self.create_sandbox.is_some())
            .field("create_container", &self.create_container.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SandboxEngine for MockEngine {
    async fn list_sandboxes(&self) -> Result<Vec<SandboxStatus>, EngineError> {
        self.record(MockCall::ListSandboxes);
        match &self.list {
            Some(f) => f(),
            None => Err(EngineError::Mock("list_sandboxes not configured".to_string())),
        }
    }

    async fn create_sandbox(&self, config: &SandboxConfig) -> Result<Sandbox, EngineError> {
        self.record(MockCall::CreateSandbox(config.clone()));
        match &self.create_sandbox {
            Some(f) => f(config),
            None => Err(EngineError::Mock("create_sandbox not configured".to_string())),
        }
    }

    async fn create_container(
        &self,
        sandbox_id: &str,
        config: &ContainerConfig,
    ) -> Result<(Sandbox, Container), EngineError> {
        self.record(MockCall::CreateContainer {
            sandbox_id: sandbox_id.to_string(),
            config: config.clone(),
        });
        match &self.create_container {
            Some(f) => f(sandbox_id, config),
            None => Err(EngineError::Mock("create_container not configured".to_string())),
        }
    }
}
