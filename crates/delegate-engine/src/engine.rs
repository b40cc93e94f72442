use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info};

use crate::availability::{CallerContext, ConnectorStatusProvider};
use crate::catalog::ToolCatalog;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::request::DelegateInput;
use crate::run::{AbortHandle, ExecutionStream, run_task};
use crate::runtime::ModelRuntime;
use crate::snapshot::ExecutionSnapshot;

pub(crate) struct EngineInner {
    pub(crate) catalog: Arc<dyn ToolCatalog>,
    pub(crate) runtime: Arc<dyn ModelRuntime>,
    pub(crate) connectors: Option<Arc<dyn ConnectorStatusProvider>>,
    pub(crate) config: EngineConfig,
}

/// Entry point for delegating tasks to tool-restricted sub-agents.
#[derive(Clone)]
pub struct DelegateEngine {
    inner: Arc<EngineInner>,
}

impl DelegateEngine {
    /// Starts a builder for registering collaborators.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Settings the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Starts a delegated run on the current tokio runtime.
    ///
    /// Never fails: every problem, including bad input, ends up as a failed
    /// terminal snapshot returned by [`ExecutionStream::finish`]. Called
    /// outside a tokio runtime, nothing is spawned and the terminal result
    /// is a failed "Agent execution failed unexpectedly.".
    pub fn delegate(&self, caller: CallerContext, input: DelegateInput) -> ExecutionStream {
        let run_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.inner.config.stream_buffer_capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);

        info!(%run_id, task_chars = input.task.chars().count(), "delegating task");
        let fallback = ExecutionStream::fallback_for(&input);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_task(
                    self.inner.clone(),
                    run_id,
                    caller,
                    input,
                    tx,
                    final_tx,
                    abort_rx,
                ));
            }
            Err(err) => {
                error!(%run_id, error = %err, "no tokio runtime to run the delegation on");
            }
        }

        ExecutionStream::new(run_id, rx, final_rx, AbortHandle::new(abort_tx), fallback)
    }

    /// Runs to completion and returns the terminal snapshot.
    pub async fn run(&self, caller: CallerContext, input: DelegateInput) -> ExecutionSnapshot {
        self.delegate(caller, input).finish().await
    }
}

/// Builder used to register collaborators before creating a [`DelegateEngine`].
#[derive(Default)]
pub struct EngineBuilder {
    catalog: Option<Arc<dyn ToolCatalog>>,
    runtime: Option<Arc<dyn ModelRuntime>>,
    connectors: Option<Arc<dyn ConnectorStatusProvider>>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Source of connector tools. Required.
    pub fn catalog(mut self, catalog: Arc<dyn ToolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Model runtime that drives the sub-agent. Required.
    pub fn runtime(mut self, runtime: Arc<dyn ModelRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Optional advisory connector status source.
    pub fn connector_status(mut self, provider: Arc<dyn ConnectorStatusProvider>) -> Self {
        self.connectors = Some(provider);
        self
    }

    /// Replaces the default [`EngineConfig`].
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine, validating the config and required collaborators.
    pub fn build(self) -> Result<DelegateEngine, EngineError> {
        self.config.validate()?;
        let catalog = self
            .catalog
            .ok_or(EngineError::MissingCollaborator("tool catalog"))?;
        let runtime = self
            .runtime
            .ok_or(EngineError::MissingCollaborator("model runtime"))?;
        Ok(DelegateEngine {
            inner: Arc::new(EngineInner {
                catalog,
                runtime,
                connectors: self.connectors,
                config: self.config,
            }),
        })
    }
}
