//! Engine - the host-facing façade
//!
//! An explicit object owned by the caller: construction spawns the
//! runner pool, `execute` validates a descriptor and returns the
//! streamed result sequence, `shutdown` terminates the pool. No global
//! state; lifecycle is an explicit call, not a side effect of import.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ast::Workflow;
use crate::config::EngineConfig;
use crate::dag;
use crate::error::Result;
use crate::event::EventLog;
use crate::pool::RunnerPool;
use crate::registry::TaskRegistry;
use crate::runtime::{Scheduler, WorkflowStream};

/// Task workflow engine: a runner pool, a task registry and a scheduler.
///
/// ```rust,ignore
/// use runa::{Engine, EngineConfig, TaskRegistry, Workflow};
///
/// let registry = TaskRegistry::with_builtins();
/// let engine = Engine::new(EngineConfig::default(), registry).await?;
///
/// let workflow = Workflow::parse(descriptor_text)?;
/// let mut stream = engine.execute(&workflow)?;
/// while let Some(event) = stream.next().await {
///     println!("{:?}", event?);
/// }
/// engine.shutdown();
/// # Ok::<(), runa::RunaError>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    registry: TaskRegistry,
    pool: Arc<RunnerPool>,
    scheduler: Scheduler,
}

impl Engine {
    /// Build an engine: validates the config and eagerly spawns the
    /// pool's `min` runners. Runner lifecycle is audited on the pool's
    /// event log, reachable via [`pool_events`](Self::pool_events).
    pub async fn new(config: EngineConfig, registry: TaskRegistry) -> Result<Self> {
        config.validate()?;
        let pool = RunnerPool::new(
            config.pool_min,
            config.pool_max,
            registry.clone(),
            config.response_capacity,
            config.ready_timeout(),
            EventLog::new(),
        )
        .await?;
        let scheduler = Scheduler::new(Arc::clone(&pool), config.abort_grace());
        info!(
            pool_min = config.pool_min,
            pool_max = config.pool_max,
            "engine ready"
        );

        Ok(Self {
            config,
            registry,
            pool,
            scheduler,
        })
    }

    /// Engine with default config and the built-in task types
    pub async fn with_builtins() -> Result<Self> {
        Self::new(EngineConfig::default(), TaskRegistry::with_builtins()).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<RunnerPool> {
        &self.pool
    }

    /// Audit log of runner spawn/retire activity across runs
    pub fn pool_events(&self) -> &EventLog {
        self.pool.events()
    }

    /// Validate a descriptor and start a run.
    ///
    /// Validation errors surface here, before any task starts.
    pub fn execute(&self, workflow: &Workflow) -> Result<WorkflowStream> {
        self.execute_with_cancel(workflow, CancellationToken::new())
    }

    /// Like [`execute`](Self::execute), with a caller-held cancellation
    /// signal. Cancelling the token aborts the run: in-flight runners
    /// are told to stop and the stream terminates with the abort error.
    pub fn execute_with_cancel(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> Result<WorkflowStream> {
        let graph = dag::validate(workflow)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        Ok(self
            .scheduler
            .run(graph, run_id, workflow.compute_hash(), cancel))
    }

    /// Terminate the pool: idle runners drop now, busy runners on
    /// release, pending acquires fail.
    pub fn shutdown(&self) {
        self.pool.terminate();
    }
}
