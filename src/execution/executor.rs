//! Pipeline executor - the run's entry point and state owner
//!
//! Owns the state store and provider registry for one run, drives the
//! interpreter from the first node to the last, and guarantees provider
//! teardown on every exit path: success, failure and cancellation.

use crate::core::error::{ErrorKind, RunError};
use crate::core::node::PipelineDefinition;
use crate::core::state::StateStore;
use crate::execution::interpreter::{Interpreter, RunEvent, RunEventHandler};
use crate::provider::{ProviderConnector, ProviderRegistry, StdioConnector};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Cloneable flag an external caller uses to cancel a run
///
/// Cancellation takes effect at the next node boundary and triggers the
/// same provider teardown path as a failure.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Bookkeeping returned alongside the final state
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Provider tool calls made, router steps included
    pub steps_executed: u64,
}

/// Successful run result: the full final state plus the run report
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: IndexMap<String, Value>,
    pub report: RunReport,
}

/// Executes one pipeline definition per call to `run`
///
/// Each run gets a fresh state store and provider registry; nothing is
/// shared across runs, so hosts may run several executors concurrently.
pub struct PipelineExecutor {
    definition: PipelineDefinition,
    connector: Arc<dyn ProviderConnector>,
    handlers: Vec<RunEventHandler>,
    cancel: CancelHandle,
}

impl PipelineExecutor {
    pub fn new(definition: PipelineDefinition) -> Self {
        Self {
            definition,
            connector: Arc::new(StdioConnector),
            handlers: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Replace how provider handles are connected (hosts, tests)
    pub fn with_connector(mut self, connector: Arc<dyn ProviderConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Add an event handler notified as the run progresses
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    /// Handle for cancelling this executor's runs from outside
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Run the pipeline with an empty initial state
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        self.run_with_seed(IndexMap::new()).await
    }

    /// Run the pipeline with host-supplied initial variables
    pub async fn run_with_seed(
        &self,
        seed: IndexMap<String, Value>,
    ) -> Result<RunOutcome, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            "Starting run {} of pipeline '{}'",
            run_id, self.definition.name
        );
        self.emit(RunEvent::RunStarted {
            run_id,
            pipeline_name: self.definition.name.clone(),
        });

        let mut state = StateStore::new();
        for (key, value) in seed {
            state.set(key, value);
        }

        let mut registry = ProviderRegistry::with_connector(
            self.definition.providers.clone(),
            self.connector.clone(),
        );

        let mut interpreter = Interpreter::new(
            &mut registry,
            &mut state,
            self.cancel.clone(),
            &self.handlers,
        );
        let result = interpreter.run(&self.definition.nodes).await;
        let steps_executed = interpreter.steps_executed();
        drop(interpreter);

        // Providers are released before the outcome is returned, on success
        // and failure alike. Individual teardown failures are logged by the
        // registry and do not change the run's outcome.
        registry.shutdown_all().await;

        let finished_at = Utc::now();
        match result {
            Ok(()) => {
                info!(
                    "Run {} completed with {} tool call(s)",
                    run_id, steps_executed
                );
                self.emit(RunEvent::RunCompleted {
                    run_id,
                    status: RunStatus::Completed,
                });
                Ok(RunOutcome {
                    state: state.into_values(),
                    report: RunReport {
                        run_id,
                        pipeline_name: self.definition.name.clone(),
                        status: RunStatus::Completed,
                        started_at,
                        finished_at,
                        steps_executed,
                    },
                })
            }
            Err(run_error) => {
                let status = if matches!(run_error.kind, ErrorKind::Cancelled) {
                    RunStatus::Cancelled
                } else {
                    RunStatus::Failed
                };
                error!(
                    "Run {} {:?} at {}: {}",
                    run_id, status, run_error.path, run_error.kind
                );
                self.emit(RunEvent::RunCompleted { run_id, status });
                Err(run_error)
            }
        }
    }

    fn emit(&self, event: RunEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}
