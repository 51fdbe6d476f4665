//! Control-flow interpreter - walks the node tree and dispatches per variant
//!
//! Nodes execute strictly in declared order. A tool invocation is the sole
//! suspension point; nothing else proceeds within the run while a provider
//! call is in flight. Any error is fatal to the run and carries the failing
//! node's path.

use crate::core::error::{ErrorKind, NodePath, PathSegment, RunError};
use crate::core::node::{Branch, Loop, LoopCount, PipelineNode, Step};
use crate::core::state::StateStore;
use crate::execution::executor::{CancelHandle, RunStatus};
use crate::execution::resolver;
use crate::provider::ProviderRegistry;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted while a run progresses
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    StepStarted {
        path: String,
        target: String,
    },
    StepCompleted {
        path: String,
        target: String,
        outputs: Vec<String>,
    },
    LoopEntered {
        path: String,
        times: u64,
    },
    IterationStarted {
        path: String,
        iteration: u64,
        times: u64,
    },
    BranchRouted {
        path: String,
        label: String,
    },
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type RunEventHandler = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Walks one pipeline's node sequences for one run
pub struct Interpreter<'a> {
    registry: &'a mut ProviderRegistry,
    state: &'a mut StateStore,
    cancel: CancelHandle,
    handlers: &'a [RunEventHandler],
    steps_executed: u64,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        registry: &'a mut ProviderRegistry,
        state: &'a mut StateStore,
        cancel: CancelHandle,
        handlers: &'a [RunEventHandler],
    ) -> Self {
        Self {
            registry,
            state,
            cancel,
            handlers,
            steps_executed: 0,
        }
    }

    /// Total provider tool calls made so far
    pub fn steps_executed(&self) -> u64 {
        self.steps_executed
    }

    fn emit(&self, event: RunEvent) {
        for handler in self.handlers {
            handler(event.clone());
        }
    }

    /// Execute the pipeline's top-level node sequence
    pub async fn run(&mut self, nodes: &[PipelineNode]) -> Result<(), RunError> {
        self.run_sequence(nodes, NodePath::root()).await
    }

    async fn run_sequence(
        &mut self,
        nodes: &[PipelineNode],
        path: NodePath,
    ) -> Result<(), RunError> {
        for (index, node) in nodes.iter().enumerate() {
            let node_path = path.child(PathSegment::Node(index));

            // Cancellation takes effect between nodes, never mid-invocation
            if self.cancel.is_cancelled() {
                info!("Run cancelled before {}", node_path);
                return Err(ErrorKind::Cancelled.at(node_path));
            }

            match node {
                PipelineNode::Step(step) => self.run_step(step, &node_path).await?,
                PipelineNode::Loop(l) => self.run_loop(l, &node_path).await?,
                PipelineNode::Branch(branch) => self.run_branch(branch, &node_path).await?,
            }
        }
        Ok(())
    }

    /// Boxed indirection for recursing into nested node sequences
    fn run_nested<'b>(
        &'b mut self,
        nodes: &'b [PipelineNode],
        path: NodePath,
    ) -> Pin<Box<dyn Future<Output = Result<(), RunError>> + Send + 'b>> {
        Box::pin(self.run_sequence(nodes, path))
    }

    async fn run_step(&mut self, step: &Step, path: &NodePath) -> Result<(), RunError> {
        self.emit(RunEvent::StepStarted {
            path: path.to_string(),
            target: step.target(),
        });

        let provider = self
            .registry
            .ensure(&step.provider)
            .await
            .map_err(|kind| kind.at(path.clone()))?;

        resolver::execute_step(provider.as_ref(), step, self.state)
            .await
            .map_err(|kind| kind.at(path.clone()))?;

        self.steps_executed += 1;
        self.emit(RunEvent::StepCompleted {
            path: path.to_string(),
            target: step.target(),
            outputs: step.outputs.values().cloned().collect(),
        });
        Ok(())
    }

    async fn run_loop(&mut self, l: &Loop, path: &NodePath) -> Result<(), RunError> {
        // The count is resolved once per loop entry; body writes to the
        // count variable do not change the number of iterations.
        let times = self
            .resolve_count(&l.times)
            .map_err(|kind| kind.at(path.clone()))?;

        self.emit(RunEvent::LoopEntered {
            path: path.to_string(),
            times,
        });

        for iteration in 0..times {
            debug!("Loop {} iteration {}/{}", path, iteration + 1, times);
            self.emit(RunEvent::IterationStarted {
                path: path.to_string(),
                iteration,
                times,
            });
            let iter_path = path.child(PathSegment::Iteration(iteration));
            self.run_nested(&l.body, iter_path).await?;
        }
        Ok(())
    }

    fn resolve_count(&self, count: &LoopCount) -> Result<u64, ErrorKind> {
        match count {
            LoopCount::Fixed(times) => Ok(*times),
            LoopCount::Var(variable) => {
                let value = self.state.lookup(variable)?;
                match value.as_u64() {
                    Some(times) if times >= 1 => Ok(times),
                    _ => Err(ErrorKind::InvalidIterationCount {
                        variable: variable.clone(),
                        value: value.to_string(),
                    }),
                }
            }
        }
    }

    async fn run_branch(&mut self, branch: &Branch, path: &NodePath) -> Result<(), RunError> {
        for (index, step) in branch.router.iter().enumerate() {
            let router_path = path.child(PathSegment::Router(index));
            self.run_step(step, &router_path).await?;
        }

        let label_value = self
            .state
            .lookup(&branch.label_key)
            .map_err(|kind| kind.at(path.clone()))?;

        // Labels are exact-match strings; anything else cannot select an arm
        let label = match label_value.as_str() {
            Some(label) => label.to_string(),
            None => {
                return Err(ErrorKind::UnmatchedBranch(label_value.to_string()).at(path.clone()))
            }
        };

        let Some(arm) = branch.arms.get(&label) else {
            return Err(ErrorKind::UnmatchedBranch(label).at(path.clone()));
        };

        info!("Branch {} routed to '{}'", path, label);
        self.emit(RunEvent::BranchRouted {
            path: path.to_string(),
            label: label.clone(),
        });

        let arm_path = path.child(PathSegment::Arm(label));
        self.run_nested(arm, arm_path).await
    }
}
