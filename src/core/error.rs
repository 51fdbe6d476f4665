//! Run error taxonomy and failure attribution

use std::fmt;
use thiserror::Error;

/// One segment of a node path through nested loop/branch bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Index into a node sequence
    Node(usize),
    /// Loop iteration (zero-based)
    Iteration(u64),
    /// Index into a branch router sequence
    Router(usize),
    /// Selected branch arm, by label
    Arm(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Node(index) => write!(f, "nodes[{}]", index),
            PathSegment::Iteration(iteration) => write!(f, "iter[{}]", iteration),
            PathSegment::Router(index) => write!(f, "router[{}]", index),
            PathSegment::Arm(label) => write!(f, "arm[{}]", label),
        }
    }
}

/// Position of a node within the pipeline, through nested loops and branches
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodePath {
    segments: Vec<PathSegment>,
}

impl NodePath {
    /// The path of the top-level node sequence
    pub fn root() -> Self {
        Self::default()
    }

    /// Extend the path with one more segment
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "pipeline");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Error kinds a run can fail with
///
/// Every kind is fatal to the current run; the executor attaches teardown
/// and returns exactly one of these to its caller.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("pipeline references unknown provider '{0}'")]
    ProviderNameUnknown(String),

    #[error("provider '{name}' unreachable: {reason}")]
    ProviderUnreachable { name: String, reason: String },

    #[error("provider '{provider}' exposes no tool named '{tool}'")]
    ToolNameUnknown { provider: String, tool: String },

    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("schema mismatch calling '{tool}': {}", violations.join("; "))]
    SchemaMismatch {
        tool: String,
        violations: Vec<String>,
    },

    #[error("tool '{tool}' failed: {message}")]
    ToolInvocationError { tool: String, message: String },

    #[error("tool '{tool}' timed out after {timeout_secs} seconds")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("router produced label '{0}' with no matching branch")]
    UnmatchedBranch(String),

    #[error("loop count variable '{variable}' must be a positive integer, got {value}")]
    InvalidIterationCount { variable: String, value: String },

    #[error("run cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Attach a node position, producing a run error
    pub fn at(self, path: NodePath) -> RunError {
        RunError::new(path, self)
    }
}

/// A run failure: what went wrong, and where in the node tree
#[derive(Debug, Error)]
#[error("{kind} (at {path})")]
pub struct RunError {
    pub path: NodePath,
    #[source]
    pub kind: ErrorKind,
}

impl RunError {
    pub fn new(path: NodePath, kind: ErrorKind) -> Self {
        Self { path, kind }
    }
}
