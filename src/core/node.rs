//! Pipeline node domain model

use crate::core::config::ProviderLocator;
use indexmap::IndexMap;
use serde_json::Value;

/// A single tool invocation with input/output variable bindings
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Name of the provider declared in the `providers` section
    pub provider: String,

    /// Tool name within the provider's catalog
    pub tool: String,

    /// Formal parameter name -> where its value comes from
    pub inputs: IndexMap<String, BindingSource>,

    /// Result field name -> state store key to write
    pub outputs: IndexMap<String, String>,
}

impl Step {
    /// The `provider.tool` reference as written in the pipeline
    pub fn target(&self) -> String {
        format!("{}.{}", self.provider, self.tool)
    }
}

/// Where a step input value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum BindingSource {
    /// Read from the state store under this key
    Var(String),
    /// Use the value as-is
    Literal(Value),
}

/// Iteration count of a loop block
#[derive(Debug, Clone, PartialEq)]
pub enum LoopCount {
    Fixed(u64),
    /// Resolved from the state store once, when the loop is entered
    Var(String),
}

/// A node that repeats its body a fixed number of times
///
/// Iterations share the run's state store: a write in iteration i is
/// visible to iteration i+1.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub times: LoopCount,
    pub body: Vec<PipelineNode>,
}

/// A node that selects exactly one arm based on a router's output label
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    /// Steps executed first; the final step yields the routing label
    pub router: Vec<Step>,

    /// State key the router's final step writes its label to
    pub label_key: String,

    /// Label -> node sequence; matching is exact and case-sensitive
    pub arms: IndexMap<String, Vec<PipelineNode>>,
}

/// A node in the pipeline's ordered node list
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineNode {
    Step(Step),
    Loop(Loop),
    Branch(Branch),
}

/// A parsed, validated pipeline ready to execute
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    pub name: String,

    /// Provider name -> how to start/reach it
    pub providers: IndexMap<String, ProviderLocator>,

    /// Top-level node sequence; declaration order is execution order
    pub nodes: Vec<PipelineNode>,
}
