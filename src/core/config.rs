//! Pipeline configuration from YAML
//!
//! The document has two top-level sections: `providers` (name -> source
//! locator) and `pipeline` (ordered node list). Node shapes:
//!
//! ```yaml
//! providers:
//!   retriever: python servers/retriever.py
//!   generation:
//!     command: python
//!     args: ["servers/generation.py"]
//!     timeout_secs: 120
//!
//! pipeline:
//!   - retriever.warmup
//!   - retriever.search:
//!       input: { query: question, top_k: 5 }
//!       output: { results: docs }
//!   - loop:
//!       times: 3
//!       steps: [ ... ]
//!   - branch:
//!       router:
//!         - classify.label:
//!             output: { kind: k }
//!       branches:
//!         simple: [ ... ]
//!         complex: [ ... ]
//! ```
//!
//! In an `input` map a plain string names a state store key; numbers,
//! booleans and sequences are literals, and `{ literal: ... }` forces a
//! literal (including literal strings). `output` map values are always
//! state store keys.

use crate::core::node::{
    BindingSource, Branch, Loop, LoopCount, PipelineDefinition, PipelineNode, Step,
};
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;

/// Default per-call timeout when a provider does not declare one
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;

/// How to start or reach a declared provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLocator {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name (optional)
    #[serde(default)]
    pub name: Option<String>,

    /// Declared providers
    #[serde(default)]
    providers: IndexMap<String, ProviderSourceConfig>,

    /// Ordered node list; parsed into domain nodes by `to_pipeline`
    #[serde(default)]
    pipeline: Vec<Value>,
}

/// Provider source as written in YAML - a command-line shorthand string or
/// a detailed mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderSourceConfig {
    /// Shorthand: a command line split on whitespace
    Command(String),
    Detailed {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl ProviderSourceConfig {
    fn to_locator(&self, name: &str) -> Result<ProviderLocator> {
        match self {
            ProviderSourceConfig::Command(line) => {
                let mut parts = line.split_whitespace();
                let command = match parts.next() {
                    Some(command) => command.to_string(),
                    None => bail!("Provider '{}' has an empty command", name),
                };
                Ok(ProviderLocator {
                    command,
                    args: parts.map(|s| s.to_string()).collect(),
                    timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
                })
            }
            ProviderSourceConfig::Detailed {
                command,
                args,
                timeout_secs,
            } => {
                if command.is_empty() {
                    bail!("Provider '{}' has an empty command", name);
                }
                Ok(ProviderLocator {
                    command: command.clone(),
                    args: args.clone(),
                    timeout_secs: timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS),
                })
            }
        }
    }
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration without building the domain model
    pub fn validate(&self) -> Result<()> {
        self.build().map(|_| ())
    }

    /// Number of declared providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Number of top-level pipeline nodes
    pub fn node_count(&self) -> usize {
        self.pipeline.len()
    }

    /// Convert the configuration into an executable pipeline definition
    pub fn to_pipeline(&self) -> Result<PipelineDefinition> {
        self.build()
    }

    fn build(&self) -> Result<PipelineDefinition> {
        let mut providers = IndexMap::new();
        for (name, source) in &self.providers {
            providers.insert(name.clone(), source.to_locator(name)?);
        }

        let nodes = parse_sequence(&self.pipeline)?;
        check_provider_refs(&nodes, &providers)?;

        Ok(PipelineDefinition {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| "pipeline".to_string()),
            providers,
            nodes,
        })
    }
}

fn parse_sequence(values: &[Value]) -> Result<Vec<PipelineNode>> {
    values.iter().map(parse_node).collect()
}

fn parse_node(value: &Value) -> Result<PipelineNode> {
    match value {
        Value::String(target) => Ok(PipelineNode::Step(parse_step(target, &Value::Null)?)),
        Value::Mapping(map) => {
            if map.len() != 1 {
                bail!(
                    "Pipeline node must be a single-key mapping, found {} keys",
                    map.len()
                );
            }
            let (key, body) = map.iter().next().expect("mapping has one entry");
            let key = key
                .as_str()
                .context("Pipeline node key must be a string")?;
            match key {
                "loop" => parse_loop(body),
                "branch" => parse_branch(body),
                target => Ok(PipelineNode::Step(parse_step(target, body)?)),
            }
        }
        other => bail!(
            "Pipeline node must be a tool reference or a loop/branch block, got {}",
            yaml_type_name(other)
        ),
    }
}

/// Split a `provider.tool` reference
fn parse_tool_ref(target: &str) -> Result<(String, String)> {
    let parts: Vec<&str> = target.split('.').collect();
    match parts.as_slice() {
        [provider, tool] if !provider.is_empty() && !tool.is_empty() => {
            Ok((provider.to_string(), tool.to_string()))
        }
        _ => bail!("Tool reference '{}' must have the form provider.tool", target),
    }
}

fn parse_step(target: &str, body: &Value) -> Result<Step> {
    let (provider, tool) = parse_tool_ref(target)?;

    let mut inputs = IndexMap::new();
    let mut outputs = IndexMap::new();

    match body {
        // Bare tool reference: no bindings at all
        Value::Null => {}
        Value::Mapping(map) => {
            for (key, value) in map {
                let key = key
                    .as_str()
                    .with_context(|| format!("Step '{}' has a non-string field name", target))?;
                match key {
                    "input" => {
                        let bindings = value
                            .as_mapping()
                            .with_context(|| format!("Step '{}' input must be a mapping", target))?;
                        for (param, source) in bindings {
                            let param = param.as_str().with_context(|| {
                                format!("Step '{}' has a non-string input name", target)
                            })?;
                            inputs.insert(param.to_string(), parse_binding_source(source)?);
                        }
                    }
                    "output" => {
                        let bindings = value.as_mapping().with_context(|| {
                            format!("Step '{}' output must be a mapping", target)
                        })?;
                        for (field, key) in bindings {
                            let field = field.as_str().with_context(|| {
                                format!("Step '{}' has a non-string output field", target)
                            })?;
                            let key = key.as_str().with_context(|| {
                                format!(
                                    "Step '{}' output '{}' must name a state variable",
                                    target, field
                                )
                            })?;
                            outputs.insert(field.to_string(), key.to_string());
                        }
                    }
                    other => bail!("Step '{}' has unknown field '{}'", target, other),
                }
            }
        }
        other => bail!(
            "Step '{}' body must be a mapping, got {}",
            target,
            yaml_type_name(other)
        ),
    }

    Ok(Step {
        provider,
        tool,
        inputs,
        outputs,
    })
}

fn parse_binding_source(value: &Value) -> Result<BindingSource> {
    match value {
        Value::String(key) => Ok(BindingSource::Var(key.clone())),
        Value::Mapping(map) if map.len() == 1 => {
            let (key, inner) = map.iter().next().expect("mapping has one entry");
            if key.as_str() == Some("literal") {
                Ok(BindingSource::Literal(yaml_to_json(inner)?))
            } else {
                Ok(BindingSource::Literal(yaml_to_json(value)?))
            }
        }
        other => Ok(BindingSource::Literal(yaml_to_json(other)?)),
    }
}

fn parse_loop(body: &Value) -> Result<PipelineNode> {
    let map = body.as_mapping().context("Loop block must be a mapping")?;

    let mut times = None;
    let mut steps = None;
    for (key, value) in map {
        match key.as_str() {
            Some("times") => times = Some(parse_loop_count(value)?),
            Some("steps") => {
                let nodes = value
                    .as_sequence()
                    .context("Loop steps must be a sequence")?;
                steps = Some(parse_sequence(nodes)?);
            }
            _ => bail!("Loop block has unknown field {:?}", key),
        }
    }

    let times = times.context("Loop block requires 'times'")?;
    let body = steps.context("Loop block requires 'steps'")?;
    if body.is_empty() {
        bail!("Loop body must not be empty");
    }

    Ok(PipelineNode::Loop(Loop { times, body }))
}

fn parse_loop_count(value: &Value) -> Result<LoopCount> {
    match value {
        Value::Number(_) => {
            let times = value
                .as_u64()
                .context("Loop 'times' must be a positive integer")?;
            if times == 0 {
                bail!("Loop 'times' must be at least 1");
            }
            Ok(LoopCount::Fixed(times))
        }
        Value::String(variable) => Ok(LoopCount::Var(variable.clone())),
        other => bail!(
            "Loop 'times' must be an integer or a variable name, got {}",
            yaml_type_name(other)
        ),
    }
}

fn parse_branch(body: &Value) -> Result<PipelineNode> {
    let map = body.as_mapping().context("Branch block must be a mapping")?;

    let mut router = None;
    let mut arms = None;
    for (key, value) in map {
        match key.as_str() {
            Some("router") => {
                let nodes = value
                    .as_sequence()
                    .context("Branch router must be a sequence")?;
                let mut steps = Vec::new();
                for node in nodes {
                    match parse_node(node)? {
                        PipelineNode::Step(step) => steps.push(step),
                        _ => bail!("Branch router may only contain steps"),
                    }
                }
                router = Some(steps);
            }
            Some("branches") => {
                let mapping = value.as_mapping().context("Branches must be a mapping")?;
                let mut parsed = IndexMap::new();
                for (label, nodes) in mapping {
                    let label = label
                        .as_str()
                        .context("Branch labels must be strings")?;
                    let nodes = nodes
                        .as_sequence()
                        .with_context(|| format!("Branch '{}' must be a sequence", label))?;
                    parsed.insert(label.to_string(), parse_sequence(nodes)?);
                }
                arms = Some(parsed);
            }
            _ => bail!("Branch block has unknown field {:?}", key),
        }
    }

    let router = router.context("Branch block requires 'router'")?;
    let arms = arms.context("Branch block requires 'branches'")?;

    if router.is_empty() {
        bail!("Branch router must not be empty");
    }
    if arms.is_empty() {
        bail!("Branch block must declare at least one branch");
    }

    // The router's final step yields the routing label through its single
    // output binding.
    let last = router.last().expect("router is non-empty");
    if last.outputs.len() != 1 {
        bail!(
            "Branch router's final step '{}' must declare exactly one output binding, found {}",
            last.target(),
            last.outputs.len()
        );
    }
    let label_key = last
        .outputs
        .values()
        .next()
        .expect("one output binding")
        .clone();

    Ok(PipelineNode::Branch(Branch {
        router,
        label_key,
        arms,
    }))
}

/// Reject steps that reference providers absent from the `providers` section
fn check_provider_refs(
    nodes: &[PipelineNode],
    providers: &IndexMap<String, ProviderLocator>,
) -> Result<()> {
    for node in nodes {
        match node {
            PipelineNode::Step(step) => {
                if !providers.contains_key(&step.provider) {
                    bail!(
                        "Step '{}' references undeclared provider '{}'",
                        step.target(),
                        step.provider
                    );
                }
            }
            PipelineNode::Loop(l) => check_provider_refs(&l.body, providers)?,
            PipelineNode::Branch(branch) => {
                for step in &branch.router {
                    if !providers.contains_key(&step.provider) {
                        bail!(
                            "Router step '{}' references undeclared provider '{}'",
                            step.target(),
                            step.provider
                        );
                    }
                }
                for arm in branch.arms.values() {
                    check_provider_refs(arm, providers)?;
                }
            }
        }
    }
    Ok(())
}

fn yaml_to_json(value: &Value) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("Binding literal is not representable as JSON")
}

fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
