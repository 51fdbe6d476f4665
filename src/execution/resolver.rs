//! Step resolver - binds inputs, invokes the tool, binds outputs
//!
//! One step executes in three phases: assemble arguments from the state
//! store, make the remote call, write declared result fields back. The
//! schema contract is enforced before the call - a step never reaches a
//! provider with invalid data.

use crate::core::error::ErrorKind;
use crate::core::node::{BindingSource, Step};
use crate::core::state::StateStore;
use crate::provider::catalog::json_type_name;
use crate::provider::{ProviderError, ToolProvider, ToolSpec};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Assemble the argument record for a step from its input bindings
///
/// Fails with `UnboundVariable` if a binding reads a key that was never
/// written, and with `SchemaMismatch` if the assembled arguments do not
/// conform to the tool's declared input schema.
pub fn resolve_inputs(
    step: &Step,
    spec: &ToolSpec,
    state: &StateStore,
) -> Result<Map<String, Value>, ErrorKind> {
    let mut args = Map::new();
    for (param, source) in &step.inputs {
        let value = match source {
            BindingSource::Var(key) => state.lookup(key)?.clone(),
            BindingSource::Literal(value) => value.clone(),
        };
        args.insert(param.clone(), value);
    }

    let violations = spec.check_args(&args);
    if !violations.is_empty() {
        return Err(ErrorKind::SchemaMismatch {
            tool: step.target(),
            violations,
        });
    }

    Ok(args)
}

/// Reject output bindings that name fields the tool does not declare
///
/// Checked before the call when the tool declares an output schema, so an
/// authoring error cannot trigger a remote invocation whose result is
/// unusable.
pub fn check_output_bindings(step: &Step, spec: &ToolSpec) -> Result<(), ErrorKind> {
    if spec.output.is_empty() {
        return Ok(());
    }

    let violations: Vec<String> = step
        .outputs
        .keys()
        .filter(|field| spec.output_field(field).is_none())
        .map(|field| {
            format!(
                "output binding '{}' is not declared by tool '{}'",
                field, spec.name
            )
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::SchemaMismatch {
            tool: step.target(),
            violations,
        })
    }
}

/// Issue the tool call and translate provider failures
///
/// Blocks until the provider replies or its configured timeout elapses.
/// The call is never retried here - retry policy, if any, belongs to the
/// caller hosting the run.
pub async fn invoke(
    provider: &dyn ToolProvider,
    step: &Step,
    args: Map<String, Value>,
) -> Result<Value, ErrorKind> {
    info!("Invoking {}", step.target());
    match provider.call(&step.tool, args).await {
        Ok(result) => Ok(result),
        Err(ProviderError::Timeout(timeout_secs)) => Err(ErrorKind::ToolTimeout {
            tool: step.target(),
            timeout_secs,
        }),
        Err(e) => Err(ErrorKind::ToolInvocationError {
            tool: step.target(),
            message: e.to_string(),
        }),
    }
}

/// Extract declared result fields and write them into the state store
///
/// Fails with `SchemaMismatch` if the reply is not a record, a bound field
/// is absent from it, or a bound field's value contradicts the declared
/// output type. Writes overwrite any prior value for the bound key.
pub fn bind_outputs(
    step: &Step,
    spec: &ToolSpec,
    result: &Value,
    state: &mut StateStore,
) -> Result<(), ErrorKind> {
    if step.outputs.is_empty() {
        return Ok(());
    }

    let record = result.as_object().ok_or_else(|| ErrorKind::SchemaMismatch {
        tool: step.target(),
        violations: vec![format!(
            "reply is not a record, got {}",
            json_type_name(result)
        )],
    })?;

    let mut violations = Vec::new();
    for field in step.outputs.keys() {
        match record.get(field) {
            None => violations.push(format!("reply field '{}' is missing", field)),
            Some(value) => {
                if let Some(declared) = spec.output_field(field) {
                    if !declared.ty.matches(value) {
                        violations.push(format!(
                            "reply field '{}' expects {}, got {}",
                            field,
                            declared.ty.name(),
                            json_type_name(value)
                        ));
                    }
                }
            }
        }
    }
    if !violations.is_empty() {
        return Err(ErrorKind::SchemaMismatch {
            tool: step.target(),
            violations,
        });
    }

    for (field, key) in &step.outputs {
        debug!("Binding {}.{} -> {}", step.target(), field, key);
        state.set(key.clone(), record[field].clone());
    }

    Ok(())
}

/// Execute one step end to end against a resolved provider handle
pub async fn execute_step(
    provider: &dyn ToolProvider,
    step: &Step,
    state: &mut StateStore,
) -> Result<(), ErrorKind> {
    let spec = provider
        .catalog()
        .get(&step.tool)
        .ok_or_else(|| ErrorKind::ToolNameUnknown {
            provider: step.provider.clone(),
            tool: step.tool.clone(),
        })?;

    check_output_bindings(step, spec)?;
    let args = resolve_inputs(step, spec, state)?;
    let result = invoke(provider, step, args).await?;
    bind_outputs(step, spec, &result, state)
}
