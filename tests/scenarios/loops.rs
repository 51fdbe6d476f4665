//! Test: loop blocks repeat their body with shared state accumulation

use crate::helpers::*;
use ragline::provider::{FieldSpec, FieldType, ProviderError, ToolSpec};
use ragline::ErrorKind;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn counter_provider() -> Arc<MockProvider> {
    // Each call returns previous value + 1, starting from 0
    let total = Arc::new(AtomicU64::new(0));
    Arc::new(MockProvider::new("counter").tool(
        ToolSpec::new("increment").with_output(FieldSpec::new("value", FieldType::Number)),
        move |_args| {
            let value = total.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "value": value }))
        },
    ))
}

#[tokio::test]
async fn test_loop_runs_body_exactly_n_times() {
    let yaml = r#"
providers:
  counter: mock
pipeline:
  - loop:
      times: 3
      steps:
        - counter.increment:
            output: { value: v }
"#;

    let counter = counter_provider();
    let outcome = run_with_mocks(yaml, &[counter.clone()]).await.unwrap();

    assert_eq!(counter.call_count("increment"), 3);
    assert_eq!(outcome.state["v"], json!(3));
    assert_eq!(outcome.report.steps_executed, 3);
}

/// A state write in iteration i is visible to iteration i+1
#[tokio::test]
async fn test_loop_iterations_share_state() {
    let yaml = r#"
providers:
  init: mock
  math: mock
pipeline:
  - init.zero:
      output: { value: v }
  - loop:
      times: 3
      steps:
        - math.incr:
            input: { value: v }
            output: { value: v }
"#;

    let init = Arc::new(MockProvider::new("init").tool(
        ToolSpec::new("zero").with_output(FieldSpec::new("value", FieldType::Number)),
        |_| Ok(json!({ "value": 0 })),
    ));
    let math = Arc::new(MockProvider::new("math").tool(
        ToolSpec::new("incr")
            .with_input(FieldSpec::new("value", FieldType::Number))
            .with_output(FieldSpec::new("value", FieldType::Number)),
        |args| {
            let previous = args["value"].as_u64().unwrap();
            Ok(json!({ "value": previous + 1 }))
        },
    ));

    let outcome = run_with_mocks(yaml, &[init, math.clone()]).await.unwrap();

    // Each iteration read what the previous one wrote
    let inputs: Vec<u64> = math
        .calls()
        .iter()
        .map(|c| c.args["value"].as_u64().unwrap())
        .collect();
    assert_eq!(inputs, vec![0, 1, 2]);
    assert_eq!(outcome.state["v"], json!(3));
}

#[tokio::test]
async fn test_loop_count_from_state_variable() {
    let yaml = r#"
providers:
  plan: mock
  counter: mock
pipeline:
  - plan.rounds:
      output: { n: rounds }
  - loop:
      times: rounds
      steps:
        - counter.increment:
            output: { value: v }
"#;

    let plan = Arc::new(MockProvider::new("plan").tool(
        ToolSpec::new("rounds").with_output(FieldSpec::new("n", FieldType::Number)),
        |_| Ok(json!({ "n": 2 })),
    ));
    let counter = counter_provider();

    let outcome = run_with_mocks(yaml, &[plan, counter.clone()]).await.unwrap();

    assert_eq!(counter.call_count("increment"), 2);
    assert_eq!(outcome.state["v"], json!(2));
}

/// The count is resolved once at loop entry; body writes to the count
/// variable do not change the number of iterations
#[tokio::test]
async fn test_loop_count_resolved_once_per_entry() {
    let yaml = r#"
providers:
  plan: mock
  noisy: mock
pipeline:
  - plan.rounds:
      output: { n: rounds }
  - loop:
      times: rounds
      steps:
        - noisy.step:
            output: { n: rounds }
"#;

    let plan = Arc::new(MockProvider::new("plan").tool(
        ToolSpec::new("rounds").with_output(FieldSpec::new("n", FieldType::Number)),
        |_| Ok(json!({ "n": 3 })),
    ));
    // Every iteration inflates the count variable; the loop must ignore it
    let noisy = Arc::new(MockProvider::new("noisy").tool(
        ToolSpec::new("step").with_output(FieldSpec::new("n", FieldType::Number)),
        |_| Ok(json!({ "n": 100 })),
    ));

    run_with_mocks(yaml, &[plan, noisy.clone()]).await.unwrap();
    assert_eq!(noisy.call_count("step"), 3);
}

#[tokio::test]
async fn test_loop_count_variable_must_be_positive_integer() {
    let yaml = r#"
providers:
  plan: mock
  counter: mock
pipeline:
  - plan.rounds:
      output: { n: rounds }
  - loop:
      times: rounds
      steps:
        - counter.increment
"#;

    let plan = Arc::new(MockProvider::new("plan").tool(
        ToolSpec::new("rounds").with_output(FieldSpec::new("n", FieldType::Any)),
        |_| Ok(json!({ "n": "several" })),
    ));
    let counter = counter_provider();

    let err = run_with_mocks(yaml, &[plan, counter.clone()])
        .await
        .unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::InvalidIterationCount { ref variable, .. } if variable == "rounds"
    ));
    assert_eq!(err.path.to_string(), "nodes[1]");
    assert_eq!(counter.total_calls(), 0);
}

/// A failure inside any iteration aborts the loop and the run
#[tokio::test]
async fn test_loop_aborts_on_iteration_failure() {
    let yaml = r#"
providers:
  flaky: mock
pipeline:
  - loop:
      times: 5
      steps:
        - flaky.work
"#;

    let attempts = Arc::new(AtomicU64::new(0));
    let flaky = Arc::new(MockProvider::new("flaky").tool(ToolSpec::new("work"), move |_| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 1 {
            Err(ProviderError::Tool("disk full".to_string()))
        } else {
            Ok(json!({}))
        }
    }));

    let err = run_with_mocks(yaml, &[flaky.clone()]).await.unwrap_err();

    // Second iteration failed; no further iterations ran
    assert_eq!(flaky.call_count("work"), 2);
    assert!(matches!(err.kind, ErrorKind::ToolInvocationError { .. }));
    assert_eq!(err.path.to_string(), "nodes[0]/iter[1]/nodes[0]");
}

/// Nested loops multiply their bodies
#[tokio::test]
async fn test_nested_loops() {
    let yaml = r#"
providers:
  counter: mock
pipeline:
  - loop:
      times: 2
      steps:
        - loop:
            times: 3
            steps:
              - counter.increment:
                  output: { value: v }
"#;

    let counter = counter_provider();
    let outcome = run_with_mocks(yaml, &[counter.clone()]).await.unwrap();

    assert_eq!(counter.call_count("increment"), 6);
    assert_eq!(outcome.state["v"], json!(6));
}
