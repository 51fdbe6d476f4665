//! Test: variable binding and schema enforcement around tool calls

use crate::helpers::*;
use ragline::provider::{FieldSpec, FieldType, ToolSpec};
use ragline::ErrorKind;
use serde_json::json;
use std::sync::Arc;

fn search_spec() -> ToolSpec {
    ToolSpec::new("search")
        .with_input(FieldSpec::new("query", FieldType::Text))
        .with_input(FieldSpec::new("top_k", FieldType::Number).optional())
        .with_input(FieldSpec::new("rerank", FieldType::Bool).optional())
        .with_input(FieldSpec::new("filters", FieldType::List).optional())
        .with_output(FieldSpec::new("results", FieldType::List))
}

fn search_provider() -> Arc<MockProvider> {
    Arc::new(MockProvider::new("retriever").tool(search_spec(), |_| {
        Ok(json!({ "results": [] }))
    }))
}

/// Reading an unbound variable fails and performs zero provider calls
#[tokio::test]
async fn test_unbound_variable_makes_no_call() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input: { query: question }
      output: { results: docs }
"#;

    let retriever = search_provider();
    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    assert!(matches!(
        err.kind,
        ErrorKind::UnboundVariable(ref key) if key == "question"
    ));
    assert_eq!(retriever.total_calls(), 0);
}

/// Literals pass through to the provider unchanged
#[tokio::test]
async fn test_literal_bindings_reach_provider() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input:
        query: { literal: "rust" }
        top_k: 5
        rerank: true
        filters: [recent, cited]
      output: { results: docs }
"#;

    let retriever = search_provider();
    run_with_mocks(yaml, &[retriever.clone()]).await.unwrap();

    let calls = retriever.calls();
    assert_eq!(calls.len(), 1);
    let args = &calls[0].args;
    assert_eq!(args["query"], json!("rust"));
    assert_eq!(args["top_k"], json!(5));
    assert_eq!(args["rerank"], json!(true));
    assert_eq!(args["filters"], json!(["recent", "cited"]));
}

/// A required input left unbound is a schema mismatch before the call
#[tokio::test]
async fn test_missing_required_input_makes_no_call() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input: { top_k: 5 }
      output: { results: docs }
"#;

    let retriever = search_provider();
    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    match err.kind {
        ErrorKind::SchemaMismatch { violations, .. } => {
            assert!(violations
                .iter()
                .any(|v| v.contains("required input 'query' is missing")));
        }
        other => panic!("Expected schema mismatch, got {:?}", other),
    }
    assert_eq!(retriever.total_calls(), 0);
}

/// A bound value of the wrong type is rejected with field-level detail
#[tokio::test]
async fn test_wrong_type_makes_no_call() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input:
        query: { literal: "rust" }
        top_k: { literal: "five" }
      output: { results: docs }
"#;

    let retriever = search_provider();
    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    match err.kind {
        ErrorKind::SchemaMismatch { violations, .. } => {
            assert_eq!(violations.len(), 1);
            assert!(violations[0].contains("'top_k' expects number, got string"));
        }
        other => panic!("Expected schema mismatch, got {:?}", other),
    }
    assert_eq!(retriever.total_calls(), 0);
}

/// Arguments the tool never declared are rejected
#[tokio::test]
async fn test_undeclared_argument_makes_no_call() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input:
        query: { literal: "rust" }
        page: 2
"#;

    let retriever = search_provider();
    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    assert!(matches!(err.kind, ErrorKind::SchemaMismatch { .. }));
    assert_eq!(retriever.total_calls(), 0);
}

/// A reply missing a bound field fails after the call, writing nothing
#[tokio::test]
async fn test_reply_missing_bound_field() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input: { query: { literal: "rust" } }
      output: { results: docs }
"#;

    let retriever = Arc::new(MockProvider::new("retriever").tool(search_spec(), |_| {
        Ok(json!({ "hits": [] }))
    }));

    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    match err.kind {
        ErrorKind::SchemaMismatch { violations, .. } => {
            assert!(violations[0].contains("reply field 'results' is missing"));
        }
        other => panic!("Expected schema mismatch, got {:?}", other),
    }
    assert_eq!(retriever.call_count("search"), 1);
}

/// Binding an output field the tool does not declare fails before the call
#[tokio::test]
async fn test_undeclared_output_binding_makes_no_call() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.search:
      input: { query: { literal: "rust" } }
      output: { scores: s }
"#;

    let retriever = search_provider();
    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    assert!(matches!(err.kind, ErrorKind::SchemaMismatch { .. }));
    assert_eq!(retriever.total_calls(), 0);
}

/// State keys are run-wide: a key written inside a loop is readable by a
/// later top-level step
#[tokio::test]
async fn test_state_is_run_wide() {
    let yaml = r#"
providers:
  p: mock
pipeline:
  - loop:
      times: 2
      steps:
        - p.produce:
            output: { value: inner }
  - p.consume:
      input: { value: inner }
      output: { value: seen }
"#;

    let provider = Arc::new(
        MockProvider::new("p")
            .tool(
                ToolSpec::new("produce").with_output(FieldSpec::new("value", FieldType::Number)),
                |_| Ok(json!({ "value": 7 })),
            )
            .tool(
                ToolSpec::new("consume")
                    .with_input(FieldSpec::new("value", FieldType::Number))
                    .with_output(FieldSpec::new("value", FieldType::Number)),
                |args| Ok(json!({ "value": args["value"].clone() })),
            ),
    );

    let outcome = run_with_mocks(yaml, &[provider]).await.unwrap();
    assert_eq!(outcome.state["seen"], json!(7));
}
