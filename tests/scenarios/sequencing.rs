//! Test: plain step sequences execute in declared order

use crate::helpers::*;
use ragline::execution::RunStatus;
use ragline::provider::{FieldSpec, FieldType, ToolSpec};
use serde_json::json;
use std::sync::Arc;

fn search_spec() -> ToolSpec {
    ToolSpec::new("search")
        .with_input(FieldSpec::new("query", FieldType::Text))
        .with_output(FieldSpec::new("results", FieldType::List))
}

fn generate_spec() -> ToolSpec {
    ToolSpec::new("generate")
        .with_input(FieldSpec::new("context", FieldType::Any))
        .with_output(FieldSpec::new("answer", FieldType::Any))
}

/// The retrieval-then-generation flow from a typical RAG pipeline: the
/// retriever's results feed the generator through the state store.
#[tokio::test]
async fn test_retrieve_then_generate() {
    let yaml = r#"
name: "Basic RAG"

providers:
  retriever: mock
  generation: mock

pipeline:
  - retriever.search:
      input: { query: { literal: "q" } }
      output: { results: docs }
  - generation.generate:
      input: { context: docs }
      output: { answer: answer }
"#;

    let journal = new_journal();
    let retriever = Arc::new(
        MockProvider::new("retriever")
            .with_journal(journal.clone())
            .tool(search_spec(), |_args| Ok(json!({ "results": ["a", "b"] }))),
    );
    let generation = Arc::new(
        MockProvider::new("generation")
            .with_journal(journal.clone())
            .tool(generate_spec(), |args| {
                Ok(json!({ "answer": args["context"].clone() }))
            }),
    );

    let outcome = run_with_mocks(yaml, &[retriever.clone(), generation.clone()])
        .await
        .unwrap();

    // Call order equals declared step order
    assert_eq!(
        journal_entries(&journal),
        vec!["retriever.search", "generation.generate"]
    );

    // Final state carries both bound outputs
    assert_eq!(outcome.state["docs"], json!(["a", "b"]));
    assert_eq!(outcome.state["answer"], json!(["a", "b"]));
    assert_eq!(outcome.report.status, RunStatus::Completed);
    assert_eq!(outcome.report.steps_executed, 2);
}

#[tokio::test]
async fn test_longer_chain_preserves_order() {
    let yaml = r#"
providers:
  p: mock

pipeline:
  - p.one:
      output: { v: a }
  - p.two:
      input: { v: a }
      output: { v: b }
  - p.three:
      input: { v: b }
      output: { v: c }
"#;

    let journal = new_journal();
    let step = |name: &str, result: i64| {
        (
            ToolSpec::new(name)
                .with_input(FieldSpec::new("v", FieldType::Number).optional())
                .with_output(FieldSpec::new("v", FieldType::Number)),
            result,
        )
    };

    let (one, r1) = step("one", 1);
    let (two, r2) = step("two", 2);
    let (three, r3) = step("three", 3);
    let provider = Arc::new(
        MockProvider::new("p")
            .with_journal(journal.clone())
            .tool(one, move |_| Ok(json!({ "v": r1 })))
            .tool(two, move |_| Ok(json!({ "v": r2 })))
            .tool(three, move |_| Ok(json!({ "v": r3 }))),
    );

    let outcome = run_with_mocks(yaml, &[provider.clone()]).await.unwrap();

    assert_eq!(journal_entries(&journal), vec!["p.one", "p.two", "p.three"]);
    assert_eq!(outcome.state["a"], json!(1));
    assert_eq!(outcome.state["b"], json!(2));
    assert_eq!(outcome.state["c"], json!(3));
}

/// A bare tool reference takes no inputs and writes no outputs
#[tokio::test]
async fn test_bare_step_invokes_tool() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.warmup
"#;

    let retriever = Arc::new(
        MockProvider::new("retriever").tool(ToolSpec::new("warmup"), |_| Ok(json!({"ready": true}))),
    );

    let outcome = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap();

    assert_eq!(retriever.call_count("warmup"), 1);
    assert!(outcome.state.is_empty());
}

/// Later steps observe overwrites made by earlier ones
#[tokio::test]
async fn test_output_overwrites_earlier_value() {
    let yaml = r#"
providers:
  p: mock
pipeline:
  - p.first:
      output: { v: shared }
  - p.second:
      output: { v: shared }
"#;

    let provider = Arc::new(
        MockProvider::new("p")
            .tool(
                ToolSpec::new("first").with_output(FieldSpec::new("v", FieldType::Number)),
                |_| Ok(json!({ "v": 1 })),
            )
            .tool(
                ToolSpec::new("second").with_output(FieldSpec::new("v", FieldType::Number)),
                |_| Ok(json!({ "v": 2 })),
            ),
    );

    let outcome = run_with_mocks(yaml, &[provider]).await.unwrap();
    assert_eq!(outcome.state["shared"], json!(2));
    assert_eq!(outcome.state.len(), 1);
}

/// A step referencing a tool absent from the provider's catalog fails
/// without reaching the provider
#[tokio::test]
async fn test_unknown_tool_fails() {
    let yaml = r#"
providers:
  retriever: mock
pipeline:
  - retriever.lookup
"#;

    let retriever = Arc::new(
        MockProvider::new("retriever").tool(ToolSpec::new("search"), |_| Ok(json!({}))),
    );

    let err = run_with_mocks(yaml, &[retriever.clone()]).await.unwrap_err();

    assert!(matches!(
        err.kind,
        ragline::ErrorKind::ToolNameUnknown { ref tool, .. } if tool == "lookup"
    ));
    assert_eq!(err.path.to_string(), "nodes[0]");
    assert_eq!(retriever.total_calls(), 0);
}
