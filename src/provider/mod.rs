//! Capability providers - external processes exposing typed tools
//!
//! A provider, once reachable, exposes a catalog query returning its tool
//! names with input/output field schemas, and a call operation taking a tool
//! name and an argument record. The engine treats this as the sole contract;
//! providers are otherwise opaque.

pub mod catalog;
pub mod registry;
pub mod stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use catalog::{FieldSpec, FieldType, ToolCatalog, ToolSpec};
pub use registry::{ProviderConnector, ProviderRegistry, StdioConnector};
pub use stdio::StdioProvider;

/// Error types for provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider process could not be started
    #[error("failed to start provider: {0}")]
    Spawn(String),

    /// The provider started but the catalog handshake failed
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The provider reported a failure executing the tool
    #[error("{0}")]
    Tool(String),

    #[error("timeout after {0} seconds")]
    Timeout(u64),

    /// The transport broke or the provider sent a malformed frame
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A live, ready-to-call provider handle
///
/// Implementations own the connection/process; the registry owns the
/// handles and guarantees at most one per name per run.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// The provider name as declared in the pipeline
    fn name(&self) -> &str;

    /// Tool catalog fetched when the provider was connected
    fn catalog(&self) -> &ToolCatalog;

    /// Invoke one tool; blocks until the provider replies or times out
    async fn call(&self, tool: &str, args: Map<String, Value>) -> Result<Value, ProviderError>;

    /// Release the underlying process/connection
    async fn shutdown(&self) -> Result<(), ProviderError>;
}

impl std::fmt::Debug for dyn ToolProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolProvider")
            .field("name", &self.name())
            .finish()
    }
}
