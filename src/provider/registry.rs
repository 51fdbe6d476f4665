//! Provider registry - resolves declared names to live handles
//!
//! One registry per run. It guarantees at most one live handle per provider
//! name, and it is the only component that spawns external processes or
//! opens connections.

use crate::core::config::ProviderLocator;
use crate::core::error::ErrorKind;
use crate::provider::{ProviderError, StdioProvider, ToolProvider};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Connects a declared provider source to a live handle
///
/// The default connector spawns a stdio child process; hosts and tests may
/// install their own (e.g. in-process providers).
#[async_trait]
pub trait ProviderConnector: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        locator: &ProviderLocator,
    ) -> Result<Arc<dyn ToolProvider>, ProviderError>;
}

/// Default connector: launch the provider as a child process over stdio
pub struct StdioConnector;

#[async_trait]
impl ProviderConnector for StdioConnector {
    async fn connect(
        &self,
        name: &str,
        locator: &ProviderLocator,
    ) -> Result<Arc<dyn ToolProvider>, ProviderError> {
        let provider = StdioProvider::connect(name, locator).await?;
        Ok(Arc::new(provider))
    }
}

/// Registry mapping declared provider names to live handles for one run
pub struct ProviderRegistry {
    declared: IndexMap<String, ProviderLocator>,
    connector: Arc<dyn ProviderConnector>,
    handles: IndexMap<String, Arc<dyn ToolProvider>>,
}

impl ProviderRegistry {
    /// Create a registry over the pipeline's declared providers
    pub fn new(declared: IndexMap<String, ProviderLocator>) -> Self {
        Self::with_connector(declared, Arc::new(StdioConnector))
    }

    /// Create a registry with a custom connector
    pub fn with_connector(
        declared: IndexMap<String, ProviderLocator>,
        connector: Arc<dyn ProviderConnector>,
    ) -> Self {
        Self {
            declared,
            connector,
            handles: IndexMap::new(),
        }
    }

    /// Declared provider names, in declaration order
    pub fn declared_names(&self) -> Vec<String> {
        self.declared.keys().cloned().collect()
    }

    /// Install an already-connected handle under its own name
    ///
    /// `ensure` will return it without connecting anything.
    pub fn register(&mut self, handle: Arc<dyn ToolProvider>) {
        self.handles.insert(handle.name().to_string(), handle);
    }

    /// Resolve a provider name to a live handle, connecting on first use
    ///
    /// Calling this twice for the same name returns the same handle and
    /// performs startup/connect exactly once.
    pub async fn ensure(&mut self, name: &str) -> Result<Arc<dyn ToolProvider>, ErrorKind> {
        if let Some(handle) = self.handles.get(name) {
            return Ok(handle.clone());
        }

        let locator = self
            .declared
            .get(name)
            .ok_or_else(|| ErrorKind::ProviderNameUnknown(name.to_string()))?;

        info!("Connecting provider '{}'", name);
        let handle = self
            .connector
            .connect(name, locator)
            .await
            .map_err(|e| ErrorKind::ProviderUnreachable {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        self.handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Number of currently live handles
    pub fn live_count(&self) -> usize {
        self.handles.len()
    }

    /// Release every cached handle, best-effort
    ///
    /// Teardown failures are collected and returned instead of raised so one
    /// broken provider cannot block releasing the rest.
    pub async fn shutdown_all(&mut self) -> Vec<(String, ProviderError)> {
        let mut failures = Vec::new();
        for (name, handle) in self.handles.drain(..) {
            debug!("Shutting down provider '{}'", name);
            if let Err(e) = handle.shutdown().await {
                warn!("Provider '{}' teardown failed: {}", name, e);
                failures.push((name, e));
            }
        }
        failures
    }
}
