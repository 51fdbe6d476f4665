//! State store - the run-scoped variable space shared by all steps

use crate::core::error::ErrorKind;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

/// Ordered key-value space holding the variables produced and consumed by
/// steps during one run.
///
/// Created empty at run start, populated incrementally by step outputs and
/// discarded (or returned to the caller) at run end. Keys are visible
/// run-wide: a step anywhere later in the run may read a key written by any
/// earlier step, including inside a different loop iteration or branch arm.
/// Owned by exactly one run; concurrent runs each get their own store.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    values: IndexMap<String, Value>,
}

impl StateStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a variable, overwriting any prior value for that key
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!("State write: {}", key);
        self.values.insert(key, value);
    }

    /// Read a variable, if it has been written
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Read a variable, failing with `UnboundVariable` if it was never written
    pub fn lookup(&self, key: &str) -> Result<&Value, ErrorKind> {
        self.values
            .get(key)
            .ok_or_else(|| ErrorKind::UnboundVariable(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Variable names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Clone the current contents
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.values.clone()
    }

    /// Consume the store, yielding its contents
    pub fn into_values(self) -> IndexMap<String, Value> {
        self.values
    }
}
