//! Adapter registry — resolves a platform integration id to the adapter
//! that can act on it. Adapters register by kind; integrations bind their
//! id to a kind. An unbound id falls back to being treated as a kind name
//! itself, which keeps single-adapter setups zero-config.

use postpilot_core::ExecutionAdapter;
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup table from platform kind / platform id to adapter.
pub struct AdapterRegistry {
    /// Adapter per platform kind ("webhook", "instagram", ...).
    adapters: HashMap<String, Arc<dyn ExecutionAdapter>>,
    /// Platform integration id → kind.
    bindings: HashMap<String, String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    /// Register an adapter under its own kind.
    pub fn register(&mut self, adapter: Arc<dyn ExecutionAdapter>) {
        let kind = adapter.kind().to_string();
        tracing::debug!("🔌 Adapter registered: {kind}");
        self.adapters.insert(kind, adapter);
    }

    /// Bind a platform integration id to an adapter kind.
    pub fn bind(&mut self, platform_id: impl Into<String>, kind: impl Into<String>) {
        self.bindings.insert(platform_id.into(), kind.into());
    }

    /// Resolve the adapter for a platform integration id: explicit binding
    /// first, then the id itself as a kind.
    pub fn resolve(&self, platform_id: &str) -> Option<Arc<dyn ExecutionAdapter>> {
        let kind = self
            .bindings
            .get(platform_id)
            .map(String::as_str)
            .unwrap_or(platform_id);
        self.adapters.get(kind).cloned()
    }

    /// All registered kinds, for diagnostics.
    pub fn kinds(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
