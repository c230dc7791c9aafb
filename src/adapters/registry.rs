use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::traits::ChainAdapter;

/// Adapters by chain name
///
/// Built during bootstrap and never changed afterwards. Iteration is
/// ordered by name so every tick visits chains in the same order.
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        let name = adapter.name().to_string();
        if self.adapters.insert(name.clone(), adapter).is_some() {
            warn!("⚠️  Replacing adapter already registered for {}", name);
        } else {
            info!("Registering chain adapter: {}", name);
        }
    }

    pub fn get(&self, chain: &str) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(chain).cloned()
    }

    pub fn supports_chain(&self, chain: &str) -> bool {
        self.adapters.contains_key(chain)
    }

    pub fn chains(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    /// Adapters sorted by chain name
    pub fn adapters(&self) -> Vec<Arc<dyn ChainAdapter>> {
        self.adapters.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
