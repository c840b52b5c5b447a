use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::PmsAdapter;
use crate::beds24::Beds24Adapter;
use crate::cloudbeds::CloudbedsAdapter;
use crate::smoobu::SmoobuAdapter;

/// Adapters resolved by integration type name. The engine never sees a
/// concrete adapter type, only the trait object this registry hands out.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn PmsAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the production adapters, each carrying the shared PMS
    /// call deadline.
    pub fn with_builtin(pms_deadline: Duration) -> Self {
        let mut registry = Self::new();
        registry.register("beds24", Arc::new(Beds24Adapter::new(pms_deadline)));
        registry.register("smoobu", Arc::new(SmoobuAdapter::new(pms_deadline)));
        registry.register("cloudbeds", Arc::new(CloudbedsAdapter::new(pms_deadline)));
        registry
    }

    pub fn register(&mut self, integration_type: impl Into<String>, adapter: Arc<dyn PmsAdapter>) {
        self.adapters.insert(integration_type.into(), adapter);
    }

    pub fn resolve(&self, integration_type: &str) -> Option<Arc<dyn PmsAdapter>> {
        self.adapters.get(integration_type).cloned()
    }

    pub fn known_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::mock::MockAdapter;

    use super::AdapterRegistry;

    #[test]
    fn builtin_registry_knows_the_three_variants() {
        let registry = AdapterRegistry::with_builtin(Duration::from_secs(60));
        assert_eq!(registry.known_types(), vec!["beds24", "cloudbeds", "smoobu"]);
        assert!(registry.resolve("beds24").is_some());
        assert!(registry.resolve("unknown-pms").is_none());
    }

    #[test]
    fn custom_adapters_can_shadow_builtins() {
        let mut registry = AdapterRegistry::with_builtin(Duration::from_secs(60));
        registry.register("beds24", Arc::new(MockAdapter::new()));
        assert!(registry.resolve("beds24").is_some());
        assert_eq!(registry.known_types().len(), 3);
    }
}
