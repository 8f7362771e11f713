//! Known services and their active flag.

use dashmap::DashMap;
use serde::Serialize;

/// A service that reports calls to the hub.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub description: String,
    pub active: bool,
}

/// Registry of services. Unknown services are added the first time they
/// report a call.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceInfo>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Returns `false` if it was already known.
    pub fn register(&self, name: &str, description: &str, active: bool) -> bool {
        if self.services.contains_key(name) {
            return false;
        }
        self.services.insert(
            name.to_string(),
            ServiceInfo {
                name: name.to_string(),
                description: description.to_string(),
                active,
            },
        );
        true
    }

    /// Register `name` as active if unseen.
    pub fn ensure(&self, name: &str) {
        if !self.services.contains_key(name) {
            self.services
                .entry(name.to_string())
                .or_insert_with(|| ServiceInfo {
                    name: name.to_string(),
                    description: String::new(),
                    active: true,
                });
            tracing::debug!(service = name, "Service registered");
        }
    }

    /// Flip the active flag. Returns the new value, or `None` if unknown.
    pub fn toggle(&self, name: &str) -> Option<bool> {
        let mut entry = self.services.get_mut(name)?;
        entry.active = !entry.active;
        Some(entry.active)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.services.get(name).map_or(false, |s| s.active)
    }

    /// All services, sorted by name.
    pub fn list(&self) -> Vec<ServiceInfo> {
        let mut services: Vec<ServiceInfo> = self.services.iter().map(|e| e.value().clone()).collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// `(active, total)`.
    pub fn counts(&self) -> (usize, usize) {
        let active = self.services.iter().filter(|e| e.active).count();
        (active, self.services.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_toggle() {
        let registry = ServiceRegistry::new();
        assert!(registry.register("ApiService", "Core API communication", true));
        assert!(!registry.register("ApiService", "dup", false));
        registry.register("BusyService", "Loading state", false);

        assert_eq!(registry.counts(), (1, 2));
        assert_eq!(registry.toggle("BusyService"), Some(true));
        assert_eq!(registry.counts(), (2, 2));
        assert_eq!(registry.toggle("Nope"), None);
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let registry = ServiceRegistry::new();
        registry.ensure("A");
        registry.toggle("A");
        registry.ensure("A");
        assert!(!registry.is_active("A"));
        assert_eq!(registry.list().len(), 1);
    }
}
