//! Capability name → provider list registry with an active/dormant split
//! for night-mode agents (SPEC_FULL §3 "Capability Registry Entry", §4.2).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
// (none)

/// Two tables mapping `capability_name -> ordered list of provider
/// names`. Providers are indexed in insertion order, which defines
/// broadcast order. Night agents register only into the dormant table;
/// their capabilities are invisible to the matcher/broadcaster until
/// `activate` moves them across.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    active: DashMap<String, Vec<String>>,
    dormant: DashMap<String, Vec<String>>,
}

impl CapabilityRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_to(table: &DashMap<String, Vec<String>>, capability: &str, provider: &str) {
        let mut entry = table.entry(capability.to_string()).or_default();
        if !entry.iter().any(|p| p == provider) {
            entry.push(provider.to_string());
        }
    }

    fn remove_from(table: &DashMap<String, Vec<String>>, capability: &str, provider: &str) {
        if let Some(mut entry) = table.get_mut(capability) {
            entry.retain(|p| p != provider);
        }
    }

    /// Register `provider` under `capability` in the active table
    /// (idempotent: registering twice does not duplicate the entry).
    pub fn register_active(&self, capability: &str, provider: &str) {
        Self::add_to(&self.active, capability, provider);
    }

    /// Register `provider` under `capability` in the dormant table
    /// (night agents).
    pub fn register_dormant(&self, capability: &str, provider: &str) {
        Self::add_to(&self.dormant, capability, provider);
    }

    /// Remove `provider` from `capability`'s active entry.
    pub fn unregister_active(&self, capability: &str, provider: &str) {
        Self::remove_from(&self.active, capability, provider);
    }

    /// Remove `provider` from `capability`'s dormant entry.
    pub fn unregister_dormant(&self, capability: &str, provider: &str) {
        Self::remove_from(&self.dormant, capability, provider);
    }

    /// Move every capability `provider` advertises from dormant to
    /// active (night-mode wake transition).
    pub fn activate(&self, provider: &str, capabilities: &[String]) {
        for capability in capabilities {
            Self::remove_from(&self.dormant, capability, provider);
            Self::add_to(&self.active, capability, provider);
        }
    }

    /// Move every capability `provider` advertises from active to
    /// dormant (night-mode sleep transition).
    pub fn deactivate(&self, provider: &str, capabilities: &[String]) {
        for capability in capabilities {
            Self::remove_from(&self.active, capability, provider);
            Self::add_to(&self.dormant, capability, provider);
        }
    }

    /// Snapshot the ordered provider list for an active `capability`,
    /// empty if none are registered.
    pub fn providers_for(&self, capability: &str) -> Vec<String> {
        self.active
            .get(capability)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let registry = CapabilityRegistry::new();
        registry.register_active("weather", "WeatherAgent");
        registry.register_active("weather", "WeatherAgent");
        assert_eq!(registry.providers_for("weather"), vec!["WeatherAgent"]);
    }

    #[test]
    fn insertion_order_defines_broadcast_order() {
        let registry = CapabilityRegistry::new();
        registry.register_active("lights", "Lights");
        registry.register_active("lights", "BackupLights");
        assert_eq!(
            registry.providers_for("lights"),
            vec!["Lights".to_string(), "BackupLights".to_string()]
        );
    }

    #[test]
    fn dormant_capabilities_are_invisible_to_providers_for() {
        let registry = CapabilityRegistry::new();
        registry.register_dormant("wake_up", "NightAgent");
        assert!(registry.providers_for("wake_up").is_empty());
    }

    #[test]
    fn activate_then_deactivate_restores_original_state() {
        let registry = CapabilityRegistry::new();
        let caps = vec!["wake_up".to_string()];
        registry.register_dormant("wake_up", "NightAgent");

        registry.activate("NightAgent", &caps);
        assert_eq!(registry.providers_for("wake_up"), vec!["NightAgent"]);

        registry.deactivate("NightAgent", &caps);
        assert!(registry.providers_for("wake_up").is_empty());
    }
}
