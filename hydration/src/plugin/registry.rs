use crate::plugin::{PluginSupportedFeature, ProfilePlugin};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Static facts about a registered plugin, captured without keeping the plugin alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub plugin_id: String,
    pub implementation_type: String,
    pub description: String,
    pub supported_features: Vec<PluginSupportedFeature>,
}

/// Read-mostly catalogue of plugins used to validate requests before any
/// plugin is invoked. Populated once; later `initialize` calls are ignored.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: OnceLock<HashMap<String, PluginInfo>>,
}

fn normalize(id: &str) -> String {
    id.trim().to_ascii_uppercase()
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&self, plugins: &[Arc<dyn ProfilePlugin>]) {
        let mut first_call = false;
        let _ = self.plugins.get_or_init(|| {
            first_call = true;
            let mut map = HashMap::with_capacity(plugins.len());
            for plugin in plugins {
                let info = PluginInfo {
                    plugin_id: plugin.plugin_id().to_string(),
                    implementation_type: plugin.implementation_type().to_string(),
                    description: plugin.description(),
                    supported_features: plugin.supported_features().to_vec(),
                };
                info!(
                    "Registering plugin: {} ({} features)",
                    info.plugin_id,
                    info.supported_features.len()
                );
                let _ = map.insert(normalize(plugin.plugin_id()), info);
            }
            map
        });

        if !first_call {
            debug!("Plugin registry already initialized, ignoring");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.plugins.get().is_some()
    }

    fn entries(&self) -> Option<&HashMap<String, PluginInfo>> {
        self.plugins.get()
    }

    pub fn is_valid_plugin_id(&self, plugin_id: &str) -> bool {
        if plugin_id.trim().is_empty() {
            return false;
        }
        self.entries()
            .is_some_and(|m| m.contains_key(&normalize(plugin_id)))
    }

    pub fn is_valid_provider_key(&self, plugin_id: &str, provider: &str, key: &str) -> bool {
        if plugin_id.trim().is_empty() || provider.trim().is_empty() || key.trim().is_empty() {
            return false;
        }
        match self.get_plugin_info(plugin_id) {
            Some(info) => info
                .supported_features
                .iter()
                .any(|f| f.matches(provider, key)),
            None => false,
        }
    }

    pub fn get_plugin_info(&self, plugin_id: &str) -> Option<&PluginInfo> {
        self.entries()?.get(&normalize(plugin_id))
    }

    pub fn get_supported_features(&self, plugin_id: &str) -> Vec<PluginSupportedFeature> {
        self.get_plugin_info(plugin_id)
            .map(|info| info.supported_features.clone())
            .unwrap_or_default()
    }

    pub fn get_all_plugin_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries()
            .map(|m| m.values().map(|info| info.plugin_id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// All registered plugins, ordered by plugin id
    pub fn get_all_plugins(&self) -> Vec<PluginInfo> {
        let mut plugins: Vec<PluginInfo> = self
            .entries()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        plugins.sort_by(|a, b| a.plugin_id.cmp(&b.plugin_id));
        plugins
    }

    /// Providers across every plugin, deduplicated case-insensitively and sorted
    pub fn get_all_supported_providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = Vec::new();
        for info in self.get_all_plugins() {
            for feature in &info.supported_features {
                if !providers
                    .iter()
                    .any(|p| p.eq_ignore_ascii_case(&feature.provider))
                {
                    providers.push(feature.provider.clone());
                }
            }
        }
        providers.sort_by_key(|p| p.to_ascii_uppercase());
        providers
    }
}
