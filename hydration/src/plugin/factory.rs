use crate::plugin::ProfilePlugin;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves plugin ids to live plugin instances.
///
/// The id index is built lazily on the first miss. Lookups read the index
/// without the build lock; a miss takes the lock and rechecks before rebuilding.
pub struct PluginFactory {
    plugins: Vec<Arc<dyn ProfilePlugin>>,
    index: RwLock<HashMap<String, Arc<dyn ProfilePlugin>>>,
    build_lock: Mutex<()>,
}

impl PluginFactory {
    pub fn new(plugins: Vec<Arc<dyn ProfilePlugin>>) -> Self {
        Self {
            plugins,
            index: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
        }
    }

    pub fn get_plugin(&self, plugin_id: &str) -> Option<Arc<dyn ProfilePlugin>> {
        debug!("Resolving plugin for plugin ID: {}", plugin_id);

        if plugin_id.trim().is_empty() {
            warn!("Attempted to resolve plugin with empty plugin ID");
            return None;
        }

        let lookup = plugin_id.trim().to_ascii_uppercase();

        if let Some(plugin) = self.index.read().get(&lookup) {
            return Some(Arc::clone(plugin));
        }

        let _guard = self.build_lock.lock();

        // Double-check: another caller may have built the index while we waited.
        if let Some(plugin) = self.index.read().get(&lookup) {
            return Some(Arc::clone(plugin));
        }

        let mut index = self.index.write();
        let mut found = None;
        for plugin in &self.plugins {
            let id = plugin.plugin_id().to_ascii_uppercase();
            if id == lookup {
                debug!(
                    "Found plugin {} for plugin ID: {}",
                    plugin.implementation_type(),
                    plugin_id
                );
                found = Some(Arc::clone(plugin));
            }
            let _ = index.insert(id, Arc::clone(plugin));
        }

        if found.is_none() {
            warn!("No plugin found for plugin ID: {}", plugin_id);
        }
        found
    }

    pub fn get_all_plugins(&self) -> Vec<Arc<dyn ProfilePlugin>> {
        debug!("Retrieving all available plugins");
        self.plugins.clone()
    }
}
