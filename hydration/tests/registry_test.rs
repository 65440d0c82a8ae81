#[cfg(test)]
mod tests {
    use grants_hydration::config::{ResilienceConfig, UnityPluginConfig};
    use grants_hydration::external::{
        ExternalServiceClient, PluginConfigurationStore, ResiliencePolicy, StaticConfigurationStore,
    };
    use grants_hydration::plugin::{PluginFactory, PluginRegistry, ProfilePlugin};
    use grants_hydration::plugins::{DemoProfilePlugin, UnityProfilePlugin};
    use std::sync::Arc;
    use std::time::Duration;

    fn plugins() -> Vec<Arc<dyn ProfilePlugin>> {
        let store: Arc<dyn PluginConfigurationStore> = Arc::new(StaticConfigurationStore::new(vec![]));
        let client = ExternalServiceClient::new(
            reqwest::Client::new(),
            store,
            Arc::new(ResiliencePolicy::new(&ResilienceConfig::default())),
        );
        vec![
            Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO)),
            Arc::new(UnityProfilePlugin::new(
                Arc::new(client),
                &UnityPluginConfig::default(),
            )),
        ]
    }

    fn registry() -> PluginRegistry {
        let registry = PluginRegistry::new();
        registry.initialize(&plugins());
        registry
    }

    #[test]
    fn test_uninitialized_registry_rejects_everything() {
        let registry = PluginRegistry::new();
        assert!(!registry.is_initialized());
        assert!(!registry.is_valid_plugin_id("DEMO"));
        assert!(registry.get_all_plugins().is_empty());
        assert!(registry.get_supported_features("DEMO").is_empty());
    }

    #[test]
    fn test_plugin_ids_are_case_insensitive() {
        let registry = registry();
        assert!(registry.is_initialized());
        assert!(registry.is_valid_plugin_id("DEMO"));
        assert!(registry.is_valid_plugin_id("demo"));
        assert!(registry.is_valid_plugin_id(" Unity "));
        assert!(!registry.is_valid_plugin_id(""));
        assert!(!registry.is_valid_plugin_id("UNKNOWN"));
        assert_eq!(registry.get_all_plugin_ids(), vec!["DEMO", "UNITY"]);
    }

    #[test]
    fn test_provider_key_validation() {
        let registry = registry();
        assert!(registry.is_valid_provider_key("DEMO", "PROGRAM1", "CONTACTS"));
        assert!(registry.is_valid_provider_key("demo", "program2", "orginfo"));
        assert!(!registry.is_valid_provider_key("DEMO", "PROGRAM2", "CONTACTS"));
        assert!(!registry.is_valid_provider_key("DEMO", "", "SUBMISSIONS"));
        assert!(!registry.is_valid_provider_key("UNKNOWN", "PROGRAM1", "SUBMISSIONS"));
        assert!(registry.is_valid_provider_key("UNITY", "UNITY", "SECURITY"));
        assert!(!registry.is_valid_provider_key("UNITY", "UNITY", "PAYMENTS"));
    }

    #[test]
    fn test_second_initialize_is_ignored() {
        let registry = registry();
        registry.initialize(&[]);
        assert_eq!(registry.get_all_plugins().len(), 2);
    }

    #[test]
    fn test_plugin_info_snapshot() {
        let registry = registry();
        let info = registry.get_plugin_info("unity").unwrap();
        assert_eq!(info.plugin_id, "UNITY");
        assert_eq!(info.description, "Unity");
        assert!(info.implementation_type.ends_with("UnityProfilePlugin"));
        assert_eq!(info.supported_features.len(), 3);
        assert_eq!(
            registry.get_all_supported_providers(),
            vec!["PROGRAM1", "PROGRAM2", "UNITY"]
        );
    }

    #[test]
    fn test_factory_resolves_case_insensitively() {
        let factory = PluginFactory::new(plugins());

        assert_eq!(factory.get_plugin("demo").unwrap().plugin_id(), "DEMO");
        assert_eq!(factory.get_plugin("Unity").unwrap().plugin_id(), "UNITY");
        assert!(factory.get_plugin("UNKNOWN").is_none());
        assert!(factory.get_plugin("  ").is_none());
        assert_eq!(factory.get_all_plugins().len(), 2);
    }

    #[tokio::test]
    async fn test_factory_concurrent_first_lookups() {
        let factory = Arc::new(PluginFactory::new(plugins()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let factory = Arc::clone(&factory);
            handles.push(tokio::spawn(async move {
                let id = if i % 2 == 0 { "DEMO" } else { "unity" };
                factory.get_plugin(id).map(|p| p.plugin_id().to_string())
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            let expected = if i % 2 == 0 { "DEMO" } else { "UNITY" };
            assert_eq!(handle.await.unwrap().as_deref(), Some(expected));
        }
    }
}
