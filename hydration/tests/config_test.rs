#[cfg(test)]
mod tests {
    use grants_hydration::config::PortalConfig;
    use std::time::Duration;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = PortalConfig::from_toml_str("").unwrap();

        assert_eq!(cfg.cache.key_prefix, "profile:");
        assert_eq!(cfg.cache.expiry_minutes, 30);
        assert_eq!(cfg.cache.local_expiry_minutes, 10);
        assert!(cfg.cache.local.path.is_none());
        assert!(cfg.etcd.is_none());
        assert_eq!(cfg.resilience.max_retry_attempts, 3);
        assert_eq!(cfg.resilience.initial_backoff_ms, 1000);
        assert_eq!(cfg.resilience.max_backoff_ms, 10_000);
        assert_eq!(cfg.resilience.total_timeout_secs, 10);
        assert_eq!(cfg.resilience.circuit_breaker.minimum_throughput, 5);
        assert_eq!(cfg.demo.simulated_delay_ms, 50);
        assert!(!cfg.unity.fallback_to_mock);
        assert!(cfg.plugin_configurations.is_empty());
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_full_config_parses() {
        let content = r#"
[cache]
key_prefix = "grants:"
expiry_minutes = 60
local_expiry_minutes = 5

[cache.local]
max_size_mb = 50

[etcd]
endpoints = ["http://127.0.0.1:2379"]
prefix = "/portal/"

[resilience]
max_retry_attempts = 2

[resilience.circuit_breaker]
break_duration_secs = 15

[unity]
fallback_to_mock = true

[[plugin_configurations]]
plugin_id = "UNITY"
configuration_json = '{"baseUrl":"https://unity.example.gov","apiKey":"k"}'

[logging]
level = "debug"
json = true
"#;
        let cfg = PortalConfig::from_toml_str(content).unwrap();

        assert_eq!(cfg.cache.key_prefix, "grants:");
        assert_eq!(cfg.cache.expiration(), Duration::from_secs(3600));
        assert_eq!(cfg.cache.local.max_size_mb, 50);
        let etcd = cfg.etcd.unwrap();
        assert_eq!(etcd.endpoints, vec!["http://127.0.0.1:2379".to_string()]);
        assert_eq!(etcd.prefix, "/portal/");
        assert_eq!(etcd.timeout_secs, 5);
        assert_eq!(cfg.resilience.max_retry_attempts, 2);
        assert_eq!(cfg.resilience.circuit_breaker.break_duration_secs, 15);
        assert_eq!(cfg.resilience.circuit_breaker.failure_ratio, 0.5);
        assert!(cfg.unity.fallback_to_mock);
        assert_eq!(cfg.plugin_configurations.len(), 1);
        assert!(cfg.plugin_configurations[0].is_active);
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("grants-hydration-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[demo]\nsimulated_delay_ms = 5\n").unwrap();

        let cfg = PortalConfig::load(&path).unwrap();
        assert_eq!(cfg.demo.simulated_delay_ms, 5);

        // Cleanup
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_shipped_sample_config_loads() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/hydration.toml");

        let cfg = PortalConfig::load(&path).unwrap();

        assert_eq!(cfg.etcd.unwrap().prefix, "/grants/profiles/");
        assert_eq!(cfg.cache.local_expiry_minutes, 10);
        assert_eq!(cfg.cache.local_expiration(true), Duration::from_secs(5 * 60));
        assert_eq!(cfg.cache.local_expiration(false), Duration::from_secs(10 * 60));
        assert_eq!(cfg.plugin_configurations.len(), 1);
        let unity = grants_hydration::external::PluginConfiguration::new(
            &cfg.plugin_configurations[0].plugin_id,
            &cfg.plugin_configurations[0].configuration_json,
        );
        let parsed = unity.parse().unwrap();
        assert_eq!(parsed.base_url, "https://unity.example.gov");
        assert_eq!(parsed.timeout_seconds, 30);
        assert!(parsed.enable_circuit_breaker);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join("grants-hydration-does-not-exist.toml");
        assert!(PortalConfig::load(&path).is_err());
    }
}
