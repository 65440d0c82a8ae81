use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub etcd: Option<EtcdConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub demo: DemoPluginConfig,
    #[serde(default)]
    pub unity: UnityPluginConfig,
    #[serde(default)]
    pub plugin_configurations: Vec<PluginConfigurationEntry>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Absolute expiration of the distributed tier
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u64,
    /// Expiration of the in-process tier
    #[serde(default = "default_local_expiry_minutes")]
    pub local_expiry_minutes: u64,
    #[serde(default)]
    pub local: LocalCacheConfig,
}

fn default_key_prefix() -> String {
    "profile:".to_string()
}

fn default_expiry_minutes() -> u64 {
    30
}

fn default_local_expiry_minutes() -> u64 {
    10
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            expiry_minutes: default_expiry_minutes(),
            local_expiry_minutes: default_local_expiry_minutes(),
            local: LocalCacheConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiry_minutes * 60)
    }

    /// Local tier TTL. With a shared distributed tier the local copy is kept
    /// short so instances converge quickly; it never outlives the distributed entry.
    pub fn local_expiration(&self, distributed_available: bool) -> Duration {
        let minutes = if distributed_available {
            self.local_expiry_minutes.min(self.expiry_minutes / 6).max(1)
        } else {
            self.local_expiry_minutes
        };
        Duration::from_secs(minutes.min(self.expiry_minutes) * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCacheConfig {
    /// sled directory; a temporary store is used when unset
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_cache_max_size")]
    pub max_size_mb: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_cache_max_size() -> u64 {
    100
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_size_mb: default_cache_max_size(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    pub endpoints: Vec<String>,
    #[serde(default = "default_etcd_prefix")]
    pub prefix: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_etcd_prefix() -> String {
    "/grants/".to_string()
}

fn default_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("grants-hydration/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_total_timeout() -> u64 {
    10
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            total_timeout_secs: default_total_timeout(),
            circuit_breaker: CircuitBreakerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,
    #[serde(default = "default_sampling_duration")]
    pub sampling_duration_secs: u64,
    #[serde(default = "default_minimum_throughput")]
    pub minimum_throughput: usize,
    #[serde(default = "default_break_duration")]
    pub break_duration_secs: u64,
}

fn default_failure_ratio() -> f64 {
    0.5
}

fn default_sampling_duration() -> u64 {
    30
}

fn default_minimum_throughput() -> usize {
    5
}

fn default_break_duration() -> u64 {
    30
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_ratio: default_failure_ratio(),
            sampling_duration_secs: default_sampling_duration(),
            minimum_throughput: default_minimum_throughput(),
            break_duration_secs: default_break_duration(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoPluginConfig {
    #[serde(default = "default_simulated_delay")]
    pub simulated_delay_ms: u64,
}

fn default_simulated_delay() -> u64 {
    50
}

impl Default for DemoPluginConfig {
    fn default() -> Self {
        Self {
            simulated_delay_ms: default_simulated_delay(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnityPluginConfig {
    /// Serve generated mock data when the Unity upstream fails
    #[serde(default)]
    pub fallback_to_mock: bool,
}

/// Backing record for the in-process plugin configuration store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfigurationEntry {
    pub plugin_id: String,
    pub configuration_json: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl PortalConfig {
    /// Load from a TOML file, with `GRANTS__SECTION__FIELD` environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("GRANTS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;
        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn default_config() -> Self {
        Self {
            cache: CacheConfig::default(),
            etcd: None,
            http: HttpConfig::default(),
            resilience: ResilienceConfig::default(),
            demo: DemoPluginConfig::default(),
            unity: UnityPluginConfig::default(),
            plugin_configurations: vec![],
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_expiration_is_shortened_with_distributed_tier() {
        let cache = CacheConfig::default();
        assert_eq!(cache.local_expiration(false), Duration::from_secs(10 * 60));
        assert_eq!(cache.local_expiration(true), Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_local_expiration_never_exceeds_distributed() {
        let cache = CacheConfig {
            expiry_minutes: 2,
            local_expiry_minutes: 10,
            ..CacheConfig::default()
        };
        assert_eq!(cache.local_expiration(false), Duration::from_secs(2 * 60));
        assert_eq!(cache.local_expiration(true), Duration::from_secs(60));
    }
}
