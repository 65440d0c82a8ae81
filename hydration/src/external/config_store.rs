use crate::config::PluginConfigurationEntry;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Persisted plugin configuration record. `configuration_json` holds an
/// [`ExternalServiceConfiguration`] document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfiguration {
    pub plugin_id: String,
    pub configuration_json: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PluginConfiguration {
    pub fn new(plugin_id: &str, configuration_json: &str) -> Self {
        let now = Utc::now();
        Self {
            plugin_id: plugin_id.to_string(),
            configuration_json: configuration_json.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn parse(&self) -> serde_json::Result<ExternalServiceConfiguration> {
        serde_json::from_str(&self.configuration_json)
    }
}

/// Connection settings for a network-backed plugin's upstream API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalServiceConfiguration {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_enable_circuit_breaker")]
    pub enable_circuit_breaker: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_enable_circuit_breaker() -> bool {
    true
}

impl ExternalServiceConfiguration {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
            headers: None,
            timeout_seconds: default_timeout_seconds(),
            max_retry_attempts: default_max_retry_attempts(),
            enable_circuit_breaker: default_enable_circuit_breaker(),
        }
    }
}

/// Read-only source of plugin configurations
#[async_trait]
pub trait PluginConfigurationStore: Send + Sync {
    async fn get_by_plugin_id(&self, plugin_id: &str) -> Result<Option<PluginConfiguration>>;
}

/// Configuration store backed by the `plugin_configurations` section of the config file
#[derive(Debug, Default)]
pub struct StaticConfigurationStore {
    configurations: HashMap<String, PluginConfiguration>,
}

impl StaticConfigurationStore {
    pub fn new(configurations: Vec<PluginConfiguration>) -> Self {
        let configurations = configurations
            .into_iter()
            .map(|c| (c.plugin_id.to_ascii_uppercase(), c))
            .collect();
        Self { configurations }
    }

    pub fn from_entries(entries: &[PluginConfigurationEntry]) -> Self {
        let configurations = entries
            .iter()
            .map(|entry| {
                let mut configuration =
                    PluginConfiguration::new(&entry.plugin_id, &entry.configuration_json);
                configuration.is_active = entry.is_active;
                configuration
            })
            .collect();
        Self::new(configurations)
    }
}

#[async_trait]
impl PluginConfigurationStore for StaticConfigurationStore {
    async fn get_by_plugin_id(&self, plugin_id: &str) -> Result<Option<PluginConfiguration>> {
        debug!("Getting configuration for plugin {}", plugin_id);

        match self.configurations.get(&plugin_id.to_ascii_uppercase()) {
            Some(configuration) if configuration.is_active => Ok(Some(configuration.clone())),
            Some(_) => {
                warn!("Configuration for plugin {} is inactive", plugin_id);
                Ok(None)
            }
            None => {
                warn!("Configuration not found for plugin {}", plugin_id);
                Ok(None)
            }
        }
    }
}
