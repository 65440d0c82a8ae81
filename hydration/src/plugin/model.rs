use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One (provider, key) combination a plugin can retrieve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSupportedFeature {
    pub provider: String,
    pub key: String,
    pub description: String,
}

impl PluginSupportedFeature {
    pub fn new(provider: &str, key: &str, description: &str) -> Self {
        Self {
            provider: provider.to_string(),
            key: key.to_string(),
            description: description.to_string(),
        }
    }

    pub fn matches(&self, provider: &str, key: &str) -> bool {
        self.provider.eq_ignore_ascii_case(provider) && self.key.eq_ignore_ascii_case(key)
    }
}

/// Request descriptor handed to a plugin for a single hydration attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePopulationMetadata {
    pub profile_id: Uuid,
    pub plugin_id: String,
    pub provider: String,
    pub key: String,
    #[serde(default)]
    pub additional_data: Option<BTreeMap<String, serde_json::Value>>,
    pub requested_at: DateTime<Utc>,
}

impl ProfilePopulationMetadata {
    pub fn new(profile_id: Uuid, plugin_id: &str, provider: &str, key: &str) -> Self {
        Self {
            profile_id,
            plugin_id: plugin_id.to_string(),
            provider: provider.to_string(),
            key: key.to_string(),
            additional_data: None,
            requested_at: Utc::now(),
        }
    }

    pub fn with_additional_data(
        mut self,
        additional_data: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Self {
        self.additional_data = additional_data;
        self
    }

    pub fn with_requested_at(mut self, requested_at: DateTime<Utc>) -> Self {
        self.requested_at = requested_at;
        self
    }
}

/// Hydrated result produced by a plugin and stored in the cache as JSON.
///
/// `json_data` is opaque: its schema belongs to the plugin that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileData {
    pub profile_id: Uuid,
    pub plugin_id: String,
    pub provider: String,
    pub key: String,
    pub json_data: String,
    pub populated_at: DateTime<Utc>,
}

impl ProfileData {
    /// Builds a result whose identity echoes the request it answers.
    pub fn for_request(metadata: &ProfilePopulationMetadata, json_data: String) -> Self {
        Self {
            profile_id: metadata.profile_id,
            plugin_id: metadata.plugin_id.clone(),
            provider: metadata.provider.clone(),
            key: metadata.key.clone(),
            json_data,
            populated_at: Utc::now(),
        }
    }
}
