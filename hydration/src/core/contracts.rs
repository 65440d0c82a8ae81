use crate::error::HydrationError;
use crate::plugin::{PluginSupportedFeature, ProfilePopulationMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Retrieval or hydration request as received from the web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub profile_id: Uuid,
    pub plugin_id: String,
    pub provider: String,
    pub key: String,
    #[serde(default)]
    pub additional_data: Option<BTreeMap<String, serde_json::Value>>,
}

impl ProfileRequest {
    pub fn new(profile_id: Uuid, plugin_id: &str, provider: &str, key: &str) -> Self {
        Self {
            profile_id,
            plugin_id: plugin_id.to_string(),
            provider: provider.to_string(),
            key: key.to_string(),
            additional_data: None,
        }
    }

    pub fn with_additional_data(mut self, additional_data: BTreeMap<String, serde_json::Value>) -> Self {
        self.additional_data = Some(additional_data);
        self
    }

    pub fn validate(&self) -> Result<(), HydrationError> {
        if self.profile_id.is_nil() {
            return Err(HydrationError::InvalidRequest(
                "profile id must not be empty".to_string(),
            ));
        }
        for (field, value) in [
            ("plugin id", &self.plugin_id),
            ("provider", &self.provider),
            ("key", &self.key),
        ] {
            if value.trim().is_empty() {
                return Err(HydrationError::InvalidRequest(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        Ok(())
    }

    pub fn to_metadata(&self) -> ProfilePopulationMetadata {
        ProfilePopulationMetadata::new(self.profile_id, &self.plugin_id, &self.provider, &self.key)
            .with_additional_data(self.additional_data.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub plugin_id: String,
    pub description: String,
    pub supported_features: Vec<PluginSupportedFeature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDescriptor {
    pub key: String,
    pub description: String,
}

/// One plugin's features grouped by provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFeatures {
    pub plugin_id: String,
    pub description: String,
    pub provider_features: BTreeMap<String, Vec<FeatureDescriptor>>,
}

impl PluginFeatures {
    pub fn from_features(
        plugin_id: &str,
        description: &str,
        features: &[PluginSupportedFeature],
    ) -> Self {
        let mut provider_features: BTreeMap<String, Vec<FeatureDescriptor>> = BTreeMap::new();
        for feature in features {
            provider_features
                .entry(feature.provider.clone())
                .or_default()
                .push(FeatureDescriptor {
                    key: feature.key.clone(),
                    description: feature.description.clone(),
                });
        }
        Self {
            plugin_id: plugin_id.to_string(),
            description: description.to_string(),
            provider_features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginFeaturesListing {
    pub plugin_features: Vec<PluginFeatures>,
    pub all_supported_providers: Vec<String>,
}
