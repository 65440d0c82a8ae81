use crate::config::UnityPluginConfig;
use crate::error::HydrationError;
use crate::external::{ExternalServiceClient, ServiceErrorKind, ServiceRequest};
use crate::plugin::{PluginSupportedFeature, ProfileData, ProfilePlugin, ProfilePopulationMetadata};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const UNITY_PLUGIN_ID: &str = "UNITY";

/// Network-backed plugin for the Unity grants management API
pub struct UnityProfilePlugin {
    client: Arc<ExternalServiceClient>,
    features: Vec<PluginSupportedFeature>,
    fallback_to_mock: bool,
}

impl UnityProfilePlugin {
    pub fn new(client: Arc<ExternalServiceClient>, config: &UnityPluginConfig) -> Self {
        Self {
            client,
            features: vec![
                PluginSupportedFeature::new("UNITY", "PROFILE", "Unity user profile data"),
                PluginSupportedFeature::new("UNITY", "EMPLOYMENT", "Unity employment information"),
                PluginSupportedFeature::new("UNITY", "SECURITY", "Unity security clearance data"),
            ],
            fallback_to_mock: config.fallback_to_mock,
        }
    }

    fn build_request(metadata: &ProfilePopulationMetadata) -> ServiceRequest {
        let mut request = ServiceRequest::get(&endpoint_for(
            &metadata.provider,
            &metadata.key,
            metadata.profile_id,
        ))
        .with_query_param("profileId", &metadata.profile_id.to_string())
        .with_query_param("provider", &metadata.provider)
        .with_query_param("key", &metadata.key);

        for (name, value) in metadata.additional_data.iter().flatten() {
            request = request.with_query_param(name, &query_value(value));
        }
        request
    }
}

/// Upstream path for a (provider, key) pair
pub fn endpoint_for(provider: &str, key: &str, profile_id: Uuid) -> String {
    let provider = provider.to_ascii_uppercase();
    let key = key.to_ascii_uppercase();
    match (provider.as_str(), key.as_str()) {
        ("UNITY", "PROFILE") => format!("/api/v1/profiles/{}", profile_id),
        ("UNITY", "EMPLOYMENT") => format!("/api/v1/profiles/{}/employment", profile_id),
        ("UNITY", "SECURITY") => format!("/api/v1/profiles/{}/security", profile_id),
        _ => format!("/api/v1/profiles/{}/data", profile_id),
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ProfilePlugin for UnityProfilePlugin {
    fn plugin_id(&self) -> &str {
        UNITY_PLUGIN_ID
    }

    fn supported_features(&self) -> &[PluginSupportedFeature] {
        &self.features
    }

    async fn populate_profile(
        &self,
        metadata: &ProfilePopulationMetadata,
        cancel: &CancellationToken,
    ) -> Result<ProfileData, HydrationError> {
        info!(
            "Unity plugin populating profile for ProfileId: {}",
            metadata.profile_id
        );

        let request = Self::build_request(metadata);
        let response = self.client.call(UNITY_PLUGIN_ID, &request, cancel).await;

        if response.is_success {
            info!(
                "Unity plugin successfully populated profile for ProfileId: {}",
                metadata.profile_id
            );
            return Ok(ProfileData::for_request(
                metadata,
                response.data.unwrap_or_default(),
            ));
        }

        if response.error_kind == Some(ServiceErrorKind::Cancelled) || cancel.is_cancelled() {
            return Err(HydrationError::Cancelled);
        }

        let message = response
            .error_message
            .unwrap_or_else(|| format!("HTTP {}", response.status_code));
        error!(
            "Unity service call failed for ProfileId: {}. Error: {}",
            metadata.profile_id, message
        );

        if self.fallback_to_mock {
            warn!(
                "Falling back to mock data for ProfileId: {} ({}/{})",
                metadata.profile_id, metadata.provider, metadata.key
            );
            let json_data = serde_json::to_string(&mock_payload(metadata))
                .map_err(HydrationError::population_failed)?;
            return Ok(ProfileData::for_request(metadata, json_data));
        }

        match response.error_kind {
            Some(ServiceErrorKind::ConfigurationMissing) => Err(
                HydrationError::ConfigurationMissing(UNITY_PLUGIN_ID.to_string()),
            ),
            _ => Err(HydrationError::ExternalServiceFailure {
                status: response.status_code,
                message,
            }),
        }
    }
}

/// Placeholder payload served when the upstream is unavailable. Always flagged with `IsMockData`.
pub fn mock_payload(metadata: &ProfilePopulationMetadata) -> Value {
    let now = Utc::now();
    let provider = metadata.provider.to_ascii_uppercase();
    let key = metadata.key.to_ascii_uppercase();
    let data = match (provider.as_str(), key.as_str()) {
        ("UNITY", "PROFILE") => json!({
            "PersonalInfo": {
                "FirstName": "John",
                "LastName": "Doe",
                "Email": "john.doe@unity.gov",
                "Phone": "+1-555-0123",
                "EmployeeId": "UNI-12345",
            }
        }),
        ("UNITY", "EMPLOYMENT") => json!({
            "Employment": {
                "Department": "Department of Health",
                "Position": "Senior Analyst",
                "StartDate": "2020-01-15",
                "EmployeeId": "UNI-12345",
                "Manager": "Jane Smith",
                "Location": "Building A, Room 205",
            }
        }),
        ("UNITY", "SECURITY") => json!({
            "Security": {
                "ClearanceLevel": "Secret",
                "BadgeNumber": "B789456",
                "LastUpdated": now,
                "ExpiryDate": now + Duration::days(730),
                "AccessLevel": "Level 3",
            }
        }),
        _ => json!({
            "Message": "Unity data available for:",
            "AvailableProviders": ["UNITY"],
            "AvailableKeys": ["PROFILE", "EMPLOYMENT", "SECURITY"],
            "Instructions": "Use Provider and Key parameters to get specific Unity data",
            "Examples": [
                "Provider=UNITY, Key=PROFILE - Get Unity user profile data",
                "Provider=UNITY, Key=EMPLOYMENT - Get Unity employment information",
                "Provider=UNITY, Key=SECURITY - Get Unity security clearance data",
            ],
        }),
    };

    json!({
        "ProfileId": metadata.profile_id,
        "Provider": metadata.provider,
        "Key": metadata.key,
        "Source": "Unity (Mock)",
        "PopulatedAt": now,
        "PopulatedBy": UNITY_PLUGIN_ID,
        "IsMockData": true,
        "Data": data,
    })
}
