use crate::error::HydrationError;
use crate::plugin::model::{PluginSupportedFeature, ProfileData, ProfilePopulationMetadata};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ProfilePlugin: Send + Sync {
    /// Plugin identifier, compared case-insensitively
    fn plugin_id(&self) -> &str;

    /// Static declaration of the (provider, key) pairs this plugin serves
    fn supported_features(&self) -> &[PluginSupportedFeature];

    /// Short human-readable name, derived from the implementation type by default
    fn description(&self) -> String {
        let type_name = self.implementation_type();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        short.replace("Plugin", "").replace("Profile", "")
    }

    fn implementation_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Distinct providers, first spelling wins
    fn supported_providers(&self) -> Vec<String> {
        let mut providers: Vec<String> = Vec::new();
        for feature in self.supported_features() {
            if !providers
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&feature.provider))
            {
                providers.push(feature.provider.clone());
            }
        }
        providers
    }

    fn supported_keys(&self, provider: &str) -> Vec<String> {
        if provider.trim().is_empty() {
            return Vec::new();
        }
        self.supported_features()
            .iter()
            .filter(|f| f.provider.eq_ignore_ascii_case(provider))
            .map(|f| f.key.clone())
            .collect()
    }

    fn can_handle(&self, metadata: &ProfilePopulationMetadata) -> bool {
        metadata.plugin_id.eq_ignore_ascii_case(self.plugin_id())
            && self
                .supported_features()
                .iter()
                .any(|f| f.matches(&metadata.provider, &metadata.key))
    }

    /// Retrieve the data for `metadata`. Must stop early once `cancel` fires.
    async fn populate_profile(
        &self,
        metadata: &ProfilePopulationMetadata,
        cancel: &CancellationToken,
    ) -> Result<ProfileData, HydrationError>;
}
