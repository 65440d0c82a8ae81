use crate::cache::{build_cache_key, CacheEntryOptions, HybridCache};
use crate::config::{CacheConfig, PortalConfig};
use crate::core::contracts::{PluginFeatures, PluginFeaturesListing, PluginSummary, ProfileRequest};
use crate::error::HydrationError;
use crate::external::{ExternalServiceClient, PluginConfigurationStore, StaticConfigurationStore};
use crate::metrics::HydrationMetrics;
use crate::plugin::{
    PluginFactory, PluginRegistry, ProfileData, ProfilePlugin, ProfilePopulationMetadata,
};
use crate::plugins::builtin_plugins;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Entry point for profile retrieval and hydration.
pub struct HydrationOrchestrator {
    registry: Arc<PluginRegistry>,
    factory: Arc<PluginFactory>,
    cache: HybridCache,
    key_prefix: String,
    entry_options: CacheEntryOptions,
    metrics: Arc<HydrationMetrics>,
}

impl HydrationOrchestrator {
    pub fn new(
        plugins: Vec<Arc<dyn ProfilePlugin>>,
        cache: HybridCache,
        cache_config: &CacheConfig,
        metrics: Arc<HydrationMetrics>,
    ) -> Self {
        let registry = Arc::new(PluginRegistry::new());
        registry.initialize(&plugins);
        let entry_options =
            CacheEntryOptions::from_config(cache_config, cache.has_distributed_tier());

        info!(
            "Hydration orchestrator ready with {} plugins (cache ttl {:?}, local ttl {:?})",
            plugins.len(),
            entry_options.expiration,
            entry_options.local_expiration
        );

        Self {
            registry,
            factory: Arc::new(PluginFactory::new(plugins)),
            cache,
            key_prefix: cache_config.key_prefix.clone(),
            entry_options,
            metrics,
        }
    }

    /// Wire the cache tiers, configuration store, HTTP client and built-in plugins.
    pub async fn from_config(config: &PortalConfig) -> Result<Self> {
        let metrics = Arc::new(HydrationMetrics::new());

        let cache =
            HybridCache::from_config(&config.cache, config.etcd.as_ref(), Arc::clone(&metrics))
                .await
                .context("Failed to initialize profile cache")?;

        let store: Arc<dyn PluginConfigurationStore> = Arc::new(
            StaticConfigurationStore::from_entries(&config.plugin_configurations),
        );
        let client = Arc::new(
            ExternalServiceClient::from_config(&config.http, &config.resilience, store)
                .context("Failed to create external service client")?,
        );

        let plugins = builtin_plugins(config, client);
        Ok(Self::new(plugins, cache, &config.cache, metrics))
    }

    pub fn with_entry_options(mut self, entry_options: CacheEntryOptions) -> Self {
        self.entry_options = entry_options;
        self
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn factory(&self) -> &PluginFactory {
        &self.factory
    }

    pub fn cache(&self) -> &HybridCache {
        &self.cache
    }

    pub fn metrics(&self) -> &HydrationMetrics {
        &self.metrics
    }

    pub fn entry_options(&self) -> &CacheEntryOptions {
        &self.entry_options
    }

    pub fn cache_key(&self, request: &ProfileRequest) -> String {
        build_cache_key(
            &self.key_prefix,
            request.profile_id,
            &request.plugin_id,
            &request.provider,
            &request.key,
        )
    }

    /// Cached data for the request, populating through the plugin on a miss.
    pub async fn retrieve_profile(
        &self,
        request: &ProfileRequest,
        cancel: &CancellationToken,
    ) -> Result<ProfileData, HydrationError> {
        request.validate()?;
        let key = self.cache_key(request);
        debug!("Retrieving profile data for cache key {}", key);

        let factory = Arc::clone(&self.factory);
        let metrics = Arc::clone(&self.metrics);
        let metadata = request.to_metadata();

        let result = self
            .cache
            .get_or_create(&key, &self.entry_options, cancel, move |token| async move {
                run_population(&factory, &metrics, &metadata, &token).await
            })
            .await;

        match &result {
            Ok(_) => info!(
                "Retrieved profile data for {} ({}/{}/{})",
                request.profile_id, request.plugin_id, request.provider, request.key
            ),
            Err(HydrationError::Cancelled) => {
                debug!("Retrieval for {} cancelled", key)
            }
            Err(e) => warn!("Retrieval for {} failed: {}", key, e),
        }
        result
    }

    /// Populate through the plugin unconditionally and overwrite the cache entry.
    pub async fn hydrate_profile(
        &self,
        request: &ProfileRequest,
        cancel: &CancellationToken,
    ) -> Result<ProfileData, HydrationError> {
        request.validate()?;
        let key = self.cache_key(request);
        info!("Hydrating profile data for cache key {}", key);
        self.metrics.increment_hydrations();

        let metadata = request.to_metadata();
        let data = run_population(&self.factory, &self.metrics, &metadata, cancel).await?;
        if cancel.is_cancelled() {
            return Err(HydrationError::Cancelled);
        }

        self.cache.set(&key, &data, &self.entry_options).await?;
        info!("Hydrated and cached profile data for {}", key);
        Ok(data)
    }

    pub fn list_plugins(&self) -> Vec<PluginSummary> {
        self.registry
            .get_all_plugins()
            .into_iter()
            .map(|info| PluginSummary {
                plugin_id: info.plugin_id,
                description: info.description,
                supported_features: info.supported_features,
            })
            .collect()
    }

    pub fn list_plugin_features(&self) -> PluginFeaturesListing {
        let plugin_features = self
            .registry
            .get_all_plugins()
            .iter()
            .map(|info| {
                PluginFeatures::from_features(
                    &info.plugin_id,
                    &info.description,
                    &info.supported_features,
                )
            })
            .collect();

        PluginFeaturesListing {
            plugin_features,
            all_supported_providers: self.registry.get_all_supported_providers(),
        }
    }
}

/// Resolve the plugin, check it supports the request, and populate.
async fn run_population(
    factory: &PluginFactory,
    metrics: &HydrationMetrics,
    metadata: &ProfilePopulationMetadata,
    cancel: &CancellationToken,
) -> Result<ProfileData, HydrationError> {
    let plugin = factory
        .get_plugin(&metadata.plugin_id)
        .ok_or_else(|| HydrationError::NotFound(metadata.plugin_id.clone()))?;

    if !plugin.can_handle(metadata) {
        warn!(
            "Plugin {} cannot handle provider {} with key {}",
            plugin.plugin_id(),
            metadata.provider,
            metadata.key
        );
        return Err(HydrationError::InvalidRequest(format!(
            "plugin {} does not support provider {} with key {}",
            plugin.plugin_id(),
            metadata.provider,
            metadata.key
        )));
    }

    metrics.increment_populations();
    match plugin.populate_profile(metadata, cancel).await {
        Ok(data) => Ok(data),
        Err(HydrationError::Cancelled) => Err(HydrationError::Cancelled),
        Err(e) => {
            metrics.increment_population_failures();
            error!(
                "Plugin {} failed to populate profile {}: {}",
                plugin.plugin_id(),
                metadata.profile_id,
                e
            );
            match e {
                HydrationError::NotFound(_)
                | HydrationError::InvalidRequest(_)
                | HydrationError::Cache(_) => Err(HydrationError::population_failed(e)),
                other => Err(other),
            }
        }
    }
}
