#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use grants_hydration::cache::{DistributedCache, HybridCache, LocalCache, MemoryDistributedCache};
    use grants_hydration::config::CacheConfig;
    use grants_hydration::error::{ErrorKind, HydrationError};
    use grants_hydration::metrics::HydrationMetrics;
    use grants_hydration::plugin::{
        PluginSupportedFeature, ProfileData, ProfilePlugin, ProfilePopulationMetadata,
    };
    use grants_hydration::plugins::DemoProfilePlugin;
    use grants_hydration::{HydrationOrchestrator, ProfileRequest};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    /// Test plugin that counts populations and numbers its payloads
    struct CountingPlugin {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
        features: Vec<PluginSupportedFeature>,
    }

    impl CountingPlugin {
        fn new(calls: Arc<AtomicUsize>, delay: Duration) -> Self {
            Self {
                calls,
                delay,
                fail: false,
                features: vec![PluginSupportedFeature::new("SOURCE", "RECORDS", "Test records")],
            }
        }

        fn failing(calls: Arc<AtomicUsize>) -> Self {
            Self {
                fail: true,
                ..Self::new(calls, Duration::ZERO)
            }
        }
    }

    #[async_trait]
    impl ProfilePlugin for CountingPlugin {
        fn plugin_id(&self) -> &str {
            "COUNTER"
        }

        fn supported_features(&self) -> &[PluginSupportedFeature] {
            &self.features
        }

        async fn populate_profile(
            &self,
            metadata: &ProfilePopulationMetadata,
            cancel: &CancellationToken,
        ) -> Result<ProfileData, HydrationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::select! {
                _ = cancel.cancelled() => return Err(HydrationError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
            if self.fail {
                return Err(HydrationError::PopulationFailed("upstream exploded".to_string()));
            }
            Ok(ProfileData::for_request(
                metadata,
                json!({ "Call": call }).to_string(),
            ))
        }
    }

    fn orchestrator(
        plugins: Vec<Arc<dyn ProfilePlugin>>,
        distributed: &Arc<MemoryDistributedCache>,
    ) -> HydrationOrchestrator {
        let metrics = Arc::new(HydrationMetrics::new());
        let shared: Arc<dyn DistributedCache> = distributed.clone();
        let cache = HybridCache::new(
            LocalCache::temporary().unwrap(),
            Some(shared),
            Arc::clone(&metrics),
        );
        HydrationOrchestrator::new(plugins, cache, &CacheConfig::default(), metrics)
    }

    fn counter_request(profile_id: Uuid) -> ProfileRequest {
        ProfileRequest::new(profile_id, "COUNTER", "SOURCE", "RECORDS")
    }

    fn call_number(data: &ProfileData) -> u64 {
        let value: Value = serde_json::from_str(&data.json_data).unwrap();
        value["Call"].as_u64().unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_retrievals_share_one_population() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = Arc::new(orchestrator(
            vec![Arc::new(CountingPlugin::new(
                Arc::clone(&calls),
                Duration::from_millis(100),
            ))],
            &distributed,
        ));
        let request = counter_request(Uuid::new_v4());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let orchestrator = Arc::clone(&orchestrator);
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .retrieve_profile(&request, &CancellationToken::new())
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &results[0]));
        assert_eq!(orchestrator.metrics().get_populations(), 1);
        assert_eq!(distributed.len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_retrieval_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(CountingPlugin::new(Arc::clone(&calls), Duration::ZERO))],
            &distributed,
        );
        let request = counter_request(Uuid::new_v4());
        let cancel = CancellationToken::new();

        let first = orchestrator.retrieve_profile(&request, &cancel).await.unwrap();
        let second = orchestrator.retrieve_profile(&request, &cancel).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.metrics().get_local_hits(), 1);
    }

    #[tokio::test]
    async fn test_failed_population_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(CountingPlugin::failing(Arc::clone(&calls)))],
            &distributed,
        );
        let request = counter_request(Uuid::new_v4());
        let cancel = CancellationToken::new();

        let err = orchestrator.retrieve_profile(&request, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PopulationFailed);
        assert!(err.is_population_failure());

        let _ = orchestrator.retrieve_profile(&request, &cancel).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.metrics().get_population_failures(), 2);
        assert!(distributed.is_empty());
        assert!(orchestrator.cache().local().is_empty());
    }

    #[tokio::test]
    async fn test_failure_in_one_plugin_does_not_affect_another() {
        let failing_calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![
                Arc::new(CountingPlugin::failing(Arc::clone(&failing_calls))),
                Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO)),
            ],
            &distributed,
        );
        let profile_id = Uuid::new_v4();
        let cancel = CancellationToken::new();

        assert!(orchestrator
            .retrieve_profile(&counter_request(profile_id), &cancel)
            .await
            .is_err());
        let demo = orchestrator
            .retrieve_profile(
                &ProfileRequest::new(profile_id, "DEMO", "PROGRAM1", "ORGINFO"),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(demo.plugin_id, "DEMO");
        assert_eq!(distributed.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_not_found() {
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO))],
            &distributed,
        );

        let err = orchestrator
            .retrieve_profile(
                &ProfileRequest::new(Uuid::new_v4(), "UNKNOWN", "PROGRAM1", "SUBMISSIONS"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err, HydrationError::NotFound("UNKNOWN".to_string()));
        assert_eq!(orchestrator.metrics().get_populations(), 0);
        assert!(distributed.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_provider_key_is_invalid() {
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO))],
            &distributed,
        );

        let err = orchestrator
            .retrieve_profile(
                &ProfileRequest::new(Uuid::new_v4(), "DEMO", "UNKNOWN", "UNKNOWN"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(orchestrator.metrics().get_populations(), 0);
    }

    #[tokio::test]
    async fn test_nil_profile_id_is_rejected() {
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO))],
            &distributed,
        );

        let err = orchestrator
            .hydrate_profile(
                &ProfileRequest::new(Uuid::nil(), "DEMO", "PROGRAM1", "SUBMISSIONS"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_demo_submissions_are_cached_under_request_key() {
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO))],
            &distributed,
        );
        let profile_id = Uuid::new_v4();
        let request = ProfileRequest::new(profile_id, "DEMO", "PROGRAM1", "SUBMISSIONS");

        let data = orchestrator
            .retrieve_profile(&request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(data.profile_id, profile_id);
        assert_eq!(data.provider, "PROGRAM1");
        let payload: Value = serde_json::from_str(&data.json_data).unwrap();
        let submissions = payload["Data"]["Submissions"].as_array().unwrap();
        assert_eq!(
            payload["Data"]["Summary"]["TotalSubmissions"].as_u64(),
            Some(submissions.len() as u64)
        );

        let key = orchestrator.cache_key(&request);
        assert_eq!(key, format!("profile:{}:DEMO:PROGRAM1:SUBMISSIONS", profile_id));
        let stored = distributed.get(&key).await.unwrap().unwrap();
        let stored: ProfileData = serde_json::from_slice(&stored).unwrap();
        assert_eq!(stored, data);
    }

    #[tokio::test]
    async fn test_hydrate_overwrites_cached_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(CountingPlugin::new(Arc::clone(&calls), Duration::ZERO))],
            &distributed,
        );
        let request = counter_request(Uuid::new_v4());
        let cancel = CancellationToken::new();

        let retrieved = orchestrator.retrieve_profile(&request, &cancel).await.unwrap();
        assert_eq!(call_number(&retrieved), 1);

        let hydrated = orchestrator.hydrate_profile(&request, &cancel).await.unwrap();
        assert_eq!(call_number(&hydrated), 2);

        let after = orchestrator.retrieve_profile(&request, &cancel).await.unwrap();
        assert_eq!(after, hydrated);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(orchestrator.metrics().get_hydrations(), 1);
    }

    #[tokio::test]
    async fn test_instances_share_distributed_tier() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let first = orchestrator(
            vec![Arc::new(CountingPlugin::new(Arc::clone(&calls), Duration::ZERO))],
            &distributed,
        );
        let second = orchestrator(
            vec![Arc::new(CountingPlugin::new(Arc::clone(&calls), Duration::ZERO))],
            &distributed,
        );
        let request = counter_request(Uuid::new_v4());
        let cancel = CancellationToken::new();

        let from_first = first.retrieve_profile(&request, &cancel).await.unwrap();
        let from_second = second.retrieve_profile(&request, &cancel).await.unwrap();

        assert_eq!(from_first, from_second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.metrics().get_distributed_hits(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_retrieval_returns_cancelled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![Arc::new(CountingPlugin::new(
                Arc::clone(&calls),
                Duration::from_secs(5),
            ))],
            &distributed,
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = orchestrator
            .retrieve_profile(&counter_request(Uuid::new_v4()), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, HydrationError::Cancelled);
        assert!(distributed.is_empty());
        assert_eq!(orchestrator.metrics().get_population_failures(), 0);
    }

    #[tokio::test]
    async fn test_listings_cover_registered_plugins() {
        let distributed = Arc::new(MemoryDistributedCache::new());
        let orchestrator = orchestrator(
            vec![
                Arc::new(DemoProfilePlugin::with_delay(Duration::ZERO)),
                Arc::new(CountingPlugin::new(Arc::new(AtomicUsize::new(0)), Duration::ZERO)),
            ],
            &distributed,
        );

        let plugins = orchestrator.list_plugins();
        let ids: Vec<&str> = plugins.iter().map(|p| p.plugin_id.as_str()).collect();
        assert_eq!(ids, vec!["COUNTER", "DEMO"]);
        assert_eq!(plugins[1].description, "Demo");
        assert_eq!(plugins[1].supported_features.len(), 6);

        let listing = orchestrator.list_plugin_features();
        assert_eq!(
            listing.all_supported_providers,
            vec!["PROGRAM1".to_string(), "PROGRAM2".to_string(), "SOURCE".to_string()]
        );
        let demo = listing
            .plugin_features
            .iter()
            .find(|f| f.plugin_id == "DEMO")
            .unwrap();
        assert_eq!(demo.provider_features["PROGRAM1"].len(), 4);
        assert_eq!(demo.provider_features["PROGRAM2"].len(), 2);
    }
}
