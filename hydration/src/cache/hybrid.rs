use crate::cache::distributed::{DistributedCache, EtcdDistributedCache};
use crate::cache::local::LocalCache;
use crate::config::{CacheConfig, EtcdConfig};
use crate::error::HydrationError;
use crate::metrics::HydrationMetrics;
use anyhow::Result;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Expirations applied when an entry is written to both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntryOptions {
    /// Distributed tier
    pub expiration: Duration,
    pub local_expiration: Duration,
}

impl CacheEntryOptions {
    pub fn new(expiration: Duration, local_expiration: Duration) -> Self {
        Self {
            expiration,
            local_expiration: local_expiration.min(expiration),
        }
    }

    pub fn from_config(config: &CacheConfig, distributed_available: bool) -> Self {
        Self::new(
            config.expiration(),
            config.local_expiration(distributed_available),
        )
    }
}

type FlightResult = Result<Arc<Vec<u8>>, HydrationError>;
type Flight = Shared<BoxFuture<'static, FlightResult>>;

struct Tiers {
    local: LocalCache,
    distributed: Option<Arc<dyn DistributedCache>>,
    /// Keyed flights tagged with a generation so a finished flight never evicts its successor
    in_flight: Mutex<HashMap<String, (u64, Flight)>>,
    next_flight: AtomicU64,
    metrics: Arc<HydrationMetrics>,
}

/// Clears a flight's map entry however its task ends, including by panic.
struct FlightRegistration {
    tiers: Arc<Tiers>,
    key: String,
    generation: u64,
}

impl Drop for FlightRegistration {
    fn drop(&mut self) {
        let mut in_flight = self.tiers.in_flight.lock();
        if matches!(in_flight.get(&self.key), Some((generation, _)) if *generation == self.generation) {
            in_flight.remove(&self.key);
        }
    }
}

/// Two-tier cache with single-flight population.
///
/// Values are stored as JSON. Concurrent `get_or_create` calls for one key share
/// a single population; only successful results reach either tier.
#[derive(Clone)]
pub struct HybridCache {
    tiers: Arc<Tiers>,
}

impl HybridCache {
    pub fn new(
        local: LocalCache,
        distributed: Option<Arc<dyn DistributedCache>>,
        metrics: Arc<HydrationMetrics>,
    ) -> Self {
        Self {
            tiers: Arc::new(Tiers {
                local,
                distributed,
                in_flight: Mutex::new(HashMap::new()),
                next_flight: AtomicU64::new(0),
                metrics,
            }),
        }
    }

    /// Build the tiers from configuration. An unreachable etcd degrades to
    /// local-only caching instead of failing.
    pub async fn from_config(
        config: &CacheConfig,
        etcd: Option<&EtcdConfig>,
        metrics: Arc<HydrationMetrics>,
    ) -> Result<Self> {
        let local = LocalCache::new(&config.local)?;

        let distributed: Option<Arc<dyn DistributedCache>> = match etcd {
            None => {
                warn!("No distributed cache configured, using local-only caching");
                None
            }
            Some(etcd_config) => match EtcdDistributedCache::connect(etcd_config).await {
                Ok(cache) => {
                    info!("Using two-tier caching (local + etcd)");
                    Some(Arc::new(cache))
                }
                Err(e) => {
                    warn!(
                        "Distributed cache unavailable, degrading to local-only caching: {:#}",
                        e
                    );
                    None
                }
            },
        };

        Ok(Self::new(local, distributed, metrics))
    }

    pub fn has_distributed_tier(&self) -> bool {
        self.tiers.distributed.is_some()
    }

    pub fn local(&self) -> &LocalCache {
        &self.tiers.local
    }

    /// Number of keys with a population currently running
    pub fn in_flight_count(&self) -> usize {
        self.tiers.in_flight.lock().len()
    }

    /// Read without populating: local tier first, then the distributed tier.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, HydrationError> {
        if let Some(bytes) = self.tiers.read_local(key) {
            return decode(key, &bytes).map(Some);
        }
        match self.tiers.read_distributed(key).await {
            Some(bytes) => decode(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Unconditional write to both tiers.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        options: &CacheEntryOptions,
    ) -> Result<(), HydrationError> {
        let bytes = serde_json::to_vec(value).map_err(|e| HydrationError::Cache(e.to_string()))?;
        self.tiers.store(key, &bytes, options).await;
        Ok(())
    }

    /// Return the cached value for `key`, running `populate` on a miss.
    ///
    /// At most one population per key runs at a time in this process; every
    /// caller joined on it receives the same outcome. Failures are not cached.
    /// If the caller that started a population is cancelled, the others start
    /// a fresh one rather than inheriting the cancellation.
    pub async fn get_or_create<T, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
        populate: F,
    ) -> Result<T, HydrationError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<T, HydrationError>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(HydrationError::Cancelled);
        }

        if let Some(bytes) = self.tiers.read_local(key) {
            return decode(key, &bytes);
        }

        loop {
            let (flight, started) = self.join_or_start(key, options, cancel, populate.clone());

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(HydrationError::Cancelled),
                outcome = flight => outcome,
            };

            match outcome {
                Ok(bytes) => return decode(key, &bytes),
                Err(HydrationError::Cancelled) if !started && !cancel.is_cancelled() => {
                    debug!(
                        "Population for {} was cancelled by its initiator, starting a new one",
                        key
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn join_or_start<T, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
        populate: F,
    ) -> (Flight, bool)
    where
        T: Serialize + Send + 'static,
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, HydrationError>> + Send + 'static,
    {
        let mut in_flight = self.tiers.in_flight.lock();
        if let Some((_, flight)) = in_flight.get(key) {
            debug!("Joining in-flight population for {}", key);
            self.tiers.metrics.increment_flights_joined();
            return (flight.clone(), false);
        }

        let generation = self.tiers.next_flight.fetch_add(1, Ordering::Relaxed);
        let registration = FlightRegistration {
            tiers: Arc::clone(&self.tiers),
            key: key.to_string(),
            generation,
        };
        let options = *options;
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let registration = registration;
            let result = registration
                .tiers
                .load_or_populate(&registration.key, &options, &token, populate)
                .await;
            result
        });

        let flight = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(HydrationError::population_failed(format!(
                    "population task aborted: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), (generation, flight.clone()));
        (flight, true)
    }
}

impl Tiers {
    fn read_local(&self, key: &str) -> Option<Vec<u8>> {
        match self.local.get(key) {
            Ok(Some(bytes)) => {
                debug!("Local cache hit for {}", key);
                self.metrics.increment_local_hits();
                Some(bytes)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Local cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    async fn read_distributed(&self, key: &str) -> Option<Vec<u8>> {
        let distributed = self.distributed.as_ref()?;
        match distributed.get(key).await {
            Ok(Some(bytes)) => {
                debug!("Distributed cache hit for {}", key);
                self.metrics.increment_distributed_hits();
                Some(bytes)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Distributed cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    async fn load_or_populate<T, F, Fut>(
        &self,
        key: &str,
        options: &CacheEntryOptions,
        cancel: &CancellationToken,
        populate: F,
    ) -> FlightResult
    where
        T: Serialize,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, HydrationError>>,
    {
        if let Some(bytes) = self.read_distributed(key).await {
            self.write_local(key, &bytes, options.local_expiration);
            return Ok(Arc::new(bytes));
        }

        debug!("Cache miss for {}, populating", key);
        self.metrics.increment_cache_misses();

        let value = tokio::select! {
            _ = cancel.cancelled() => return Err(HydrationError::Cancelled),
            result = populate(cancel.clone()) => result?,
        };
        if cancel.is_cancelled() {
            return Err(HydrationError::Cancelled);
        }

        let bytes = serde_json::to_vec(&value).map_err(|e| HydrationError::Cache(e.to_string()))?;
        self.store(key, &bytes, options).await;
        Ok(Arc::new(bytes))
    }

    async fn store(&self, key: &str, bytes: &[u8], options: &CacheEntryOptions) {
        if let Some(distributed) = &self.distributed {
            if let Err(e) = distributed.set(key, bytes, options.expiration).await {
                warn!("Distributed cache write failed for {}: {:#}", key, e);
            }
        }
        self.write_local(key, bytes, options.local_expiration);
    }

    fn write_local(&self, key: &str, bytes: &[u8], ttl: Duration) {
        if let Err(e) = self.local.put(key, bytes, ttl) {
            warn!("Local cache write failed for {}: {:#}", key, e);
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, HydrationError> {
    serde_json::from_slice(bytes)
        .map_err(|e| HydrationError::Cache(format!("failed to decode cached value {}: {}", key, e)))
}
