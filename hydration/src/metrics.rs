use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the hydration pipeline
#[derive(Debug, Default)]
pub struct HydrationMetrics {
    /// Reads answered by the in-process tier
    pub local_hits: Arc<AtomicU64>,
    /// Reads answered by the distributed tier
    pub distributed_hits: Arc<AtomicU64>,
    /// Reads that missed both tiers
    pub cache_misses: Arc<AtomicU64>,
    /// Callers that joined a population already in flight
    pub flights_joined: Arc<AtomicU64>,
    /// Plugin populate invocations
    pub populations: Arc<AtomicU64>,
    pub population_failures: Arc<AtomicU64>,
    /// Explicit hydrate requests
    pub hydrations: Arc<AtomicU64>,
}

impl HydrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_local_hits(&self) {
        self.local_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_distributed_hits(&self) {
        self.distributed_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flights_joined(&self) {
        self.flights_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_populations(&self) {
        self.populations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_population_failures(&self) {
        self.population_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_hydrations(&self) {
        self.hydrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_local_hits(&self) -> u64 {
        self.local_hits.load(Ordering::Relaxed)
    }

    pub fn get_distributed_hits(&self) -> u64 {
        self.distributed_hits.load(Ordering::Relaxed)
    }

    pub fn get_cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn get_flights_joined(&self) -> u64 {
        self.flights_joined.load(Ordering::Relaxed)
    }

    pub fn get_populations(&self) -> u64 {
        self.populations.load(Ordering::Relaxed)
    }

    pub fn get_population_failures(&self) -> u64 {
        self.population_failures.load(Ordering::Relaxed)
    }

    pub fn get_hydrations(&self) -> u64 {
        self.hydrations.load(Ordering::Relaxed)
    }
}
