use crate::config::LocalCacheConfig;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    value: Vec<u8>,
    /// Unix epoch milliseconds
    expires_at: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// In-process cache tier on sled with per-entry expiration.
pub struct LocalCache {
    db: Arc<Db>,
    sweep_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LocalCache {
    pub fn new(config: &LocalCacheConfig) -> Result<Self> {
        let db = match &config.path {
            Some(path) => {
                info!("Initializing local cache at path: {}", path);
                if let Some(parent) = Path::new(path).parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create cache directory: {:?}", parent)
                    })?;
                }
                sled::open(path)
                    .with_context(|| format!("Failed to open sled database at {}", path))?
            }
            None => {
                info!("Initializing temporary local cache");
                sled::Config::new()
                    .temporary(true)
                    .open()
                    .context("Failed to open temporary sled database")?
            }
        };

        let cache = Self {
            db: Arc::new(db),
            sweep_handle: Mutex::new(None),
        };
        cache.start_sweeper(
            Duration::from_secs(config.sweep_interval_secs.max(1)),
            config.max_size_mb * 1024 * 1024,
        );
        Ok(cache)
    }

    /// Open a throwaway store without a background sweeper.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("Failed to open temporary sled database")?;
        Ok(Self {
            db: Arc::new(db),
            sweep_handle: Mutex::new(None),
        })
    }

    fn start_sweeper(&self, every: Duration, max_size_bytes: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, local cache sweeper not started");
            return;
        };

        let db = Arc::clone(&self.db);
        let task = handle.spawn(async move {
            let mut interval_timer = interval(every);
            loop {
                interval_timer.tick().await;

                if let Err(e) = sweep_expired(&db) {
                    warn!("Error during cache sweep: {}", e);
                }
                if let Err(e) = enforce_size_limit(&db, max_size_bytes) {
                    warn!("Error enforcing cache size limit: {}", e);
                }
            }
        });
        *self.sweep_handle.lock() = Some(task);
    }

    /// Returns the live value for `key`; an expired entry is removed and reported as absent.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self
            .db
            .get(key)
            .with_context(|| format!("Cache get failed for {}", key))?
        else {
            return Ok(None);
        };

        match bincode::deserialize::<CacheEntry>(&raw) {
            Ok(entry) if !entry.is_expired(now_millis()) => Ok(Some(entry.value)),
            Ok(_) => {
                debug!("Local cache entry expired: {}", key);
                self.db.remove(key)?;
                Ok(None)
            }
            Err(e) => {
                warn!("Dropping unreadable local cache entry {}: {}", key, e);
                self.db.remove(key)?;
                Ok(None)
            }
        }
    }

    pub fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        debug!("Cache put: {} ({} bytes, ttl {:?})", key, value.len(), ttl);

        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            value: value.to_vec(),
            expires_at: now_millis().saturating_add(ttl_ms),
        };
        let serialized = bincode::serialize(&entry).context("Failed to serialize cache entry")?;

        self.db
            .insert(key, serialized)
            .with_context(|| format!("Failed to insert key into cache: {}", key))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    pub fn sweep_expired(&self) -> Result<usize> {
        sweep_expired(&self.db)
    }

    pub fn enforce_size_limit(&self, max_size_bytes: u64) -> Result<usize> {
        enforce_size_limit(&self.db, max_size_bytes)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        if let Some(task) = self.sweep_handle.lock().take() {
            task.abort();
        }
        if let Err(e) = self.flush() {
            warn!("Error flushing cache on drop: {}", e);
        }
    }
}

fn sweep_expired(db: &Db) -> Result<usize> {
    let now = now_millis();
    let mut expired = Vec::new();

    for item in db.iter() {
        let (key, value) = item?;
        match bincode::deserialize::<CacheEntry>(&value) {
            Ok(entry) if !entry.is_expired(now) => {}
            _ => expired.push(key),
        }
    }

    let count = expired.len();
    for key in expired {
        db.remove(key)?;
    }
    if count > 0 {
        debug!("Cleaned {} expired cache entries", count);
    }
    Ok(count)
}

/// Evict entries closest to expiry until the store fits in `max_size_bytes`.
fn enforce_size_limit(db: &Db, max_size_bytes: u64) -> Result<usize> {
    let mut total_size = 0u64;
    let mut entries: Vec<(sled::IVec, u64, i64)> = Vec::new();

    for item in db.iter() {
        let (key, value) = item?;
        let entry_size = (key.len() + value.len()) as u64;
        total_size += entry_size;
        let expires_at = bincode::deserialize::<CacheEntry>(&value)
            .map(|e| e.expires_at)
            .unwrap_or(0);
        entries.push((key, entry_size, expires_at));
    }

    if total_size <= max_size_bytes {
        return Ok(0);
    }

    entries.sort_by_key(|(_, _, expires_at)| *expires_at);
    let mut evicted = 0;
    for (key, size, _) in entries {
        if total_size <= max_size_bytes {
            break;
        }
        db.remove(&key)?;
        total_size -= size;
        evicted += 1;
    }

    if evicted > 0 {
        info!("Evicted {} cache entries to enforce size limit", evicted);
    }
    Ok(evicted)
}
