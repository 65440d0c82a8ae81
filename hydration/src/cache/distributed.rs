use crate::config::EtcdConfig;
use crate::etcd::EtcdClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared cache tier visible to every process instance.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
}

pub struct EtcdDistributedCache {
    client: EtcdClient,
}

impl EtcdDistributedCache {
    pub fn new(client: EtcdClient) -> Self {
        Self { client }
    }

    /// Connect and verify the cluster answers within the configured timeout.
    pub async fn connect(config: &EtcdConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = tokio::time::timeout(timeout, EtcdClient::new(config))
            .await
            .context("Timed out connecting to etcd")??;
        tokio::time::timeout(timeout, client.ping())
            .await
            .context("Timed out probing etcd")??;
        info!("Distributed cache connected to etcd");
        Ok(Self::new(client))
    }
}

#[async_trait]
impl DistributedCache for EtcdDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.client.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.client.put_with_ttl(key, value, ttl).await
    }
}

/// Process-local stand-in for the shared tier
#[derive(Debug, Default)]
pub struct MemoryDistributedCache {
    entries: RwLock<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
            }
        }
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries
            .write()
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }
}
