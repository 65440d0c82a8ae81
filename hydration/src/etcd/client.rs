use crate::config::EtcdConfig;
use anyhow::{Context, Result};
use etcd_client::{Client, ConnectOptions, PutOptions};
use std::time::Duration;
use tracing::{debug, info};

pub struct EtcdClient {
    client: Client,
    prefix: String,
}

impl EtcdClient {
    pub async fn new(config: &EtcdConfig) -> Result<Self> {
        info!("Connecting to etcd at endpoints: {:?}", config.endpoints);

        let timeout = Duration::from_secs(config.timeout_secs);
        let mut connect_options = ConnectOptions::new()
            .with_connect_timeout(timeout)
            .with_timeout(timeout);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            debug!("Authenticating to etcd as {}", username);
            connect_options = connect_options.with_user(username.clone(), password.clone());
        }

        let client = Client::connect(&config.endpoints, Some(connect_options))
            .await
            .context("Failed to connect to etcd")?;

        Ok(Self {
            client,
            prefix: config.prefix.clone(),
        })
    }

    /// Round trip to the cluster; connecting alone does not prove an endpoint is reachable.
    pub async fn ping(&self) -> Result<()> {
        let mut client = self.client.maintenance_client();
        client
            .status()
            .await
            .context("etcd status request failed")?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        debug!("Getting key: {}", full_key);

        let mut client = self.client.kv_client();
        let resp = client
            .get(full_key.as_str(), None)
            .await
            .with_context(|| format!("Failed to get {}", full_key))?;

        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    /// Put `value` under a lease so etcd drops the key once `ttl` elapses.
    pub async fn put_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let full_key = self.full_key(key);
        let ttl_secs = ttl_to_lease_secs(ttl);
        debug!("Putting key: {} (ttl {}s)", full_key, ttl_secs);

        let mut lease_client = self.client.lease_client();
        let lease = lease_client
            .grant(ttl_secs, None)
            .await
            .with_context(|| format!("Failed to grant lease for {}", full_key))?;

        let mut client = self.client.kv_client();
        client
            .put(
                full_key.as_str(),
                value,
                Some(PutOptions::new().with_lease(lease.id())),
            )
            .await
            .with_context(|| format!("Failed to put {}", full_key))?;
        Ok(())
    }

    pub fn full_key(&self, key: &str) -> String {
        prefixed_key(&self.prefix, key)
    }
}

/// Every key is namespaced, even one whose text already starts with the prefix.
pub fn prefixed_key(prefix: &str, key: &str) -> String {
    format!("{}{}", prefix, key)
}

/// Lease TTLs are whole seconds; round up and never go below one.
pub fn ttl_to_lease_secs(ttl: Duration) -> i64 {
    let mut secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs += 1;
    }
    i64::try_from(secs.max(1)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_ttl_rounds_up() {
        assert_eq!(ttl_to_lease_secs(Duration::from_secs(1800)), 1800);
        assert_eq!(ttl_to_lease_secs(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_to_lease_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_to_lease_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_prefix_is_always_applied() {
        assert_eq!(prefixed_key("/grants/", "profile:1"), "/grants/profile:1");
        assert_eq!(prefixed_key("/grants/", "/grants/a"), "/grants//grants/a");
        assert_ne!(prefixed_key("/g/", "x"), prefixed_key("/g/", "/g/x"));
    }
}
