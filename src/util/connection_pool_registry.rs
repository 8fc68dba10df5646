use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ScannerConfig;
use crate::error::Result;
use crate::mysql::{Connector, Endpoint};
use crate::util::connection_pool::{ConnectionPool, PoolOptions};

/**
Map from (host, user, password) to the one pool serving that endpoint.

It is created when the extension loads and handed to every table function,
so repeated scans against the same server share their connections. The map
lock only guards lookups. Each endpoint has its own slot, and a pool is
built under that slot's lock: concurrent first access to one endpoint builds
a single pool, while an unreachable server stalls only callers of its own
endpoint.
 */
pub struct ConnectionPoolRegistry {
    connector: Arc<dyn Connector>,
    config: ScannerConfig,
    pools: Mutex<HashMap<Endpoint, Arc<PoolSlot>>>,
}

/// Pool of one endpoint, empty until its first successful build
type PoolSlot = Mutex<Option<Arc<ConnectionPool>>>;

impl std::fmt::Debug for ConnectionPoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPoolRegistry")
            .field("config", &self.config)
            .field("pools", &self.len())
            .finish()
    }
}

impl ConnectionPoolRegistry {
    pub fn new(connector: Arc<dyn Connector>, config: ScannerConfig) -> Self {
        Self {
            connector,
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Pool for the endpoint, created with `min`..=`max` connections if absent.
    pub fn get_or_create(
        &self,
        min: usize,
        max: usize,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<ConnectionPool>> {
        let endpoint = Endpoint::new(host, username, password)?;
        let slot = Arc::clone(self.pools.lock().entry(endpoint.clone()).or_default());

        let mut cell = slot.lock();
        if let Some(pool) = cell.as_ref() {
            return Ok(Arc::clone(pool));
        }

        tracing::debug!(%endpoint, min, max, "creating connection pool");
        let options = PoolOptions::from(&self.config).with_sizes(min, max);
        match ConnectionPool::new(endpoint.clone(), Arc::clone(&self.connector), options) {
            Ok(pool) => {
                *cell = Some(Arc::clone(&pool));
                Ok(pool)
            }
            Err(e) => {
                // leave no empty slot behind; the next caller retries
                let mut pools = self.pools.lock();
                if pools.get(&endpoint).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                    pools.remove(&endpoint);
                }
                Err(e)
            }
        }
    }

    /// Pool for the endpoint with the configured bounds.
    pub fn pool_for(&self, host: &str, username: &str, password: &str) -> Result<Arc<ConnectionPool>> {
        self.get_or_create(
            self.config.min_pool_size,
            self.config.max_pool_size,
            host,
            username,
            password,
        )
    }

    /// Close and forget the pool for the endpoint; false if there was none.
    pub fn close(&self, host: &str, username: &str, password: &str) -> Result<bool> {
        let endpoint = Endpoint::new(host, username, password)?;
        let removed = self.pools.lock().remove(&endpoint);
        let pool = removed.and_then(|slot| {
            let pool = slot.lock().take();
            pool
        });
        Ok(match pool {
            Some(pool) => {
                pool.close();
                true
            }
            None => false,
        })
    }

    pub fn close_all(&self) {
        let drained: Vec<_> = self.pools.lock().drain().map(|(_, slot)| slot).collect();
        for pool in drained.iter().filter_map(|slot| slot.lock().take()) {
            pool.close();
        }
    }

    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConnectionPoolRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}
