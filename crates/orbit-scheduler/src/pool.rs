//! Connection pool — cached clients keyed by controller name.
//!
//! Lookups share a read lock. A miss connects outside the lock and then
//! inserts under the write lock, so concurrent misses may both connect but
//! only the first client is kept. A registration whose endpoint changed
//! replaces the cached client.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use orbit_state::Controller;

use crate::rpc::{Connector, ControllerClient, RpcResult, SyncClient};

struct Cached<C: ?Sized> {
    endpoint: String,
    client: Arc<C>,
}

type CacheMap<C> = Arc<RwLock<HashMap<String, Cached<C>>>>;

#[derive(Clone)]
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    controllers: CacheMap<dyn ControllerClient>,
    syncs: CacheMap<dyn SyncClient>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            controllers: Arc::new(RwLock::new(HashMap::new())),
            syncs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Client for a placement or action controller.
    pub async fn controller(&self, controller: &Controller) -> RpcResult<Arc<dyn ControllerClient>> {
        let endpoint = controller.endpoint();
        if let Some(client) = lookup(&self.controllers, controller.name(), &endpoint).await {
            return Ok(client);
        }
        let client = self.connector.connect_controller(controller).await?;
        Ok(store(&self.controllers, controller.name(), endpoint, client).await)
    }

    /// Client for the synchronization service.
    pub async fn sync(&self, controller: &Controller) -> RpcResult<Arc<dyn SyncClient>> {
        let endpoint = controller.endpoint();
        if let Some(client) = lookup(&self.syncs, controller.name(), &endpoint).await {
            return Ok(client);
        }
        let client = self.connector.connect_sync(controller).await?;
        Ok(store(&self.syncs, controller.name(), endpoint, client).await)
    }

    /// Drop cached clients for a controller. Returns true if any existed.
    pub async fn remove(&self, name: &str) -> bool {
        let removed_controller = self.controllers.write().await.remove(name).is_some();
        let removed_sync = self.syncs.write().await.remove(name).is_some();
        debug!(controller = %name, removed = removed_controller || removed_sync, "connection removed");
        removed_controller || removed_sync
    }

    /// Number of cached clients.
    pub async fn len(&self) -> usize {
        self.controllers.read().await.len() + self.syncs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn lookup<C: ?Sized>(cache: &CacheMap<C>, name: &str, endpoint: &str) -> Option<Arc<C>> {
    let cache = cache.read().await;
    cache
        .get(name)
        .filter(|cached| cached.endpoint == endpoint)
        .map(|cached| cached.client.clone())
}

async fn store<C: ?Sized>(cache: &CacheMap<C>, name: &str, endpoint: String, client: Arc<C>) -> Arc<C> {
    let mut cache = cache.write().await;
    match cache.get(name) {
        Some(cached) if cached.endpoint == endpoint => cached.client.clone(),
        _ => {
            debug!(controller = %name, %endpoint, "connection cached");
            cache.insert(
                name.to_string(),
                Cached {
                    endpoint,
                    client: client.clone(),
                },
            );
            client
        }
    }
}
