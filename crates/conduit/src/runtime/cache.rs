use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::errors::RuntimeResult;

/// Resolved model lists keyed by registration id.
///
/// Concurrent lookups of one key share a single resolution; lookups of different keys
/// never wait on each other. A failed or cancelled resolution leaves the key empty so
/// the next lookup retries. Entries live until invalidated.
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: DashMap<String, Arc<OnceCell<Vec<String>>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_resolve<F, Fut>(&self, key: &str, resolve: F) -> RuntimeResult<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RuntimeResult<Vec<String>>>,
    {
        // Clone the cell out so the map shard is not locked across the await
        let cell = self.entries.entry(key.to_string()).or_default().clone();
        cell.get_or_try_init(|| async move {
            debug!(registration = key, "resolving model list");
            resolve().await
        })
        .await
        .cloned()
    }

    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        self.entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Forget one key, or every key when `key` is `None`
    pub fn invalidate(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.entries.remove(key);
            }
            None => self.entries.clear(),
        }
    }
}
