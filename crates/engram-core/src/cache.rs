//! In-process cache implementations.
//!
//! [`InMemoryCache`] backs tests and cache-disabled deployments; the
//! Redis implementation lives in the API crate where the connection is
//! configured.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::traits::KeyValueCache;

/// TTL-aware in-memory cache.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Some(value.clone()),
            _ => None,
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }
}

/// Cache that stores nothing. Every get is a miss, every set succeeds
/// vacuously.
#[derive(Default)]
pub struct NoopCache;

#[async_trait]
impl KeyValueCache for NoopCache {
    async fn get_raw(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set_raw(&self, _key: &str, _value: &str, _ttl: Duration) -> bool {
        false
    }

    async fn delete(&self, _key: &str) -> bool {
        false
    }
}
