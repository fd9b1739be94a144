//! Redis-backed key-value cache.
//!
//! Backs the search-result and classification caches. Strictly
//! best-effort: connection or command failures are logged and read as
//! misses; they never fail a request.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to disable caching (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use engram_core::KeyValueCache;

/// Redis implementation of [`KeyValueCache`].
pub struct RedisCache {
    /// Connection manager (None if disabled or unreachable).
    connection: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Create from environment configuration.
    pub async fn from_env() -> Self {
        let enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let connection = if enabled {
            match redis::Client::open(redis_url.as_str()) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => {
                        info!("Redis cache enabled");
                        Some(conn)
                    }
                    Err(e) => {
                        warn!("Failed to connect to Redis, cache disabled: {}", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Invalid Redis URL, cache disabled: {}", e);
                    None
                }
            }
        } else {
            info!("Redis cache disabled via REDIS_ENABLED=false");
            None
        };

        Self {
            connection: RwLock::new(connection),
        }
    }

    /// Create a disabled cache (for testing or when Redis is unavailable).
    pub fn disabled() -> Self {
        Self {
            connection: RwLock::new(None),
        }
    }

    /// Check whether a live connection is held.
    pub async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        let mut guard = self.connection.write().await;
        let conn = guard.as_mut()?;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(value)) => {
                debug!("Cache HIT: {}", key);
                Some(value)
            }
            Ok(None) => {
                debug!("Cache MISS: {}", key);
                None
            }
            Err(e) => {
                error!("Redis GET error: {}", e);
                None
            }
        }
    }

    async fn set_raw(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut guard = self.connection.write().await;
        let Some(conn) = guard.as_mut() else {
            return false;
        };

        match conn
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
        {
            Ok(_) => {
                debug!("Cache SET: {} (TTL: {}s)", key, ttl.as_secs());
                true
            }
            Err(e) => {
                error!("Redis SET error: {}", e);
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let mut guard = self.connection.write().await;
        let Some(conn) = guard.as_mut() else {
            return false;
        };

        match conn.del::<_, ()>(key).await {
            Ok(_) => {
                debug!("Cache DEL: {}", key);
                true
            }
            Err(e) => {
                error!("Redis DEL error: {}", e);
                false
            }
        }
    }
}
