//! Redis Connection Management
//!
//! Provides a managed connection with automatic reconnection, bounded
//! per-operation timeouts and retry. Callers on the request path treat every
//! error as non-fatal.

use redis::aio::ConnectionManager;
use redis::{Client, RedisError, Script};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// INCR and set the window expiry in one round trip. The expiry is only set
/// on the first increment so the window is anchored at its first request.
const INCR_WITH_EXPIRY_LUA: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum attempts for operations
    pub max_retries: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            timeout_ms: 250,
            max_retries: 2,
            retry_delay_ms: 20,
        }
    }
}

/// Redis client wrapper with connection management
pub struct RedisClient {
    config: RedisConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
    incr_script: Script,
}

impl RedisClient {
    /// Create a new Redis client
    pub async fn new(config: RedisConfig) -> Result<Self, RedisError> {
        let client = Client::open(config.url.as_str())?;

        let redis_client = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
            incr_script: Script::new(INCR_WITH_EXPIRY_LUA),
        };

        // Try to establish initial connection
        redis_client.ensure_connected().await?;

        Ok(redis_client)
    }

    /// Create from URL string
    pub async fn from_url(url: &str) -> Result<Self, RedisError> {
        Self::new(RedisConfig {
            url: url.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Ensure connection is established
    async fn ensure_connected(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!("Establishing Redis connection to {}", self.config.url);
            let manager = ConnectionManager::new(self.client.clone()).await?;
            *conn = Some(manager);
            tracing::info!("Redis connection established");
        }
        Ok(())
    }

    /// Get connection manager, reconnecting if necessary
    pub async fn get_connection(&self) -> Result<ConnectionManager, RedisError> {
        {
            let conn = self.connection.read().await;
            if let Some(manager) = conn.as_ref() {
                return Ok(manager.clone());
            }
        }
        self.ensure_connected().await?;
        let conn = self.connection.read().await;
        conn.clone().ok_or_else(|| {
            RedisError::from((redis::ErrorKind::IoError, "Connection not available"))
        })
    }

    /// Execute operation with retry logic and a per-attempt timeout
    pub async fn with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T, RedisError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let attempts = self.config.max_retries.max(1);
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut last_error = None;

        for attempt in 0..attempts {
            let result = match self.get_connection().await {
                Ok(conn) => match tokio::time::timeout(timeout, operation(conn)).await {
                    Ok(result) => result,
                    Err(_) => Err(RedisError::from((
                        redis::ErrorKind::IoError,
                        "Redis operation timed out",
                    ))),
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(
                        "Redis operation failed (attempt {}/{}): {}",
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = Some(e);

                    // Clear connection on error to force reconnect
                    if attempt + 1 < attempts {
                        let mut conn = self.connection.write().await;
                        *conn = None;
                        drop(conn);
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (attempt as u64 + 1),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RedisError::from((redis::ErrorKind::IoError, "Max retries exceeded"))
        }))
    }

    /// Atomic INCR + EXPIRE (expiry applied when the key is created)
    pub async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> Result<i64, RedisError> {
        self.with_retry(|mut conn| {
            let key = key.to_string();
            let script = self.incr_script.clone();
            async move {
                script
                    .key(&key)
                    .arg(ttl_secs as i64)
                    .invoke_async(&mut conn)
                    .await
            }
        })
        .await
    }
}
