use redis::AsyncCommands;
use redis::Client;
use std::fmt::Display;
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::error::AppResult;
use crate::models::ItemKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Hydrated content-similarity response. The index version and build
    /// time are part of the key, so publishing a new index orphans every
    /// older entry, even when a version number is reused.
    SimilarItems {
        index_version: u64,
        built_at_ms: i64,
        item: ItemKey,
        limit: usize,
    },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::SimilarItems {
                index_version,
                built_at_ms,
                item,
                limit,
            } => write!(
                f,
                "similar:v{}.{}:{}:{}",
                index_version, built_at_ms, item, limit
            ),
        }
    }
}

/// Opens a Redis client for the response cache
///
/// The client only parses the URL here; connections are multiplexed and
/// opened lazily, so an unreachable Redis surfaces on first use as a cache
/// miss rather than at startup.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// One queued write: the rendered key, the JSON payload and its TTL in seconds
struct CacheWriteMessage {
    key: String,
    value: String,
    ttl: u64,
}

/// Redis-backed cache for serialized responses
///
/// Reads go straight to Redis. Writes are handed to a background task over
/// an unbounded channel, so a request never waits on `SETEX`. Cloning is
/// cheap; every clone feeds the same writer.
#[derive(Clone)]
pub struct Cache {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<CacheWriteMessage>,
}

/// Handle for stopping the cache writer gracefully
///
/// Owned by `main`. Dropping it without calling [`shutdown`] leaves the
/// writer running until the runtime stops.
///
/// [`shutdown`]: CacheWriterHandle::shutdown
pub struct CacheWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl CacheWriterHandle {
    /// Asks the writer task to stop
    ///
    /// The writer closes its queue and drains every write already queued
    /// before exiting, so responses computed just before shutdown still
    /// land in Redis.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        tracing::info!("Cache writer shutdown signal sent");
    }
}

impl Cache {
    /// Creates the cache and spawns its writer task
    ///
    /// Must be called inside a Tokio runtime. The returned handle is the only
    /// way to flush and stop the writer.
    pub fn new(redis_client: Client) -> (Self, CacheWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        // Writer owns its own client clone
        let client = redis_client.clone();
        tokio::spawn(async move {
            Self::cache_writer_task(client, write_rx, shutdown_rx).await;
        });

        let cache = Self {
            redis_client,
            write_tx,
        };

        (cache, CacheWriterHandle { shutdown_tx })
    }

    /// Applies queued writes one at a time until shutdown
    ///
    /// A failed write is logged and dropped; the entry is simply recomputed
    /// on the next miss. On shutdown the queue is closed first so nothing
    /// new arrives while the backlog drains.
    async fn cache_writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<CacheWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!("Cache writer task started");

        loop {
            tokio::select! {
                // Regular write
                Some(msg) = write_rx.recv() => {
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to write to Redis cache");
                    }
                }
                // Shutdown requested: stop accepting, then drain
                _ = shutdown_rx.recv() => {
                    write_rx.close();
                    tracing::info!("Cache writer shutting down, flushing remaining writes");

                    while let Some(msg) = write_rx.recv().await {
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache write during shutdown");
                        }
                    }

                    tracing::info!("Cache writer task stopped");
                    break;
                }
            }
        }
    }

    /// `SETEX` of a single queued entry
    async fn write_to_redis(client: &Client, msg: CacheWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(msg.key, msg.value, msg.ttl).await?;
        Ok(())
    }

    /// Looks `key` up and deserializes the stored JSON
    ///
    /// `Ok(None)` is a plain miss. Connection failures and payloads that no
    /// longer deserialize (for example after a response type changed) are
    /// errors; callers going through `cached!` treat both as a miss.
    pub async fn get_from_cache<T: serde::de::DeserializeOwned>(
        &self,
        key: &CacheKey,
    ) -> AppResult<Option<T>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key.to_string()).await?;

        match cached {
            Some(json) => {
                let data = serde_json::from_str(&json).map_err(|e| {
                    AppError::Internal(format!("Cache deserialization error: {}", e))
                })?;
                Ok(Some(data))
            }
            None => Ok(None),
        }
    }

    /// Serializes `value` and queues it for writing with `ttl` seconds to live
    ///
    /// Returns immediately. Serialization and enqueue failures are logged
    /// and otherwise ignored, since a missing cache entry only costs a
    /// recomputation.
    pub fn set_in_background<T: serde::Serialize>(&self, key: &CacheKey, value: &T, ttl: u64) {
        let json = match serde_json::to_string(value) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Cache serialization error");
                return;
            }
        };

        let msg = CacheWriteMessage {
            key: key.to_string(),
            value: json,
            ttl,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Failed to send cache write message");
        }
    }
}
