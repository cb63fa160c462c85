//! Shared cache client for the published snapshot.
//!
//! Two keys form the contract: a blob key holding the serialized snapshot and
//! a counter key holding its monotonic version. Both are written in one
//! MULTI/EXEC transaction, so no reader can observe a blob whose version has
//! not advanced (or the reverse).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::config::CacheConfig;
use crate::error::{PipelineError, PipelineResult};

/// Typed access to the snapshot blob and its version counter.
#[derive(Clone)]
pub struct SnapshotCache {
    conn: ConnectionManager,
    snapshot_key: String,
    version_key: String,
}

impl SnapshotCache {
    /// Connects to the cache and verifies it responds.
    pub async fn connect(config: &CacheConfig) -> PipelineResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| PipelineError::Unavailable(format!("cache: {}", e)))?;
        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| PipelineError::Unavailable(format!("cache: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| PipelineError::Unavailable(format!("cache: {}", e)))?;

        log::info!("Cache connection established ({})", config.url);

        Ok(Self {
            conn,
            snapshot_key: config.snapshot_key.clone(),
            version_key: config.version_key.clone(),
        })
    }

    /// Reads the current snapshot blob and its version in one transaction.
    /// Returns `None` until a builder has published the first snapshot.
    pub async fn get_snapshot(&self) -> PipelineResult<Option<(Vec<u8>, u64)>> {
        let mut conn = self.conn.clone();
        let (blob, version): (Option<Vec<u8>>, Option<u64>) = redis::pipe()
            .atomic()
            .get(&self.snapshot_key)
            .get(&self.version_key)
            .query_async(&mut conn)
            .await?;

        match (blob, version) {
            (Some(blob), Some(version)) => Ok(Some((blob, version))),
            _ => Ok(None),
        }
    }

    /// Writes the snapshot blob and bumps the version counter atomically.
    /// Returns the new version.
    pub async fn put_snapshot(&self, bytes: &[u8]) -> PipelineResult<u64> {
        let mut conn = self.conn.clone();
        let (version,): (u64,) = redis::pipe()
            .atomic()
            .set(&self.snapshot_key, bytes)
            .ignore()
            .incr(&self.version_key, 1u64)
            .query_async(&mut conn)
            .await?;

        Ok(version)
    }

    /// Reads the version counter alone; the matcher's poll path.
    /// Returns 0 when no snapshot has ever been published.
    pub async fn get_version(&self) -> PipelineResult<u64> {
        let mut conn = self.conn.clone();
        let version: Option<u64> = conn.get(&self.version_key).await?;
        Ok(version.unwrap_or(0))
    }
}
