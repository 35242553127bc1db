//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache records.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::TieredCache;
use crate::codec::Serializer;
use crate::storage::StorageBackend;

/// Spawns a background task that periodically purges expired records.
///
/// Lookups already expire records lazily; this task reclaims the ones nobody reads.
/// A failed pass is logged and retried on the next tick.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(state.cache.clone(), 1);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task<T, B, S>(
    cache: Arc<TieredCache<T, B, S>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    B: StorageBackend + 'static,
    S: Serializer + 'static,
{
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} seconds",
            cleanup_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.purge_expired() {
                Ok(0) => debug!("TTL cleanup: no expired records found"),
                Ok(removed) => info!("TTL cleanup: removed {} expired records", removed),
                Err(e) => warn!(error = %e, "TTL cleanup pass failed"),
            }
        }
    })
}
