//! Partition discovery: which control queues a task hub currently has.
//!
//! Two storage layouts exist:
//!
//! - **Blob**: the leases container holds `taskhub.json`, whose
//!   `PartitionCount` determines the synthesized queue names
//!   `<hub>-control-00 .. <hub>-control-NN`.
//! - **Table**: the `<Hub>Partitions` table has one row per partition
//!   whose row key is the control queue name itself.
//!
//! A hub that is still being provisioned may lack either resource or have
//! an empty one, so not-found, a blank or `null` blob, a zero partition
//! count and an empty table all read as zero partitions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hubscale_storage::{StorageError, TaskHubStorage};

use crate::allocator::MAX_PARTITIONS;
use crate::error::ScaleResult;
use crate::options::ScalingOptions;
use crate::{cancellable, names};

/// Discovers the ordered control-queue names of a task hub.
#[async_trait]
pub trait PartitionManager: Send + Sync {
    /// Current control queues, in partition order. Empty when the hub's
    /// partition metadata does not exist yet.
    async fn partitions(&self, cancel: &CancellationToken) -> ScaleResult<Vec<String>>;
}

/// Body of the `taskhub.json` metadata blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskHubInfo {
    pub created_at: DateTime<Utc>,
    pub partition_count: u32,
    pub task_hub_name: String,
}

impl TaskHubInfo {
    /// Parse a metadata blob, tolerating a leading UTF-8 byte order mark.
    ///
    /// A blank body or a JSON `null` is `None`: the hub has not written
    /// its metadata yet.
    pub fn from_slice(bytes: &[u8]) -> Result<Option<Self>, StorageError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let info: Option<TaskHubInfo> = serde_json::from_slice(bytes)
            .map_err(|e| StorageError::Malformed(format!("{}: {e}", names::TASK_HUB_METADATA_BLOB)))?;

        match info {
            Some(info) if info.partition_count as usize > MAX_PARTITIONS => {
                Err(StorageError::Malformed(format!(
                    "{}: partition count {} is above {MAX_PARTITIONS}",
                    names::TASK_HUB_METADATA_BLOB,
                    info.partition_count
                )))
            }
            info => Ok(info),
        }
    }
}

/// Reads partition metadata from `<hub>-leases/taskhub.json`.
pub struct BlobPartitionManager {
    storage: Arc<dyn TaskHubStorage>,
    task_hub: String,
}

impl BlobPartitionManager {
    pub fn new(storage: Arc<dyn TaskHubStorage>, task_hub: impl Into<String>) -> Self {
        Self {
            storage,
            task_hub: task_hub.into(),
        }
    }
}

#[async_trait]
impl PartitionManager for BlobPartitionManager {
    async fn partitions(&self, cancel: &CancellationToken) -> ScaleResult<Vec<String>> {
        let container = names::leases_container(&self.task_hub);
        let download = self
            .storage
            .download_blob(&container, names::TASK_HUB_METADATA_BLOB);

        let bytes = match cancellable(cancel, download).await {
            Ok(bytes) => bytes,
            Err(crate::ScaleError::Storage(e)) if e.is_not_found() => {
                debug!(task_hub = %self.task_hub, %container, "task hub metadata blob not found");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let Some(info) = TaskHubInfo::from_slice(&bytes)? else {
            debug!(task_hub = %self.task_hub, %container, "task hub metadata blob is empty");
            return Ok(Vec::new());
        };
        debug!(
            task_hub = %self.task_hub,
            partitions = info.partition_count,
            created_at = %info.created_at,
            "read task hub metadata blob"
        );

        Ok((0..info.partition_count as usize)
            .map(|index| names::control_queue(&self.task_hub, index))
            .collect())
    }
}

/// Reads partition rows from the `<Hub>Partitions` table.
pub struct TablePartitionManager {
    storage: Arc<dyn TaskHubStorage>,
    task_hub: String,
}

impl TablePartitionManager {
    pub fn new(storage: Arc<dyn TaskHubStorage>, task_hub: impl Into<String>) -> Self {
        Self {
            storage,
            task_hub: task_hub.into(),
        }
    }
}

#[async_trait]
impl PartitionManager for TablePartitionManager {
    async fn partitions(&self, cancel: &CancellationToken) -> ScaleResult<Vec<String>> {
        let table = names::partitions_table(&self.task_hub);
        let query = self.storage.query_table_row_keys(&table);

        match cancellable(cancel, query).await {
            Ok(row_keys) => {
                debug!(task_hub = %self.task_hub, %table, partitions = row_keys.len(), "read partitions table");
                Ok(row_keys)
            }
            Err(crate::ScaleError::Storage(e)) if e.is_not_found() => {
                debug!(task_hub = %self.task_hub, %table, "partitions table not found");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// The partition manager selected by a hub's scaling options.
pub enum PartitionSource {
    Blob(BlobPartitionManager),
    Table(TablePartitionManager),
}

impl PartitionSource {
    pub fn for_options(storage: Arc<dyn TaskHubStorage>, options: &ScalingOptions) -> Self {
        if options.use_table_partition_management {
            Self::Table(TablePartitionManager::new(storage, &options.task_hub_name))
        } else {
            Self::Blob(BlobPartitionManager::new(storage, &options.task_hub_name))
        }
    }
}

#[async_trait]
impl PartitionManager for PartitionSource {
    async fn partitions(&self, cancel: &CancellationToken) -> ScaleResult<Vec<String>> {
        match self {
            Self::Blob(manager) => manager.partitions(cancel).await,
            Self::Table(manager) => manager.partitions(cancel).await,
        }
    }
}
