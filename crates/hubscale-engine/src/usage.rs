//! Queue usage aggregation.
//!
//! Reads the approximate depth of every control queue named by the
//! partition manager, plus the work-item queue, into one snapshot. The
//! snapshot is all-or-nothing: if any queue that should exist is missing,
//! the hub is mid-provisioning or mid-teardown and the result is
//! [`TaskHubQueueUsage::NONE`] rather than a partial reading.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use hubscale_storage::TaskHubStorage;

use crate::error::{ScaleError, ScaleResult};
use crate::partitions::{PartitionManager, PartitionSource};
use crate::{cancellable, names};

/// Message counts for a task hub's queues at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskHubQueueUsage {
    control_queue_messages: Vec<u64>,
    work_item_queue_messages: u64,
}

impl TaskHubQueueUsage {
    /// No usage: the hub is idle, has no partitions, or is not ready yet.
    pub const NONE: Self = Self {
        control_queue_messages: Vec::new(),
        work_item_queue_messages: 0,
    };

    pub fn new(control_queue_messages: Vec<u64>, work_item_queue_messages: u64) -> Self {
        Self {
            control_queue_messages,
            work_item_queue_messages,
        }
    }

    /// Control-queue depths; index `i` belongs to partition `i`.
    pub fn control_queue_messages(&self) -> &[u64] {
        &self.control_queue_messages
    }

    pub fn work_item_queue_messages(&self) -> u64 {
        self.work_item_queue_messages
    }

    /// Whether any queue holds at least one message.
    pub fn has_activity(&self) -> bool {
        self.work_item_queue_messages > 0 || self.control_queue_messages.iter().any(|&n| n > 0)
    }
}

/// Builds a [`TaskHubQueueUsage`] snapshot for one task hub.
pub struct QueueUsageAggregator<P = PartitionSource> {
    storage: Arc<dyn TaskHubStorage>,
    partitions: P,
    task_hub: String,
}

impl<P: PartitionManager> QueueUsageAggregator<P> {
    pub fn new(storage: Arc<dyn TaskHubStorage>, partitions: P, task_hub: impl Into<String>) -> Self {
        Self {
            storage,
            partitions,
            task_hub: task_hub.into(),
        }
    }

    /// Read the current usage of every queue in the hub.
    pub async fn usage(&self, cancel: &CancellationToken) -> ScaleResult<TaskHubQueueUsage> {
        let partitions = self.partitions.partitions(cancel).await?;
        if partitions.is_empty() {
            debug!(task_hub = %self.task_hub, "no partitions discovered");
            return Ok(TaskHubQueueUsage::NONE);
        }

        let mut control_queue_messages = Vec::with_capacity(partitions.len());
        for queue in &partitions {
            match self.queue_depth(queue, cancel).await? {
                Some(count) => control_queue_messages.push(count),
                None => return Ok(TaskHubQueueUsage::NONE),
            }
        }

        let work_items = names::work_item_queue(&self.task_hub);
        let Some(work_item_queue_messages) = self.queue_depth(&work_items, cancel).await? else {
            return Ok(TaskHubQueueUsage::NONE);
        };

        debug!(
            task_hub = %self.task_hub,
            control = ?control_queue_messages,
            work_items = work_item_queue_messages,
            "read queue usage"
        );

        Ok(TaskHubQueueUsage::new(control_queue_messages, work_item_queue_messages))
    }

    /// Approximate depth of `queue`, or `None` when it does not exist.
    async fn queue_depth(&self, queue: &str, cancel: &CancellationToken) -> ScaleResult<Option<u64>> {
        match cancellable(cancel, self.storage.approximate_message_count(queue)).await {
            Ok(count) => Ok(Some(count)),
            Err(ScaleError::Storage(e)) if e.is_not_found() => {
                warn!(task_hub = %self.task_hub, queue, "queue not found; reporting no usage");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
