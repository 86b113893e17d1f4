//! Scale manager: the values an external autoscaler polls for.
//!
//! The autoscaler computes desired replicas as `ceil(value / target)`.
//! With `A` activity work items, `M` activities per worker, and `P`
//! workers needed for the orchestration partitions, the scaler reports
//! `target = M` and `value = A + P * M`, so that
//!
//! ```text
//! ceil((A + P * M) / M) = P + ceil(A / M)
//! ```
//!
//! Activity work items are one interchangeable pool and divide evenly
//! across workers; orchestration partitions each pin to a single worker and
//! are bin-packed separately (see [`crate::allocator`]).

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hubscale_storage::TaskHubStorage;

use crate::allocator::{BinPackingAllocator, WorkerAllocator};
use crate::error::{ScaleError, ScaleResult};
use crate::options::ScalingOptions;
use crate::partitions::{PartitionManager, PartitionSource};
use crate::usage::{QueueUsageAggregator, TaskHubQueueUsage};

/// Name of the single metric this scaler reports.
pub const METRIC_NAME: &str = "TaskHubScale";

/// Target the autoscaler divides the metric value by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSpec {
    pub metric_name: String,
    pub target_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricValue {
    pub metric_name: String,
    pub metric_value: i64,
}

/// Computes scale decisions for one task hub.
pub struct ScaleManager<P = PartitionSource, A = BinPackingAllocator> {
    aggregator: QueueUsageAggregator<P>,
    allocator: Arc<A>,
    options: ScalingOptions,
}

impl ScaleManager {
    /// Build a manager with the partition strategy selected by `options`.
    ///
    /// Fails with [`ScaleError::InvalidOptions`] if `options` breaks any
    /// validation rule.
    pub fn new(storage: Arc<dyn TaskHubStorage>, options: ScalingOptions) -> ScaleResult<Self> {
        let partitions = PartitionSource::for_options(storage.clone(), &options);
        Self::with_parts(storage, partitions, BinPackingAllocator, options)
    }
}

impl<P: PartitionManager, A: WorkerAllocator + 'static> ScaleManager<P, A> {
    pub fn with_parts(
        storage: Arc<dyn TaskHubStorage>,
        partitions: P,
        allocator: A,
        options: ScalingOptions,
    ) -> ScaleResult<Self> {
        let violations = options.validate();
        if !violations.is_empty() {
            return Err(ScaleError::InvalidOptions(violations));
        }

        Ok(Self {
            aggregator: QueueUsageAggregator::new(storage, partitions, &options.task_hub_name),
            allocator: Arc::new(allocator),
            options,
        })
    }

    pub fn options(&self) -> &ScalingOptions {
        &self.options
    }

    pub fn metric_spec(&self) -> MetricSpec {
        MetricSpec {
            metric_name: METRIC_NAME.to_string(),
            target_size: i64::from(self.options.max_activities_per_worker),
        }
    }

    /// Whether the hub has any queued work.
    pub async fn is_active(&self, cancel: &CancellationToken) -> ScaleResult<bool> {
        let usage = self.aggregator.usage(cancel).await?;
        Ok(usage.has_activity())
    }

    pub async fn metric_value(&self, cancel: &CancellationToken) -> ScaleResult<MetricValue> {
        let usage = self.aggregator.usage(cancel).await?;
        let metric_value = self.value_for(&usage).await?;

        Ok(MetricValue {
            metric_name: METRIC_NAME.to_string(),
            metric_value,
        })
    }

    /// Apply the scaling formula to a usage snapshot.
    ///
    /// Allocation runs on the blocking pool: its table grows with
    /// `min(maxOrchestrationsPerWorker, total backlog)`.
    pub async fn value_for(&self, usage: &TaskHubQueueUsage) -> ScaleResult<i64> {
        if !usage.has_activity() {
            return Ok(0);
        }

        let allocator = Arc::clone(&self.allocator);
        let counts = usage.control_queue_messages().to_vec();
        let capacity = self.options.max_orchestrations_per_worker;
        let orchestration_workers =
            tokio::task::spawn_blocking(move || allocator.worker_count(&counts, capacity)).await??;

        let work_items = i64::try_from(usage.work_item_queue_messages()).unwrap_or(i64::MAX);
        let value = i64::from(orchestration_workers)
            .saturating_mul(i64::from(self.options.max_activities_per_worker))
            .saturating_add(work_items);

        debug!(
            task_hub = %self.options.task_hub_name,
            work_items,
            orchestration_workers,
            value,
            "computed metric value"
        );
        Ok(value)
    }
}
