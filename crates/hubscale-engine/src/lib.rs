//! hubscale-engine: the task hub scaling engine.
//!
//! Turns the externally observable queue state of a Durable Task hub into
//! the three values an external autoscaler polls for.
//!
//! # Pipeline
//!
//! ```text
//! ScaleManager
//!   ├── metric_spec()            → { "TaskHubScale", target = M }
//!   ├── is_active(cancel)        → usage.has_activity()
//!   └── metric_value(cancel)     → work_items + P * M
//!         │
//!         ├── QueueUsageAggregator::usage()
//!         │     └── PartitionManager::partitions()
//!         │           ├── Blob:  taskhub.json → "<hub>-control-NN"
//!         │           └── Table: "<Hub>Partitions" row keys
//!         └── WorkerAllocator::worker_count(control counts, N) → P
//! ```
//!
//! Everything is request-scoped: components are built per call and no
//! state survives between calls. Resources that do not exist yet read as
//! "no usage" rather than as errors; every other storage fault propagates
//! unchanged. A `CancellationToken` is raced against each storage call.

pub mod allocator;
pub mod error;
pub mod names;
pub mod options;
pub mod partitions;
pub mod scale;
pub mod usage;

use std::future::Future;

use hubscale_storage::StorageResult;
use tokio_util::sync::CancellationToken;

pub use allocator::{AllocationError, BinPackingAllocator, MAX_PARTITIONS, PartitionSet, WorkerAllocator};
pub use error::{ScaleError, ScaleResult};
pub use options::{OptionsViolation, ScalingOptions};
pub use partitions::{BlobPartitionManager, PartitionManager, PartitionSource, TablePartitionManager, TaskHubInfo};
pub use scale::{METRIC_NAME, MetricSpec, MetricValue, ScaleManager};
pub use usage::{QueueUsageAggregator, TaskHubQueueUsage};

/// Await a storage call unless `cancel` fires first.
///
/// Cancellation is checked before the call is polled, so an already
/// cancelled token never issues I/O.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = StorageResult<T>>,
) -> ScaleResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ScaleError::Cancelled),
        result = call => result.map_err(ScaleError::from),
    }
}
