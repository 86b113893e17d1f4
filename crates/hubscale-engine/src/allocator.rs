//! Worker allocation: bin-packing orchestration partitions onto workers.
//!
//! Orchestration backlog lives in control-queue partitions, and each
//! partition is owned by exactly one worker at a time. Unlike activity work
//! items, partitions cannot be split across workers, so the number of
//! workers needed is a bin-packing problem: each worker is a bin of size
//! `capacity`, each partition with a backlog is an item costing
//! `min(backlog, capacity)`.
//!
//! The allocator repeatedly fills one worker with the largest number of
//! partitions that fit (a 0/1 knapsack maximizing item count) and removes
//! them, until every active partition is assigned. This is a heuristic:
//! it is deterministic, but not always the global minimum.
//!
//! ```text
//! [3, 2, 1, 2] @ capacity 4
//!   worker 1 ← {0, 2}   (3 + 1)
//!   worker 2 ← {1, 3}   (2 + 2)
//!   → 2 workers
//! ```

use thiserror::Error;
use tracing::trace;

/// Upper bound on control-queue partitions for one task hub.
pub const MAX_PARTITIONS: usize = 15;

/// Errors for inputs outside the allocator's contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("worker capacity must be at least 1")]
    InvalidCapacity,

    #[error("{count} partitions exceeds the maximum of {MAX_PARTITIONS}")]
    TooManyPartitions { count: usize },
}

/// A set of partition indices in `0..MAX_PARTITIONS` with a cached size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionSet {
    bits: u16,
    count: u8,
}

impl PartitionSet {
    pub const EMPTY: Self = Self { bits: 0, count: 0 };

    /// Insert `index`. The index must be in range and not yet present.
    pub fn add(&mut self, index: usize) {
        assert!(index < MAX_PARTITIONS, "partition index {index} out of range");
        assert!(!self.contains(index), "partition {index} already in set");
        self.bits |= 1 << index;
        self.count += 1;
    }

    /// Copy of this set with `index` added.
    pub fn with(mut self, index: usize) -> Self {
        self.add(index);
        self
    }

    pub fn contains(&self, index: usize) -> bool {
        index < MAX_PARTITIONS && self.bits & (1 << index) != 0
    }

    /// Remove every member of `subset`, which must be contained in `self`.
    pub fn remove(&mut self, subset: PartitionSet) {
        assert_eq!(
            self.bits & subset.bits,
            subset.bits,
            "removed set is not a subset"
        );
        self.bits &= !subset.bits;
        self.count -= subset.count;
    }

    pub fn count(&self) -> usize {
        usize::from(self.count)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Member indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_PARTITIONS).filter(|&i| self.contains(i))
    }
}

/// Computes how many workers a set of partition backlogs needs.
pub trait WorkerAllocator: Send + Sync {
    /// `partition_work_items[i]` is the backlog of partition `i`;
    /// `capacity` is the backlog one worker can own.
    fn worker_count(&self, partition_work_items: &[u64], capacity: u32) -> Result<u32, AllocationError>;
}

/// Repeated max-cardinality knapsack allocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinPackingAllocator;

impl WorkerAllocator for BinPackingAllocator {
    fn worker_count(&self, partition_work_items: &[u64], capacity: u32) -> Result<u32, AllocationError> {
        if capacity < 1 {
            return Err(AllocationError::InvalidCapacity);
        }
        if partition_work_items.len() > MAX_PARTITIONS {
            return Err(AllocationError::TooManyPartitions {
                count: partition_work_items.len(),
            });
        }

        // Idle partitions never need a worker.
        let mut remaining = PartitionSet::EMPTY;
        for (index, &items) in partition_work_items.iter().enumerate() {
            if items > 0 {
                remaining.add(index);
            }
        }

        let mut workers = 0u32;
        while !remaining.is_empty() {
            let chosen = maximize_worker_partitions(partition_work_items, remaining, capacity);
            debug_assert!(!chosen.is_empty(), "every remaining partition fits a worker on its own");
            trace!(worker = workers, partitions = ?chosen.iter().collect::<Vec<_>>(), "assigned partitions");
            remaining.remove(chosen);
            workers += 1;
        }

        Ok(workers)
    }
}

/// Pick the largest set of `remaining` partitions one worker can own.
///
/// 0/1 knapsack over all partitions, maximizing the number of partitions
/// whose capped costs sum to at most `capacity`. Partitions outside
/// `remaining` are never chosen. When including a partition ties with
/// excluding it, the exclusion wins; callers depend on this exact choice
/// among equally sized answers.
///
/// Row `p` of the table depends only on row `p - 1`, so two rows are kept.
/// When all of `remaining` fits in one worker the table is narrowed to
/// their total cost: the only maximal answer is then `remaining` itself.
///
/// Each call allocates two rows of `min(capacity, total capped cost) + 1`
/// sets and runs in time proportional to that width times the partition
/// count. Async callers should run it on a blocking thread.
pub fn maximize_worker_partitions(
    partition_work_items: &[u64],
    remaining: PartitionSet,
    capacity: u32,
) -> PartitionSet {
    let capped = |index: usize| partition_work_items[index].min(u64::from(capacity)) as usize;

    let total: usize = remaining.iter().map(capped).sum();
    let width = (capacity as usize).min(total);

    let mut prev = vec![PartitionSet::EMPTY; width + 1];
    let mut cur = prev.clone();

    for index in 0..partition_work_items.len() {
        let cost = capped(index);
        let eligible = remaining.contains(index);

        for c in 1..=width {
            let exclude = prev[c];
            cur[c] = if !eligible || cost > c {
                exclude
            } else {
                let include = prev[c - cost].with(index);
                if exclude.count() >= include.count() {
                    exclude
                } else {
                    include
                }
            };
        }

        std::mem::swap(&mut prev, &mut cur);
    }

    prev[width]
}
