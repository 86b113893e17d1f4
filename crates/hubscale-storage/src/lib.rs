//! hubscale-storage: the storage boundary of the task hub scaler.
//!
//! The scaling engine only ever needs three read operations against the
//! storage account backing a Durable Task hub:
//!
//! ```text
//! TaskHubStorage
//!   ├── download_blob(container, blob)       → bytes | NotFound | Error
//!   ├── query_table_row_keys(table)          → [row key] | NotFound | Error
//!   └── approximate_message_count(queue)     → count | NotFound | Error
//! ```
//!
//! Two implementations are provided:
//!
//! - **`azure`**: a SAS-authenticated client for the Azure Storage REST API.
//! - **`memory`**: an in-process store for tests, with
//!   failure injection and a request log.
//!
//! `NotFound` is a distinct error variant so callers can treat
//! "resource not created yet" separately from real faults. Every other
//! failure keeps its original HTTP status and error code.

pub mod azure;
pub mod error;
pub mod memory;

use async_trait::async_trait;

pub use azure::{AzureStorageClient, ConnectionSettings};
pub use error::{ConnectionStringError, ResourceKind, StorageError, StorageResult};
pub use memory::{InMemoryStorage, StorageRequest};

/// Read access to the storage account backing a task hub.
#[async_trait]
pub trait TaskHubStorage: Send + Sync {
    /// Download the full contents of a blob.
    async fn download_blob(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>>;

    /// List the row keys of every entity in a table, across all result
    /// pages, in page-then-row order.
    async fn query_table_row_keys(&self, table: &str) -> StorageResult<Vec<String>>;

    /// Read a queue's approximate message count.
    async fn approximate_message_count(&self, queue: &str) -> StorageResult<u64>;
}
