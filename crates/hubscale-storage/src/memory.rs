//! In-memory task hub storage.
//!
//! Holds blobs, paged tables, and queue depths in process memory. Every
//! request is appended to a log so tests can assert exactly which reads
//! were issued, and any resource can be made to fail with a given HTTP
//! status to exercise error propagation. Clones share the same state.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::TaskHubStorage;
use crate::error::{ResourceKind, StorageError, StorageResult};

/// A read issued against the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageRequest {
    DownloadBlob { container: String, blob: String },
    QueryTable { table: String },
    MessageCount { queue: String },
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    status: u16,
    code: String,
}

#[derive(Debug, Default)]
struct Inner {
    /// `(container, blob)` → contents.
    blobs: HashMap<(String, String), Vec<u8>>,
    /// Table name → pages of row keys.
    tables: HashMap<String, Vec<Vec<String>>>,
    /// Queue name → approximate message count.
    queues: HashMap<String, u64>,
    failures: HashMap<(ResourceKind, String), InjectedFailure>,
    requests: Vec<StorageRequest>,
}

/// Shared, mutable in-memory storage account.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace a blob.
    pub fn put_blob(&self, container: &str, blob: &str, contents: impl Into<Vec<u8>>) -> &Self {
        self.write()
            .blobs
            .insert((container.to_string(), blob.to_string()), contents.into());
        self
    }

    pub fn delete_blob(&self, container: &str, blob: &str) -> &Self {
        self.write()
            .blobs
            .remove(&(container.to_string(), blob.to_string()));
        self
    }

    /// Create or replace a table whose rows come back as a single page.
    pub fn put_table<I, S>(&self, table: &str, row_keys: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let page: Vec<String> = row_keys.into_iter().map(Into::into).collect();
        self.put_table_pages(table, vec![page])
    }

    /// Create or replace a table with explicit result pages.
    pub fn put_table_pages(&self, table: &str, pages: Vec<Vec<String>>) -> &Self {
        self.write().tables.insert(table.to_string(), pages);
        self
    }

    /// Create a queue or overwrite its approximate message count.
    pub fn set_queue(&self, queue: &str, count: u64) -> &Self {
        self.write().queues.insert(queue.to_string(), count);
        self
    }

    pub fn delete_queue(&self, queue: &str) -> &Self {
        self.write().queues.remove(queue);
        self
    }

    /// Make every read of the given resource fail with `status`.
    ///
    /// For blobs, `name` is `"{container}/{blob}"`.
    pub fn fail(&self, kind: ResourceKind, name: &str, status: u16, code: &str) -> &Self {
        self.write().failures.insert(
            (kind, name.to_string()),
            InjectedFailure {
                status,
                code: code.to_string(),
            },
        );
        self
    }

    /// Remove a previously injected failure.
    pub fn heal(&self, kind: ResourceKind, name: &str) -> &Self {
        self.write().failures.remove(&(kind, name.to_string()));
        self
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<StorageRequest> {
        self.read().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.write().requests.clear();
    }

    /// Record `request` and return the injected failure for the resource, if any.
    fn begin(&self, request: StorageRequest, kind: ResourceKind, name: &str) -> StorageResult<()> {
        let mut inner = self.write();
        inner.requests.push(request);
        match inner.failures.get(&(kind, name.to_string())) {
            Some(failure) => Err(StorageError::Status {
                status: failure.status,
                code: Some(failure.code.clone()),
                message: format!("injected failure for {kind} {name}"),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskHubStorage for InMemoryStorage {
    async fn download_blob(&self, container: &str, blob: &str) -> StorageResult<Vec<u8>> {
        let name = format!("{container}/{blob}");
        self.begin(
            StorageRequest::DownloadBlob {
                container: container.to_string(),
                blob: blob.to_string(),
            },
            ResourceKind::Blob,
            &name,
        )?;

        self.read()
            .blobs
            .get(&(container.to_string(), blob.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(ResourceKind::Blob, name))
    }

    async fn query_table_row_keys(&self, table: &str) -> StorageResult<Vec<String>> {
        self.begin(
            StorageRequest::QueryTable {
                table: table.to_string(),
            },
            ResourceKind::Table,
            table,
        )?;

        self.read()
            .tables
            .get(table)
            .map(|pages| pages.iter().flatten().cloned().collect())
            .ok_or_else(|| StorageError::not_found(ResourceKind::Table, table))
    }

    async fn approximate_message_count(&self, queue: &str) -> StorageResult<u64> {
        self.begin(
            StorageRequest::MessageCount {
                queue: queue.to_string(),
            },
            ResourceKind::Queue,
            queue,
        )?;

        self.read()
            .queues
            .get(queue)
            .copied()
            .ok_or_else(|| StorageError::not_found(ResourceKind::Queue, queue))
    }
}
