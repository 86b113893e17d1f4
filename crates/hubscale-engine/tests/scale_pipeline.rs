//! End-to-end scaling over an in-memory storage account.
//!
//! Exercises the full pipeline (blob or table discovery, queue reads,
//! bin-packing, formula) the way the gRPC service drives it.

use std::sync::Arc;

use hubscale_engine::{METRIC_NAME, ScaleError, ScaleManager, ScalingOptions};
use hubscale_storage::{InMemoryStorage, ResourceKind, StorageError, StorageRequest};
use tokio_util::sync::CancellationToken;

const HUB: &str = "OrdersHub";

fn metadata_blob(partitions: u32) -> String {
    format!(
        r#"{{"CreatedAt":"2024-05-20T08:00:00Z","PartitionCount":{partitions},"TaskHubName":"{HUB}"}}"#
    )
}

fn blob_hub(counts: &[u64], work_items: u64) -> InMemoryStorage {
    let store = InMemoryStorage::new();
    store.put_blob("ordershub-leases", "taskhub.json", metadata_blob(counts.len() as u32));
    for (i, &count) in counts.iter().enumerate() {
        store.set_queue(&format!("ordershub-control-{i:02}"), count);
    }
    store.set_queue("ordershub-workitems", work_items);
    store
}

fn options() -> ScalingOptions {
    ScalingOptions::new(HUB)
        .with_max_activities_per_worker(10)
        .with_max_orchestrations_per_worker(6)
}

#[tokio::test]
async fn blob_hub_reports_two_workers_of_orchestrations() {
    let store = blob_hub(&[1, 2, 3, 4], 0);
    let scale = ScaleManager::new(Arc::new(store.clone()), options()).unwrap();
    let cancel = CancellationToken::new();

    assert!(scale.is_active(&cancel).await.unwrap());

    let spec = scale.metric_spec();
    let value = scale.metric_value(&cancel).await.unwrap();
    assert_eq!(spec.metric_name, METRIC_NAME);
    assert_eq!(spec.target_size, 10);
    assert_eq!(value.metric_value, 20);

    // An HPA computing ceil(value / target) asks for two replicas.
    let replicas = (value.metric_value + spec.target_size - 1) / spec.target_size;
    assert_eq!(replicas, 2);
}

#[tokio::test]
async fn table_hub_uses_row_keys_as_queue_names() {
    let store = InMemoryStorage::new();
    store
        .put_table("OrdersHubPartitions", ["orders-a", "orders-b"])
        .set_queue("orders-a", 6)
        .set_queue("orders-b", 6)
        .set_queue("ordershub-workitems", 15);

    let scale = ScaleManager::new(
        Arc::new(store.clone()),
        options().with_table_partition_management(true),
    )
    .unwrap();

    let value = scale.metric_value(&CancellationToken::new()).await.unwrap();
    assert_eq!(value.metric_value, 15 + 2 * 10);

    let reads: Vec<_> = store
        .requests()
        .into_iter()
        .filter(|r| matches!(r, StorageRequest::DownloadBlob { .. }))
        .collect();
    assert!(reads.is_empty(), "table mode must not read the metadata blob");
}

#[tokio::test]
async fn vanished_control_queue_reports_inactive() {
    let store = blob_hub(&[7, 7, 7], 3);
    store.delete_queue("ordershub-control-01");

    let scale = ScaleManager::new(Arc::new(store), options()).unwrap();
    let cancel = CancellationToken::new();
    assert!(!scale.is_active(&cancel).await.unwrap());
    assert_eq!(scale.metric_value(&cancel).await.unwrap().metric_value, 0);
}

#[tokio::test]
async fn storage_outage_is_an_error_not_an_idle_hub() {
    let store = blob_hub(&[1], 1);
    store.fail(ResourceKind::Queue, "ordershub-workitems", 500, "InternalError");

    let scale = ScaleManager::new(Arc::new(store), options()).unwrap();
    let err = scale.is_active(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ScaleError::Storage(StorageError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn every_poll_rereads_storage() {
    let store = blob_hub(&[0], 0);
    let scale = ScaleManager::new(Arc::new(store.clone()), options()).unwrap();
    let cancel = CancellationToken::new();

    assert!(!scale.is_active(&cancel).await.unwrap());

    store.set_queue("ordershub-control-00", 4);
    assert!(scale.is_active(&cancel).await.unwrap());
    assert_eq!(scale.metric_value(&cancel).await.unwrap().metric_value, 10);
}

#[tokio::test]
async fn empty_metadata_blob_reads_no_queues() {
    let zero_count = format!(
        r#"{{"CreatedAt":"2024-05-20T08:00:00Z","PartitionCount":0,"TaskHubName":"{HUB}"}}"#
    );
    for body in [String::new(), "null".to_string(), zero_count] {
        let store = blob_hub(&[5, 5], 5);
        store.put_blob("ordershub-leases", "taskhub.json", body.clone());

        let scale = ScaleManager::new(Arc::new(store.clone()), options()).unwrap();
        let cancel = CancellationToken::new();
        assert!(!scale.is_active(&cancel).await.unwrap(), "body {body:?}");
        assert_eq!(scale.metric_value(&cancel).await.unwrap().metric_value, 0);

        let queue_reads = store
            .requests()
            .into_iter()
            .filter(|r| matches!(r, StorageRequest::MessageCount { .. }))
            .count();
        assert_eq!(queue_reads, 0, "body {body:?}");
    }
}

#[tokio::test]
async fn torn_down_hub_goes_idle_between_polls() {
    let store = blob_hub(&[3, 3], 0);
    let scale = ScaleManager::new(Arc::new(store.clone()), options()).unwrap();
    let cancel = CancellationToken::new();
    assert_eq!(scale.options().task_hub_name, HUB);

    assert!(scale.is_active(&cancel).await.unwrap());

    store.delete_blob("ordershub-leases", "taskhub.json");
    store.clear_requests();

    assert!(!scale.is_active(&cancel).await.unwrap());
    assert_eq!(
        store.requests(),
        vec![StorageRequest::DownloadBlob {
            container: "ordershub-leases".to_string(),
            blob: "taskhub.json".to_string(),
        }]
    );
}
