//! Storage resource naming for a task hub.
//!
//! These must match the names the Durable Task storage provider creates,
//! including case: queue and container names are lowercased, while the
//! partitions table keeps the hub name's original case.

/// Blob holding the hub's partition metadata, inside the leases container.
pub const TASK_HUB_METADATA_BLOB: &str = "taskhub.json";

/// `<hub, lowercase>-leases`
pub fn leases_container(task_hub: &str) -> String {
    format!("{}-leases", task_hub.to_lowercase())
}

/// `<hub, lowercase>-control-<index, two digits>`
pub fn control_queue(task_hub: &str, index: usize) -> String {
    format!("{}-control-{index:02}", task_hub.to_lowercase())
}

/// `<hub, lowercase>-workitems`
pub fn work_item_queue(task_hub: &str) -> String {
    format!("{}-workitems", task_hub.to_lowercase())
}

/// `<hub, original case>Partitions`
pub fn partitions_table(task_hub: &str) -> String {
    format!("{task_hub}Partitions")
}
