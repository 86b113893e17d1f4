//! hubscale-scaler: KEDA external scaler for Durable Task hubs.
//!
//! Serves the `externalscaler.ExternalScaler` gRPC interface. Every call
//! carries the `ScaledObject` trigger metadata, so each RPC parses it,
//! connects to the hub's storage account, and runs one scale computation
//! on a fresh [`hubscale_engine::ScaleManager`].
//!
//! ```text
//! KEDA operator
//!   └── ExternalScalerService (gRPC)
//!       ├── IsActive()       → ScaleManager::is_active
//!       ├── GetMetricSpec()  → ScaleManager::metric_spec
//!       ├── GetMetrics()     → ScaleManager::metric_value
//!       └── StreamIsActive() → UNIMPLEMENTED
//! ```

pub mod connect;
pub mod error;
pub mod metadata;
pub mod service;

pub mod proto {
    tonic::include_proto!("externalscaler");
}

pub use connect::{AzureStorageFactory, StorageFactory};
pub use error::ScalerError;
pub use metadata::{ConnectionSource, DEFAULT_CONNECTION_ENV, MetadataError, ScalerMetadata};
pub use service::ExternalScalerService;
