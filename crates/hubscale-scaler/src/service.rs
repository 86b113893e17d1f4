//! External scaler gRPC server.
//!
//! Implements `externalscaler.ExternalScaler` for KEDA. The service is
//! stateless: every RPC parses the trigger metadata it was sent and builds
//! a fresh scale manager, so no reading survives between polls.

use std::collections::HashMap;
use std::pin::Pin;

use futures_core::Stream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use hubscale_engine::{METRIC_NAME, ScaleManager};

use crate::connect::{AzureStorageFactory, StorageFactory};
use crate::error::ScalerError;
use crate::metadata::ScalerMetadata;
use crate::proto;
use crate::proto::external_scaler_server::{ExternalScaler, ExternalScalerServer};

/// gRPC implementation of the KEDA external scaler.
pub struct ExternalScalerService<F = AzureStorageFactory> {
    storage: F,
    shutdown: CancellationToken,
}

impl<F: StorageFactory> ExternalScalerService<F> {
    /// Create a service that opens storage through `storage`.
    ///
    /// Cancelling `shutdown` aborts every in-flight scale computation.
    pub fn new(storage: F, shutdown: CancellationToken) -> Self {
        Self { storage, shutdown }
    }

    /// Get the tonic service for mounting on a gRPC server.
    pub fn into_service(self) -> ExternalScalerServer<Self> {
        ExternalScalerServer::new(self)
    }

    fn scale_manager(&self, metadata: &HashMap<String, String>) -> Result<ScaleManager, ScalerError> {
        let parsed = ScalerMetadata::parse(metadata)?;
        let storage = self.storage.connect(&parsed.connection)?;
        Ok(ScaleManager::new(storage, parsed.options)?)
    }
}

fn rejected(scaled_object: &proto::ScaledObjectRef, err: ScalerError) -> Status {
    warn!(
        namespace = %scaled_object.namespace,
        name = %scaled_object.name,
        error = %err,
        "scale request failed"
    );
    err.into()
}

type IsActiveStream = Pin<Box<dyn Stream<Item = Result<proto::IsActiveResponse, Status>> + Send>>;

#[tonic::async_trait]
impl<F: StorageFactory> ExternalScaler for ExternalScalerService<F> {
    async fn is_active(
        &self,
        request: Request<proto::ScaledObjectRef>,
    ) -> Result<Response<proto::IsActiveResponse>, Status> {
        let scaled_object = request.into_inner();
        let cancel = self.shutdown.child_token();

        let result = async {
            let manager = self.scale_manager(&scaled_object.scaler_metadata)?;
            Ok::<_, ScalerError>(manager.is_active(&cancel).await?)
        }
        .await
        .map_err(|e| rejected(&scaled_object, e))?;

        debug!(
            namespace = %scaled_object.namespace,
            name = %scaled_object.name,
            active = result,
            "is active"
        );
        Ok(Response::new(proto::IsActiveResponse { result }))
    }

    type StreamIsActiveStream = IsActiveStream;

    async fn stream_is_active(
        &self,
        _request: Request<proto::ScaledObjectRef>,
    ) -> Result<Response<Self::StreamIsActiveStream>, Status> {
        Err(Status::unimplemented("push scaling is not supported; use IsActive polling"))
    }

    async fn get_metric_spec(
        &self,
        request: Request<proto::ScaledObjectRef>,
    ) -> Result<Response<proto::GetMetricSpecResponse>, Status> {
        let scaled_object = request.into_inner();
        let spec = self
            .scale_manager(&scaled_object.scaler_metadata)
            .map_err(|e| rejected(&scaled_object, e))?
            .metric_spec();

        debug!(
            namespace = %scaled_object.namespace,
            name = %scaled_object.name,
            target = spec.target_size,
            "metric spec"
        );
        Ok(Response::new(proto::GetMetricSpecResponse {
            metric_specs: vec![proto::MetricSpec {
                metric_name: spec.metric_name,
                target_size: spec.target_size,
                target_size_float: spec.target_size as f64,
            }],
        }))
    }

    async fn get_metrics(
        &self,
        request: Request<proto::GetMetricsRequest>,
    ) -> Result<Response<proto::GetMetricsResponse>, Status> {
        let request = request.into_inner();
        let scaled_object = request
            .scaled_object_ref
            .ok_or_else(|| Status::invalid_argument("scaledObjectRef is required"))?;
        if !request.metric_name.is_empty() && request.metric_name != METRIC_NAME {
            debug!(requested = %request.metric_name, "reporting {METRIC_NAME} for a differently named metric");
        }

        let cancel = self.shutdown.child_token();
        let value = async {
            let manager = self.scale_manager(&scaled_object.scaler_metadata)?;
            Ok::<_, ScalerError>(manager.metric_value(&cancel).await?)
        }
        .await
        .map_err(|e| rejected(&scaled_object, e))?;

        debug!(
            namespace = %scaled_object.namespace,
            name = %scaled_object.name,
            value = value.metric_value,
            "metrics"
        );
        Ok(Response::new(proto::GetMetricsResponse {
            metric_values: vec![proto::MetricValue {
                metric_name: value.metric_name,
                metric_value: value.metric_value,
                metric_value_float: value.metric_value as f64,
            }],
        }))
    }
}
