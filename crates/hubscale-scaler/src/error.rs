//! Scaler error types and their gRPC status codes.

use thiserror::Error;
use tonic::Status;

use hubscale_engine::ScaleError;
use hubscale_storage::ConnectionStringError;

use crate::metadata::MetadataError;

#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("invalid scaler metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error("environment variable {0} holding the storage connection string is not set")]
    MissingConnection(String),

    #[error("invalid storage connection string: {0}")]
    Connection(#[from] ConnectionStringError),

    #[error(transparent)]
    Scale(#[from] ScaleError),
}

impl From<ScalerError> for Status {
    fn from(err: ScalerError) -> Self {
        let message = err.to_string();
        match err {
            ScalerError::Metadata(_)
            | ScalerError::MissingConnection(_)
            | ScalerError::Connection(_) => Status::invalid_argument(message),
            ScalerError::Scale(ScaleError::Storage(_)) => Status::unavailable(message),
            ScalerError::Scale(ScaleError::Cancelled) => Status::cancelled(message),
            ScalerError::Scale(ScaleError::InvalidOptions(_)) => Status::invalid_argument(message),
            ScalerError::Scale(ScaleError::Allocation(_) | ScaleError::AllocationTask(_)) => {
                Status::internal(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubscale_engine::{AllocationError, OptionsViolation};
    use hubscale_storage::StorageError;
    use tonic::Code;

    fn code(err: ScalerError) -> Code {
        Status::from(err).code()
    }

    #[test]
    fn status_codes() {
        let violation = OptionsViolation::new("taskHubName", "is required");
        assert_eq!(
            code(MetadataError(vec![violation.clone()]).into()),
            Code::InvalidArgument
        );
        assert_eq!(
            code(ScalerError::MissingConnection("AzureWebJobsStorage".into())),
            Code::InvalidArgument
        );
        assert_eq!(
            code(ConnectionStringError::Empty.into()),
            Code::InvalidArgument
        );
        assert_eq!(
            code(ScaleError::InvalidOptions(vec![violation]).into()),
            Code::InvalidArgument
        );
        assert_eq!(
            code(ScaleError::from(StorageError::Malformed("taskhub.json".into())).into()),
            Code::Unavailable
        );
        assert_eq!(code(ScaleError::Cancelled.into()), Code::Cancelled);
        assert_eq!(
            code(ScaleError::from(AllocationError::InvalidCapacity).into()),
            Code::Internal
        );
    }

    #[tokio::test]
    async fn panicked_allocation_is_internal() {
        let handle: tokio::task::JoinHandle<()> = tokio::spawn(async { panic!("allocator bug") });
        let join_error = handle.await.unwrap_err();
        assert_eq!(code(ScaleError::from(join_error).into()), Code::Internal);
    }

    #[test]
    fn storage_status_is_kept_in_message() {
        let err = ScalerError::from(ScaleError::from(StorageError::Status {
            status: 403,
            code: Some("AuthorizationFailure".into()),
            message: "denied".into(),
        }));
        let status = Status::from(err);
        assert!(status.message().contains("403"), "{}", status.message());
        assert!(status.message().contains("AuthorizationFailure"));
    }
}
