//! Engine error types.

use thiserror::Error;

use hubscale_storage::StorageError;

use crate::allocator::AllocationError;
use crate::options::OptionsViolation;

/// Errors that can occur while computing scale decisions.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// A storage fault other than not-found, passed through unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("scale request was cancelled")]
    Cancelled,

    #[error("worker allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("worker allocation task failed: {0}")]
    AllocationTask(#[from] tokio::task::JoinError),

    #[error("invalid scaling options: {}", join_violations(.0))]
    InvalidOptions(Vec<OptionsViolation>),
}

pub type ScaleResult<T> = Result<T, ScaleError>;

fn join_violations(violations: &[OptionsViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
