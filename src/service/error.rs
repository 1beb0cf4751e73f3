use thiserror::Error;

use crate::storage::error::StoreError;
use crate::version::error::{IdentifierError, SemVerError};

/// Errors surfaced to callers of the version service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    #[error(transparent)]
    InvalidSemVer(#[from] SemVerError),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[source] StoreError),

    #[error("failed to write cache: {0}")]
    CacheWriteFailed(#[source] StoreError),

    #[error("durable store unavailable: {0}")]
    DurableUnavailable(#[source] StoreError),

    #[error("push failure: {0}")]
    PushFailure(#[source] StoreError),

    #[error("non-retryable durable error: {0}")]
    NonRetryableDurableError(#[source] StoreError),

    #[error("retryable durable error: {0}")]
    RetryableDurableError(#[source] StoreError),

    #[error("persistence pipeline is shut down")]
    PipelineClosed,
}
