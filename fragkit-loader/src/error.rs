//! Error types for fragkit-loader
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use fragkit_common::FramingError;
use thiserror::Error;

use crate::transport::TransportError;

/// Main error type for fragkit-loader
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Item id unusable in a comma-joined request path
    #[error("Invalid item id: {0:?}")]
    InvalidItemId(String),

    /// Batched request failed
    #[error("Batch {batch_key} transport error: {source}")]
    Transport {
        batch_key: String,
        #[source]
        source: TransportError,
    },

    /// Batched response could not be decoded
    #[error("Batch {batch_key} framing error: {source}")]
    Framing {
        batch_key: String,
        #[source]
        source: FramingError,
    },

    /// HTTP client could not be built
    #[error("Transport setup error: {0}")]
    TransportSetup(#[source] TransportError),

    /// Batch dropped because an earlier batch failed
    #[error("Batch {batch_key} rejected: {cause}")]
    Rejected { batch_key: String, cause: String },

    /// Dispatcher task is gone; batch never ran
    #[error("Batch dispatcher closed")]
    DispatcherClosed,

    /// Configuration or other shared error
    #[error(transparent)]
    Common(#[from] fragkit_common::Error),
}

/// Convenience Result type using fragkit-loader LoaderError
pub type Result<T> = std::result::Result<T, LoaderError>;
