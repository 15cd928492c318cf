//! Transport error types.

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("unsubscribe error: {0}")]
    Unsubscribe(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("transport has no credentials yet")]
    NotStarted,

    #[error("transport closed")]
    Closed,
}

/// Convenience alias for transport results.
pub type TransportResult<T> = Result<T, TransportError>;
