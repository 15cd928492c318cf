//! Session error types.

use cogniot_identity::IdentityError;
use thiserror::Error;

/// Errors surfaced by session operations.
///
/// `disconnect` and observer registration never fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("identity resolution error: {0}")]
    IdentityResolution(String),

    #[error("credential exchange error: {0}")]
    CredentialExchange(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("unsubscription error: {0}")]
    Unsubscription(String),

    #[error("publish error: {0}")]
    Publish(String),
}

impl From<IdentityError> for SessionError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Resolution(cause) => SessionError::IdentityResolution(cause),
            IdentityError::Exchange(cause) => SessionError::CredentialExchange(cause),
        }
    }
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
