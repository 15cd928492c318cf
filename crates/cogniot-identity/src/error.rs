//! Credential exchange error types.

use thiserror::Error;

/// Errors that can occur while obtaining temporary credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The anonymous identity could not be resolved from the pool.
    #[error("identity resolution error: {0}")]
    Resolution(String),

    /// The pool refused or failed to issue credentials for the identity.
    #[error("credential exchange error: {0}")]
    Exchange(String),
}

/// Convenience alias for identity results.
pub type IdentityResult<T> = Result<T, IdentityError>;
