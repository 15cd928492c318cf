//! Mock credential provider for testing without an identity pool.
//!
//! Returns a fixed outcome and counts how many exchanges were attempted.

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use cogniot_protocol::Credentials;

use crate::error::IdentityResult;
use crate::provider::CredentialProvider;

/// Mock implementation of the `CredentialProvider` trait.
///
/// Every `fetch` returns a clone of the configured outcome, which can be
/// swapped between calls with `set_outcome`.
pub struct MockCredentialProvider {
    outcome: Mutex<IdentityResult<Credentials>>,
    attempts: AtomicUsize,
}

impl MockCredentialProvider {
    /// A provider whose exchange always succeeds with `credentials`.
    pub fn succeeding(credentials: Credentials) -> Self {
        Self::with_outcome(Ok(credentials))
    }

    /// A provider whose exchange always fails with `error`.
    pub fn failing(error: crate::IdentityError) -> Self {
        Self::with_outcome(Err(error))
    }

    pub fn with_outcome(outcome: IdentityResult<Credentials>) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Replace the outcome returned by subsequent exchanges.
    pub fn set_outcome(&self, outcome: IdentityResult<Credentials>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = outcome;
    }

    /// Number of exchanges attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for MockCredentialProvider {
    fn default() -> Self {
        Self::succeeding(Credentials::new("AK", "SK", "TOK"))
    }
}

#[async_trait]
impl CredentialProvider for MockCredentialProvider {
    async fn fetch(&self) -> IdentityResult<Credentials> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
