use async_trait::async_trait;

use cogniot_protocol::Credentials;

use crate::error::IdentityResult;

/// Source of temporary signing credentials.
///
/// Implementations resolve the caller's identity and exchange it for a fresh
/// credential set on every call. No caching of credentials, no retries.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the identity and exchange it for credentials.
    async fn fetch(&self) -> IdentityResult<Credentials>;
}
