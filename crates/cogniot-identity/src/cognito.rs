//! AWS Cognito Identity credential provider.
//!
//! Resolves an unauthenticated identity from an identity pool (`GetId`) and
//! exchanges it for temporary credentials (`GetCredentialsForIdentity`).
//! Both calls are unauthenticated, so the SDK is built without ambient
//! AWS credentials.

use async_trait::async_trait;
use aws_sdk_cognitoidentity::Client as CognitoClient;
use aws_sdk_cognitoidentity::config::Region;
use aws_sdk_cognitoidentity::error::DisplayErrorContext;
use aws_sdk_cognitoidentity::types::Credentials as SdkCredentials;
use tokio::sync::OnceCell;

use cogniot_protocol::Credentials;

use crate::error::{IdentityError, IdentityResult};
use crate::provider::CredentialProvider;

/// Credential provider backed by a Cognito identity pool.
///
/// The SDK client is built on first use and the resolved identity id is
/// kept for the provider's lifetime. Credentials are fetched fresh on
/// every call.
pub struct CognitoCredentialProvider {
    region: String,
    identity_pool_id: String,
    client: OnceCell<CognitoClient>,
    identity_id: OnceCell<String>,
}

impl CognitoCredentialProvider {
    pub fn new(region: impl Into<String>, identity_pool_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            identity_pool_id: identity_pool_id.into(),
            client: OnceCell::new(),
            identity_id: OnceCell::new(),
        }
    }

    pub fn identity_pool_id(&self) -> &str {
        &self.identity_pool_id
    }

    async fn client(&self) -> &CognitoClient {
        self.client
            .get_or_init(|| async {
                let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()))
                    .no_credentials()
                    .load()
                    .await;
                CognitoClient::new(&sdk_config)
            })
            .await
    }

    /// Resolve (once) the anonymous identity id for the pool.
    async fn resolve_identity(&self) -> IdentityResult<&str> {
        let id = self
            .identity_id
            .get_or_try_init(|| async {
                let output = self
                    .client()
                    .await
                    .get_id()
                    .identity_pool_id(&self.identity_pool_id)
                    .send()
                    .await
                    .map_err(|e| IdentityError::Resolution(DisplayErrorContext(&e).to_string()))?;

                let identity_id = output.identity_id().ok_or_else(|| {
                    IdentityError::Resolution("GetId response has no identity id".into())
                })?;

                tracing::info!(
                    identity_pool_id = %self.identity_pool_id,
                    identity_id = %identity_id,
                    "resolved cognito identity"
                );
                Ok::<_, IdentityError>(identity_id.to_string())
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl CredentialProvider for CognitoCredentialProvider {
    async fn fetch(&self) -> IdentityResult<Credentials> {
        let identity_id = self.resolve_identity().await?;

        let output = self
            .client()
            .await
            .get_credentials_for_identity()
            .identity_id(identity_id)
            .send()
            .await
            .map_err(|e| IdentityError::Exchange(DisplayErrorContext(&e).to_string()))?;

        let credentials = from_sdk_credentials(output.credentials())?;
        tracing::debug!(
            identity_id = %identity_id,
            expiration = ?credentials.expiration,
            "exchanged identity for temporary credentials"
        );
        Ok(credentials)
    }
}

/// Validate and convert the SDK's credential shape.
///
/// Every field of the SDK type is optional; a response missing any part of
/// the triple is treated as a malformed exchange.
fn from_sdk_credentials(sdk: Option<&SdkCredentials>) -> IdentityResult<Credentials> {
    let sdk = sdk.ok_or_else(|| IdentityError::Exchange("response has no credentials".into()))?;

    let credentials = Credentials::new(
        required(sdk.access_key_id(), "access key id")?,
        required(sdk.secret_key(), "secret key")?,
        required(sdk.session_token(), "session token")?,
    );
    let expiration = sdk
        .expiration()
        .and_then(|exp| chrono::DateTime::from_timestamp(exp.secs(), exp.subsec_nanos()));
    Ok(match expiration {
        Some(expiration) => credentials.with_expiration(expiration),
        None => credentials,
    })
}

fn required(value: Option<&str>, name: &str) -> IdentityResult<String> {
    value
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| IdentityError::Exchange(format!("response is missing {name}")))
}
