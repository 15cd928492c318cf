//! Identity-pool credential exchange.
//!
//! Turns an anonymous identity-pool membership into temporary signing
//! credentials:
//! - `CredentialProvider` trait (mockable in tests)
//! - `CognitoCredentialProvider` backed by the AWS Cognito Identity API
//! - `MockCredentialProvider` for testing without AWS

pub mod cognito;
pub mod error;
pub mod mock;
pub mod provider;

pub use cognito::CognitoCredentialProvider;
pub use error::{IdentityError, IdentityResult};
pub use mock::MockCredentialProvider;
pub use provider::CredentialProvider;
