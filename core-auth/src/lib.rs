//! # Authentication Module
//!
//! OAuth 2.0 credentials for Drive identities.
//!
//! ## Overview
//!
//! - [`OAuthFlowManager`]: installed-app flow with PKCE (auth URL, code
//!   exchange) and access-token refresh
//! - [`CredentialProvider`]: capability trait producing a bearer
//!   [`Credential`] for an [`Identity`] or for the single user token
//! - [`FileCredentialProvider`]: credential files on disk. Authorized-user
//!   tokens are refreshed when stale and written back; service-account keys
//!   go through [`ServiceAccountAuthenticator`]
//! - [`CredentialFile`]: the two file layouts, told apart by `"type"`
//! - [`load_identities`]: the identity pool of an accounts directory

pub mod error;
pub mod oauth;
pub mod provider;
pub mod service_account;
pub mod types;

pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use provider::{load_identities, CredentialProvider, FileCredentialProvider};
pub use service_account::ServiceAccountAuthenticator;
pub use types::{
    AuthorizedUserToken, Credential, CredentialFile, Identity, OAuthTokens, ServiceAccountKey,
};
