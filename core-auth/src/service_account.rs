//! Service-account access tokens (RFC 7523 JWT bearer grant).
//!
//! The key's private key signs a short-lived RS256 assertion naming the
//! requested scopes; the token endpoint answers with an access token. There
//! is no refresh token, a new assertion is signed whenever the cached access
//! token goes stale.

use crate::error::{AuthError, Result};
use crate::oauth::TokenResponse;
use crate::types::{OAuthTokens, ServiceAccountKey};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion; Google rejects anything above one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

const MAX_GRANT_ATTEMPTS: u32 = 3;

/// Claims of the signed assertion.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct ServiceAccountAuthenticator {
    key: ServiceAccountKey,
    http_client: Arc<dyn HttpClient>,
}

impl ServiceAccountAuthenticator {
    pub fn new(key: ServiceAccountKey, http_client: Arc<dyn HttpClient>) -> Self {
        Self { key, http_client }
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Sign an assertion for `scopes`, valid from now for one hour.
    pub fn sign_assertion(&self, scopes: &[String]) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: scopes.join(" "),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| AuthError::InvalidCredentialFile {
                path: self.key.client_email.clone(),
                reason: format!("unusable private key: {}", e),
            })?;

        encode(&header, &claims, &signing_key)
            .map_err(|e| AuthError::Other(format!("Failed to sign assertion: {}", e)))
    }

    /// Exchange a freshly signed assertion for an access token.
    ///
    /// 4xx answers fail immediately; 5xx answers are retried with
    /// exponential backoff.
    #[instrument(skip(self, scopes), fields(client_email = %self.key.client_email))]
    pub async fn fetch_token(&self, scopes: &[String]) -> Result<OAuthTokens> {
        let assertion = self.sign_assertion(scopes)?;
        let body = serde_urlencoded::to_string([
            ("grant_type", JWT_BEARER_GRANT_TYPE),
            ("assertion", assertion.as_str()),
        ])
        .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        let request = HttpRequest::new(HttpMethod::Post, self.key.token_uri.clone())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Bytes::from(body));

        debug!("Requesting service-account access token");
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .http_client
                .execute(request.clone())
                .await
                .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

            if response.is_success() {
                let token: TokenResponse = response.json().map_err(|e| {
                    AuthError::Other(format!("Failed to parse token response: {}", e))
                })?;
                info!(expires_in = token.expires_in, "Obtained service-account token");
                return Ok(OAuthTokens::new(token.access_token, None, token.expires_in));
            }

            let status = response.status;
            let error_body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            if (400..500).contains(&status) {
                warn!(status, error = %error_body, "JWT grant rejected");
                return Err(AuthError::AuthenticationFailed {
                    identity: self.key.client_email.clone(),
                    reason: format!("Token endpoint returned {}: {}", status, error_body),
                });
            }

            if attempts >= MAX_GRANT_ATTEMPTS {
                return Err(AuthError::TokenRefreshFailed(format!(
                    "JWT grant failed after {} attempts. Last error: {} - {}",
                    attempts, status, error_body
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(status, attempts, "JWT grant failed, retrying");
            sleep(delay).await;
        }
    }
}
