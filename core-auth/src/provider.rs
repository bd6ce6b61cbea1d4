//! Credential providers.
//!
//! A [`CredentialProvider`] turns an identity into a bearer [`Credential`].
//! [`FileCredentialProvider`] backs identities with credential files of two
//! layouts. Authorized-user token files keep their cached access token while
//! it is fresh, otherwise the refresh token is exchanged through
//! [`OAuthFlowManager`] and the new token is written back to the same file.
//! Service-account keys sign a JWT bearer grant; their access tokens are kept
//! in memory only.

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager};
use crate::service_account::ServiceAccountAuthenticator;
use crate::types::{
    AuthorizedUserToken, Credential, CredentialFile, Identity, OAuthTokens, ServiceAccountKey,
};
use async_trait::async_trait;
use bridge_traits::{FileSystemAccess, HttpClient};
use bytes::Bytes;
use chrono::Utc;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Source of bearer credentials.
///
/// `identity` selects one identity of a pool; `None` asks for the
/// single user credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(
        &self,
        scopes: &[String],
        identity: Option<&Identity>,
    ) -> Result<Credential>;
}

/// Load the identities stored in `dir`: every `*.json` file, sorted by file name.
pub async fn load_identities(
    file_system: &dyn FileSystemAccess,
    dir: &Path,
) -> Result<Vec<Identity>> {
    let entries = file_system.list_directory(dir).await.map_err(|e| {
        AuthError::CredentialsUnavailable(format!(
            "Cannot read accounts directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut files: Vec<PathBuf> = entries
        .into_iter()
        .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.is_empty() {
        return Err(AuthError::CredentialsUnavailable(format!(
            "No identity files (*.json) found in {}",
            dir.display()
        )));
    }

    debug!(dir = ?dir, count = files.len(), "Loaded identities");
    Ok(files.into_iter().map(Identity::from_path).collect())
}

/// Credential provider backed by token files on disk.
pub struct FileCredentialProvider {
    http_client: Arc<dyn HttpClient>,
    file_system: Arc<dyn FileSystemAccess>,
    token_path: Option<PathBuf>,
    event_bus: Option<EventBus>,
    refresh_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    service_tokens: Mutex<HashMap<PathBuf, OAuthTokens>>,
}

impl FileCredentialProvider {
    /// `token_path` is the single user token used when no identity is requested.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn FileSystemAccess>,
        token_path: Option<PathBuf>,
    ) -> Self {
        Self {
            http_client,
            file_system,
            token_path,
            event_bus: None,
            refresh_locks: Mutex::new(HashMap::new()),
            service_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Emit `CoreEvent::Auth` events on refresh and failure.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Auth(event));
        }
    }

    async fn read_credential_file(&self, path: &Path) -> Result<CredentialFile> {
        let data = self.file_system.read_file(path).await.map_err(|e| {
            AuthError::CredentialsUnavailable(format!("Cannot read {}: {}", path.display(), e))
        })?;

        CredentialFile::from_slice(&data).map_err(|e| AuthError::InvalidCredentialFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    async fn persist_token(&self, path: &Path, token: &AuthorizedUserToken) {
        let data = match serde_json::to_vec_pretty(token) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Failed to serialize refreshed token");
                return;
            }
        };

        if let Err(e) = self.file_system.write_file(path, Bytes::from(data)).await {
            warn!(path = ?path, error = %e, "Failed to persist refreshed token");
        }
    }

    async fn refresh_lock(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    #[instrument(skip(self, scopes), fields(identity = identity.map(Identity::name).unwrap_or("user")))]
    async fn get_credentials(
        &self,
        scopes: &[String],
        identity: Option<&Identity>,
    ) -> Result<Credential> {
        let path = match (identity, &self.token_path) {
            (Some(identity), _) => identity.path().to_path_buf(),
            (None, Some(path)) => path.clone(),
            (None, None) => {
                return Err(AuthError::CredentialsUnavailable(
                    "No identity requested and no token file configured".to_string(),
                ))
            }
        };
        let identity_name = identity
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "user".to_string());

        let lock = self.refresh_lock(&path).await;
        let _guard = lock.lock().await;

        match self.read_credential_file(&path).await? {
            CredentialFile::AuthorizedUser(token) => {
                self.authorized_user_credential(&path, token, scopes, identity, identity_name)
                    .await
            }
            CredentialFile::ServiceAccount(key) => {
                self.service_account_credential(&path, key, scopes, identity, identity_name)
                    .await
            }
        }
    }
}

impl FileCredentialProvider {
    async fn authorized_user_credential(
        &self,
        path: &Path,
        mut token: AuthorizedUserToken,
        scopes: &[String],
        identity: Option<&Identity>,
        identity_name: String,
    ) -> Result<Credential> {
        if let Some((access_token, expires_at)) = token.usable_token(Utc::now()) {
            debug!("Cached access token is still valid");
            return Ok(Credential {
                access_token: access_token.to_string(),
                expires_at,
                identity: identity.cloned(),
            });
        }

        info!("Access token expired or missing, refreshing");
        self.emit(AuthEvent::TokenRefreshing {
            identity: identity_name.clone(),
        });

        let manager = OAuthFlowManager::new(
            OAuthConfig::from_token_file(&token, scopes),
            self.http_client.clone(),
        );

        let tokens = match manager.refresh_access_token(&token.refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.emit(AuthEvent::AuthError {
                    identity: Some(identity_name),
                    message: format!("Token refresh failed: {}", e),
                    recoverable: false,
                });
                return Err(e);
            }
        };

        token.apply(&tokens);
        self.persist_token(path, &token).await;

        self.emit(AuthEvent::TokenRefreshed {
            identity: identity_name,
            expires_at: tokens.expires_at.timestamp(),
        });

        Ok(Credential {
            access_token: tokens.access_token,
            expires_at: tokens.expires_at,
            identity: identity.cloned(),
        })
    }

    async fn service_account_credential(
        &self,
        path: &Path,
        key: ServiceAccountKey,
        scopes: &[String],
        identity: Option<&Identity>,
        identity_name: String,
    ) -> Result<Credential> {
        if let Some(tokens) = self.service_tokens.lock().await.get(path) {
            if !tokens.is_expired() {
                debug!("Cached service-account token is still valid");
                return Ok(Credential {
                    access_token: tokens.access_token.clone(),
                    expires_at: tokens.expires_at,
                    identity: identity.cloned(),
                });
            }
        }

        info!(client_email = %key.client_email, "Requesting service-account token");
        self.emit(AuthEvent::TokenRefreshing {
            identity: identity_name.clone(),
        });

        let authenticator = ServiceAccountAuthenticator::new(key, self.http_client.clone());
        let tokens = match authenticator.fetch_token(scopes).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.emit(AuthEvent::AuthError {
                    identity: Some(identity_name),
                    message: format!("Service-account grant failed: {}", e),
                    recoverable: false,
                });
                return Err(e);
            }
        };

        self.emit(AuthEvent::TokenRefreshed {
            identity: identity_name,
            expires_at: tokens.expires_at.timestamp(),
        });

        let credential = Credential {
            access_token: tokens.access_token.clone(),
            expires_at: tokens.expires_at,
            identity: identity.cloned(),
        };
        self.service_tokens
            .lock()
            .await
            .insert(path.to_path_buf(), tokens);

        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use mockall::mock;
    use tempfile::tempdir;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn token_json(access: Option<&str>, expiry: &str) -> String {
        let access = access
            .map(|a| format!(r#""token": "{}","#, a))
            .unwrap_or_default();
        format!(
            r#"{{{} "refresh_token": "1//r", "client_id": "cid", "client_secret": "cs", "expiry": "{}"}}"#,
            access, expiry
        )
    }

    fn refresh_ok() -> MockHttpClient {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(r#"{"access_token":"ya29.refreshed","expires_in":3600}"#),
            })
        });
        http
    }

    #[tokio::test]
    async fn test_load_identities_sorted_json_only() {
        let dir = tempdir().unwrap();
        for name in ["b.json", "a.json", "notes.txt", "c.json"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }

        let identities = load_identities(&TokioFileSystem::new(), dir.path())
            .await
            .unwrap();
        let names: Vec<_> = identities.iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_load_identities_empty_dir() {
        let dir = tempdir().unwrap();
        let result = load_identities(&TokioFileSystem::new(), dir.path()).await;
        assert!(matches!(result, Err(AuthError::CredentialsUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cached_token_is_used_without_refresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("01.json");
        std::fs::write(&path, token_json(Some("ya29.cached"), "2099-01-01T00:00:00Z")).unwrap();

        let provider = FileCredentialProvider::new(
            Arc::new(MockHttpClient::new()),
            Arc::new(TokioFileSystem::new()),
            None,
        );
        let identity = Identity::from_path(&path);

        let credential = provider
            .get_credentials(&["scope".to_string()], Some(&identity))
            .await
            .unwrap();
        assert_eq!(credential.access_token, "ya29.cached");
        assert_eq!(credential.identity_name(), "01");
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, token_json(Some("ya29.old"), "2000-01-01T00:00:00Z")).unwrap();

        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let provider = FileCredentialProvider::new(
            Arc::new(refresh_ok()),
            Arc::new(TokioFileSystem::new()),
            Some(path.clone()),
        )
        .with_event_bus(bus);

        let credential = provider
            .get_credentials(&["scope".to_string()], None)
            .await
            .unwrap();
        assert_eq!(credential.access_token, "ya29.refreshed");
        assert!(credential.identity.is_none());

        let stored: AuthorizedUserToken =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(stored.token.as_deref(), Some("ya29.refreshed"));
        assert_eq!(stored.refresh_token, "1//r");

        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshing { .. })
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Auth(AuthEvent::TokenRefreshed { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let provider = FileCredentialProvider::new(
            Arc::new(MockHttpClient::new()),
            Arc::new(TokioFileSystem::new()),
            None,
        );
        let result = provider.get_credentials(&[], None).await;
        assert!(matches!(result, Err(AuthError::CredentialsUnavailable(_))));
    }

    #[tokio::test]
    async fn test_service_account_identity_uses_jwt_grant_and_caches() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sa-01.json");
        let key = serde_json::json!({
            "type": "service_account",
            "project_id": "drive-transfer",
            "private_key_id": "key-1",
            "private_key": crate::service_account::tests::TEST_PRIVATE_KEY,
            "client_email": "sa-01@drive-transfer.iam.gserviceaccount.com",
            "token_uri": "https://oauth2.googleapis.com/token",
        });
        std::fs::write(&path, serde_json::to_vec(&key).unwrap()).unwrap();
        let original = std::fs::read(&path).unwrap();

        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body = request
                    .body
                    .as_ref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                request.url == "https://oauth2.googleapis.com/token"
                    && body.contains("grant-type%3Ajwt-bearer")
                    && body.contains("assertion=")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from(r#"{"access_token":"ya29.sa","expires_in":3600}"#),
                })
            });

        let provider = FileCredentialProvider::new(
            Arc::new(http),
            Arc::new(TokioFileSystem::new()),
            None,
        );
        let identity = Identity::from_path(&path);
        let scopes = vec!["https://www.googleapis.com/auth/drive".to_string()];

        let first = provider
            .get_credentials(&scopes, Some(&identity))
            .await
            .unwrap();
        let second = provider
            .get_credentials(&scopes, Some(&identity))
            .await
            .unwrap();

        assert_eq!(first.access_token, "ya29.sa");
        assert_eq!(second.access_token, "ya29.sa");
        assert_eq!(first.identity_name(), "sa-01");
        // key files are never rewritten
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_malformed_token_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();

        let provider = FileCredentialProvider::new(
            Arc::new(MockHttpClient::new()),
            Arc::new(TokioFileSystem::new()),
            Some(path),
        );
        let result = provider.get_credentials(&[], None).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentialFile { .. })));
    }
}
