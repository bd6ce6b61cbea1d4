//! # Transfer Configuration
//!
//! Provides configuration management for the transfer engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `TransferConfig` holding every capability and setting a transfer job needs.
//! Validation is fail-fast: `build()` rejects out-of-range values and missing
//! capabilities with actionable messages before any network call is made.
//!
//! ## Credentials
//!
//! At least one credential source is required:
//!
//! - `accounts_dir` - directory of identity files; enables identity rotation
//! - `token_path` - single authorized-user token file
//!
//! ## Capabilities (with desktop defaults)
//!
//! - `HttpClient` - HTTP operations (desktop default: reqwest)
//! - `FileSystemAccess` - File I/O (desktop default: tokio fs)
//!
//! When the `desktop-shims` feature is enabled the defaults are injected
//! automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::TransferConfig;
//!
//! let config = TransferConfig::builder()
//!     .download_dir("/srv/downloads")
//!     .parent_id("0AbCdEfGhIjK")
//!     .accounts_dir("/etc/drive/accounts")
//!     .team_drive(true)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{FileSystemAccess, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;

/// Default size of one upload/download chunk: 50 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Default and maximum folder listing page size.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Full Drive access scope.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Alias the Drive API accepts for the root of "My Drive".
pub const ROOT_FOLDER_ID: &str = "root";

/// Settings and capabilities for transfer jobs.
///
/// Use [`TransferConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct TransferConfig {
    /// Local directory downloads are written below
    pub download_dir: PathBuf,

    /// Remote folder uploads and clones are placed in
    pub parent_id: String,

    /// Directory of identity files; `Some` enables identity rotation
    pub accounts_dir: Option<PathBuf>,

    /// Single authorized-user token file, used when no accounts directory is set
    pub token_path: Option<PathBuf>,

    /// OAuth scopes requested for every identity
    pub scopes: Vec<String>,

    /// Bytes per upload chunk / download range
    pub chunk_size: u64,

    /// Children requested per folder listing page (1..=1000)
    pub page_size: u32,

    /// Destination is a shared drive; uploaded files are not made public
    pub team_drive: bool,

    /// Reuse a same-named remote file instead of creating a duplicate
    pub stop_duplicate: bool,

    /// Delete the partially cloned/uploaded root when a job is cancelled
    pub cleanup_on_cancel: bool,

    /// Description attached to uploaded files
    pub upload_description: Option<String>,

    pub http_client: Arc<dyn HttpClient>,

    pub file_system: Arc<dyn FileSystemAccess>,
}

impl std::fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferConfig")
            .field("download_dir", &self.download_dir)
            .field("parent_id", &self.parent_id)
            .field("accounts_dir", &self.accounts_dir)
            .field("token_path", &self.token_path)
            .field("scopes", &self.scopes)
            .field("chunk_size", &self.chunk_size)
            .field("page_size", &self.page_size)
            .field("team_drive", &self.team_drive)
            .field("stop_duplicate", &self.stop_duplicate)
            .field("cleanup_on_cancel", &self.cleanup_on_cancel)
            .field("upload_description", &self.upload_description)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .finish()
    }
}

impl TransferConfig {
    pub fn builder() -> TransferConfigBuilder {
        TransferConfigBuilder::default()
    }

    /// Whether throttled jobs can switch to another identity.
    pub fn uses_identity_pool(&self) -> bool {
        self.accounts_dir.is_some()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Download directory and parent id are not empty
    /// - A credential source is configured
    /// - Chunk size is greater than zero
    /// - Page size is within 1..=1000
    pub fn validate(&self) -> Result<()> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Download directory cannot be empty".to_string(),
            ));
        }

        if self.parent_id.trim().is_empty() {
            return Err(Error::Config("Parent folder id cannot be empty".to_string()));
        }

        if self.accounts_dir.is_none() && self.token_path.is_none() {
            return Err(Error::Config(
                "No credential source configured. Use .accounts_dir() for an identity pool \
                 or .token_path() for a single token file."
                    .to_string(),
            ));
        }

        if self.scopes.is_empty() {
            return Err(Error::InvalidSetting {
                setting: "scopes".to_string(),
                reason: "at least one OAuth scope is required".to_string(),
            });
        }

        if self.chunk_size == 0 {
            return Err(Error::InvalidSetting {
                setting: "chunk_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidSetting {
                setting: "page_size".to_string(),
                reason: format!("must be between 1 and {}", MAX_PAGE_SIZE),
            });
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the Drive API. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Otherwise inject an implementation with .http_client()."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for local reads and writes. \
                 Desktop: enable the 'desktop-shims' feature to use TokioFileSystem. \
                 Otherwise inject an implementation with .file_system()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

/// Builder for constructing [`TransferConfig`] instances.
#[derive(Default)]
pub struct TransferConfigBuilder {
    download_dir: Option<PathBuf>,
    parent_id: Option<String>,
    accounts_dir: Option<PathBuf>,
    token_path: Option<PathBuf>,
    scopes: Option<Vec<String>>,
    chunk_size: Option<u64>,
    page_size: Option<u32>,
    team_drive: bool,
    stop_duplicate: Option<bool>,
    cleanup_on_cancel: bool,
    upload_description: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
}

impl TransferConfigBuilder {
    /// Sets the local directory downloads are written below (required).
    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    /// Sets the remote destination folder for uploads and clones.
    ///
    /// Default: `root`
    pub fn parent_id(mut self, id: impl Into<String>) -> Self {
        self.parent_id = Some(id.into());
        self
    }

    /// Sets the directory of identity files and enables rotation on throttling.
    pub fn accounts_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.accounts_dir = Some(path.into());
        self
    }

    /// Sets the single authorized-user token file.
    pub fn token_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.token_path = Some(path.into());
        self
    }

    /// Replaces the requested OAuth scopes.
    ///
    /// Default: full Drive scope
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the chunk size in bytes.
    ///
    /// Default: 50 MiB
    pub fn chunk_size(mut self, bytes: u64) -> Self {
        self.chunk_size = Some(bytes);
        self
    }

    /// Sets the folder listing page size.
    ///
    /// Default: 1000
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Default: false
    pub fn team_drive(mut self, enabled: bool) -> Self {
        self.team_drive = enabled;
        self
    }

    /// Default: true
    pub fn stop_duplicate(mut self, enabled: bool) -> Self {
        self.stop_duplicate = Some(enabled);
        self
    }

    /// Default: false
    pub fn cleanup_on_cancel(mut self, enabled: bool) -> Self {
        self.cleanup_on_cancel = enabled;
        self
    }

    pub fn upload_description(mut self, description: impl Into<String>) -> Self {
        self.upload_description = Some(description.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the tokio-based implementation is used when the
    /// `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Builds the final `TransferConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns an error if:
    /// - The download directory is missing
    /// - No credential source is configured
    /// - A capability is missing and no desktop default is available
    /// - Chunk or page size is out of range
    pub fn build(self) -> Result<TransferConfig> {
        let download_dir = self.download_dir.ok_or_else(|| {
            Error::Config(
                "Download directory is required. Use .download_dir() to set it.".to_string(),
            )
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let config = TransferConfig {
            download_dir,
            parent_id: self
                .parent_id
                .unwrap_or_else(|| ROOT_FOLDER_ID.to_string()),
            accounts_dir: self.accounts_dir,
            token_path: self.token_path,
            scopes: self
                .scopes
                .unwrap_or_else(|| vec![DRIVE_SCOPE.to_string()]),
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            team_drive: self.team_drive,
            stop_duplicate: self.stop_duplicate.unwrap_or(true),
            cleanup_on_cancel: self.cleanup_on_cancel,
            upload_description: self.upload_description,
            http_client,
            file_system,
        };

        config.validate()?;

        Ok(config)
    }
}
