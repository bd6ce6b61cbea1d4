//! Google Drive API connector implementation
//!
//! Implements the `RemoteStore` trait for Google Drive API v3.

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::storage::{
    ChunkOutcome, NewFile, RemoteNode, RemotePage, RemoteStore, RemoteStoreFactory, StorageQuota,
    UploadSession, UploadTarget, FOLDER_MIME_TYPE,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::types::{
    AboutResponse, DriveFile, FileMetadataRequest, FilesListResponse, PermissionRequest,
};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Media upload base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType,size,shortcutDetails";

/// Attempts for idempotent (GET) requests
const MAX_RETRIES: u32 = 3;

/// HTTP status the resumable protocol uses for "chunk accepted, send more"
const RESUME_INCOMPLETE: u16 = 308;

/// Google Drive API connector
///
/// Implements `RemoteStore` for Google Drive API v3, bound to one access token.
///
/// # Features
///
/// - Shared-drive aware listing and lookups (`supportsAllDrives`)
/// - Resumable uploads with `Content-Range` chunking and status queries
/// - Ranged media downloads and native document export
/// - Exponential backoff for transient failures of idempotent requests
/// - Error bodies decoded into reason codes (`userRateLimitExceeded`, `notFound`, ...)
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use bridge_traits::storage::RemoteStore;
///
/// let connector = GoogleDriveConnector::new(http_client, access_token);
/// let page = connector.list_children("root", None, 1000).await?;
/// ```
pub struct GoogleDriveConnector {
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token
    access_token: String,
}

impl GoogleDriveConnector {
    /// Create a new Google Drive connector
    ///
    /// `access_token` must carry a Drive scope.
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
        }
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(self.access_token.as_str())
            .header("Accept", "application/json")
    }

    /// Quote a value for use inside a `q` search expression.
    fn escape_query_value(value: &str) -> String {
        value.replace('\\', "\\\\").replace('\'', "\\'")
    }

    fn parse_file(response: &HttpResponse) -> Result<RemoteNode> {
        let drive_file: DriveFile = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse file resource: {}", e))
        })?;
        Ok(drive_file.into_node())
    }

    /// Next offset reported by a 308 `Range: bytes=0-N` header; no header means nothing committed.
    fn committed_offset(response: &HttpResponse) -> Result<u64> {
        match response.header("Range") {
            None => Ok(0),
            Some(range) => range
                .trim_start_matches("bytes=")
                .split('-')
                .nth(1)
                .and_then(|end| end.trim().parse::<u64>().ok())
                .map(|end| end + 1)
                .ok_or_else(|| {
                    GoogleDriveError::InvalidUploadResponse(format!(
                        "malformed Range header '{}'",
                        range
                    ))
                    .into()
                }),
        }
    }

    fn chunk_outcome(response: HttpResponse) -> Result<ChunkOutcome> {
        match response.status {
            200 | 201 => Ok(ChunkOutcome::Complete(Self::parse_file(&response)?)),
            RESUME_INCOMPLETE => Ok(ChunkOutcome::Incomplete {
                next_offset: Self::committed_offset(&response)?,
            }),
            status => Err(GoogleDriveError::from_response(status, &response.body).into()),
        }
    }

    /// Send a request once; non-2xx statuses become decoded errors.
    async fn execute_once(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;

        if response.is_success() {
            Ok(response)
        } else {
            warn!(status = response.status, "API request failed");
            Err(GoogleDriveError::from_response(response.status, &response.body).into())
        }
    }

    /// Execute an idempotent request with retry logic
    ///
    /// Transport failures and 5xx statuses are retried with exponential
    /// backoff. Quota and rate-limit answers are returned to the caller
    /// untouched so it can switch identity.
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            match self
                .http_client
                .execute_with_retry(request.clone(), RetryPolicy::no_retry())
                .await
            {
                Ok(response) => {
                    let status = response.status;

                    if response.is_success() {
                        debug!(status, "API request succeeded");
                        return Ok(response);
                    } else if response.is_server_error() {
                        attempt += 1;
                        if attempt >= MAX_RETRIES {
                            warn!(status, attempts = attempt, "API request failed after retries");
                            return Err(
                                GoogleDriveError::from_response(status, &response.body).into()
                            );
                        }

                        let backoff_ms = 100u64 * 2u64.pow(attempt);
                        warn!(
                            "API request failed (attempt {}/{}): status={}, retrying in {}ms",
                            attempt, MAX_RETRIES, status, backoff_ms
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    } else {
                        warn!(status, "API request failed");
                        return Err(GoogleDriveError::from_response(status, &response.body).into());
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES {
                        warn!("API request failed after {} attempts: {}", MAX_RETRIES, e);
                        return Err(e);
                    }

                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        "API request failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt, MAX_RETRIES, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn create(&self, metadata: FileMetadataRequest) -> Result<RemoteNode> {
        let url = format!(
            "{}/files?supportsAllDrives=true&fields={}",
            DRIVE_API_BASE, FILE_FIELDS
        );
        let request = self.request(HttpMethod::Post, url).json(&metadata)?;
        let response = self.execute_once(request).await?;
        Self::parse_file(&response)
    }
}

#[async_trait]
impl RemoteStore for GoogleDriveConnector {
    #[instrument(skip(self))]
    async fn get_node(&self, id: &str) -> Result<RemoteNode> {
        debug!("Getting metadata");

        let url = format!(
            "{}/files/{}?supportsAllDrives=true&fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(id),
            FILE_FIELDS
        );

        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, url))
            .await?;
        Self::parse_file(&response)
    }

    #[instrument(skip(self, page_token))]
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RemotePage> {
        let query = format!(
            "'{}' in parents and trashed=false",
            Self::escape_query_value(folder_id)
        );

        let mut url = format!(
            "{}/files?q={}&pageSize={}&supportsAllDrives=true&includeItemsFromAllDrives=true&orderBy=folder,name&fields=nextPageToken,files({})",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            page_size,
            FILE_FIELDS
        );

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, url))
            .await?;

        let list: FilesListResponse = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse files list response: {}", e))
        })?;

        let nodes: Vec<RemoteNode> = list.files.into_iter().map(DriveFile::into_node).collect();
        debug!(count = nodes.len(), more = list.next_page_token.is_some(), "Listed children");

        Ok(RemotePage {
            nodes,
            next_page_token: list.next_page_token,
        })
    }

    #[instrument(skip(self))]
    async fn find_child(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
    ) -> Result<Option<RemoteNode>> {
        let query = format!(
            "name='{}' and mimeType='{}' and '{}' in parents and trashed=false",
            Self::escape_query_value(name),
            Self::escape_query_value(mime_type),
            Self::escape_query_value(parent_id)
        );

        let url = format!(
            "{}/files?q={}&pageSize=1&supportsAllDrives=true&includeItemsFromAllDrives=true&fields=files({})",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            FILE_FIELDS
        );

        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, url))
            .await?;

        let list: FilesListResponse = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse files list response: {}", e))
        })?;

        Ok(list.files.into_iter().next().map(DriveFile::into_node))
    }

    #[instrument(skip(self))]
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteNode> {
        let node = self
            .create(FileMetadataRequest {
                name: Some(name.to_string()),
                mime_type: Some(FOLDER_MIME_TYPE.to_string()),
                parents: vec![parent_id.to_string()],
                description: None,
            })
            .await?;

        info!(folder_id = node.id(), "Created folder");
        Ok(node)
    }

    #[instrument(skip(self, file), fields(name = %file.name))]
    async fn create_file(&self, file: &NewFile) -> Result<RemoteNode> {
        self.create(FileMetadataRequest {
            name: Some(file.name.clone()),
            mime_type: Some(file.mime_type.clone()),
            parents: vec![file.parent_id.clone()],
            description: file.description.clone(),
        })
        .await
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn replace_content(
        &self,
        file_id: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<RemoteNode> {
        let url = format!(
            "{}/files/{}?uploadType=media&supportsAllDrives=true&fields={}",
            DRIVE_UPLOAD_BASE,
            urlencoding::encode(file_id),
            FILE_FIELDS
        );

        let request = self
            .request(HttpMethod::Patch, url)
            .header("Content-Type", mime_type)
            .body(data);
        let response = self.execute_once(request).await?;
        Self::parse_file(&response)
    }

    #[instrument(skip(self, target))]
    async fn start_upload(&self, target: &UploadTarget, total_size: u64) -> Result<UploadSession> {
        let (method, url, metadata, mime_type) = match target {
            UploadTarget::Create(file) => (
                HttpMethod::Post,
                format!(
                    "{}/files?uploadType=resumable&supportsAllDrives=true&fields={}",
                    DRIVE_UPLOAD_BASE, FILE_FIELDS
                ),
                FileMetadataRequest {
                    name: Some(file.name.clone()),
                    mime_type: Some(file.mime_type.clone()),
                    parents: vec![file.parent_id.clone()],
                    description: file.description.clone(),
                },
                file.mime_type.as_str(),
            ),
            UploadTarget::Replace { file_id, mime_type } => (
                HttpMethod::Patch,
                format!(
                    "{}/files/{}?uploadType=resumable&supportsAllDrives=true&fields={}",
                    DRIVE_UPLOAD_BASE,
                    urlencoding::encode(file_id),
                    FILE_FIELDS
                ),
                FileMetadataRequest::default(),
                mime_type.as_str(),
            ),
        };

        let request = self
            .request(method, url)
            .json(&metadata)?
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", total_size.to_string());

        let response = self.execute_once(request).await?;
        let uri = response.header("Location").ok_or_else(|| {
            GoogleDriveError::InvalidUploadResponse(
                "resumable session response has no Location header".to_string(),
            )
        })?;

        debug!(total_size, "Opened resumable upload session");
        Ok(UploadSession {
            uri: uri.to_string(),
            total_size,
        })
    }

    #[instrument(skip(self, session, data), fields(size = data.len()))]
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        data: Bytes,
    ) -> Result<ChunkOutcome> {
        let end = offset + data.len() as u64;
        let content_range = if data.is_empty() {
            format!("bytes */{}", session.total_size)
        } else {
            format!("bytes {}-{}/{}", offset, end - 1, session.total_size)
        };

        let request = self
            .request(HttpMethod::Put, session.uri.clone())
            .header("Content-Range", content_range)
            .body(data);

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        Self::chunk_outcome(response)
    }

    #[instrument(skip(self, session))]
    async fn query_upload(&self, session: &UploadSession) -> Result<ChunkOutcome> {
        let request = self
            .request(HttpMethod::Put, session.uri.clone())
            .header("Content-Range", format!("bytes */{}", session.total_size))
            .body(Bytes::new());

        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await?;
        Self::chunk_outcome(response)
    }

    #[instrument(skip(self))]
    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<Bytes> {
        let url = format!(
            "{}/files/{}?alt=media&supportsAllDrives=true",
            DRIVE_API_BASE,
            urlencoding::encode(file_id)
        );

        let request = self.request(HttpMethod::Get, url).header(
            "Range",
            format!("bytes={}-{}", offset, offset + length.max(1) - 1),
        );

        let response = self.execute_with_retry(request).await?;
        debug!(bytes = response.body.len(), "Downloaded range");
        Ok(response.body)
    }

    #[instrument(skip(self))]
    async fn export(&self, file_id: &str, mime_type: &str) -> Result<Bytes> {
        let url = format!(
            "{}/files/{}/export?mimeType={}",
            DRIVE_API_BASE,
            urlencoding::encode(file_id),
            urlencoding::encode(mime_type)
        );

        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, url))
            .await?;
        info!(bytes = response.body.len(), "Exported document");
        Ok(response.body)
    }

    #[instrument(skip(self))]
    async fn copy(&self, file_id: &str, dest_parent_id: &str) -> Result<RemoteNode> {
        let url = format!(
            "{}/files/{}/copy?supportsAllDrives=true&fields={}",
            DRIVE_API_BASE,
            urlencoding::encode(file_id),
            FILE_FIELDS
        );

        let body = FileMetadataRequest {
            parents: vec![dest_parent_id.to_string()],
            ..Default::default()
        };
        let request = self.request(HttpMethod::Post, url).json(&body)?;
        let response = self.execute_once(request).await?;
        Self::parse_file(&response)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        let url = format!(
            "{}/files/{}?supportsAllDrives=true",
            DRIVE_API_BASE,
            urlencoding::encode(id)
        );

        self.execute_once(self.request(HttpMethod::Delete, url))
            .await?;
        info!("Deleted remote node");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn grant_public_read(&self, id: &str) -> Result<()> {
        let url = format!(
            "{}/files/{}/permissions?supportsAllDrives=true",
            DRIVE_API_BASE,
            urlencoding::encode(id)
        );

        let request = self.request(HttpMethod::Post, url).json(&PermissionRequest {
            role: "reader",
            kind: "anyone",
        })?;
        self.execute_once(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn storage_quota(&self) -> Result<StorageQuota> {
        let url = format!("{}/about?fields=storageQuota", DRIVE_API_BASE);

        let response = self
            .execute_with_retry(self.request(HttpMethod::Get, url))
            .await?;

        let about: AboutResponse = serde_json::from_slice(&response.body).map_err(|e| {
            GoogleDriveError::ParseError(format!("Failed to parse about response: {}", e))
        })?;
        Ok(about.storage_quota.into())
    }
}

/// Builds [`GoogleDriveConnector`]s sharing one HTTP client.
pub struct GoogleDriveStoreFactory {
    http_client: Arc<dyn HttpClient>,
}

impl GoogleDriveStoreFactory {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl RemoteStoreFactory for GoogleDriveStoreFactory {
    async fn connect(&self, access_token: &str) -> Result<Arc<dyn RemoteStore>> {
        Ok(Arc::new(GoogleDriveConnector::new(
            self.http_client.clone(),
            access_token.to_string(),
        )))
    }
}
