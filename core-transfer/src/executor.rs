//! # Chunked Executor
//!
//! Moves one file at a time: resumable chunked uploads, ranged downloads,
//! document exports and server-side copies.
//!
//! Every remote call goes through [`ChunkedExecutor::with_rotation`], which
//! checks the job's cancellation token, runs the call against the session's
//! current store and, when the store reports a rate or quota limit, rotates
//! the identity and retries the same unit of work. A throttled resumable
//! upload is not restarted: after rotating, the executor asks the store how
//! much of the session it already committed and continues from there.

use crate::export::{export_target, ExportTarget};
use crate::job::{FileTransferState, TransferStats};
use crate::link::download_link;
use crate::naming::sanitize_name;
use crate::progress::{ProgressSink, ProgressSnapshot};
use crate::session::DriveSession;
use crate::{Result, TransferError};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    BridgeError, ChunkOutcome, FileSystemAccess, NewFile, RemoteNode, RemoteStore, UploadSession,
    UploadTarget,
};
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Settings that shape single-file transfers.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub chunk_size: u64,
    /// Update a same-named file in place instead of creating a duplicate
    pub stop_duplicate: bool,
    /// Destination is a shared drive; uploads are not made public
    pub team_drive: bool,
    pub upload_description: Option<String>,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            chunk_size: core_runtime::config::DEFAULT_CHUNK_SIZE,
            stop_duplicate: true,
            team_drive: false,
            upload_description: None,
        }
    }
}

/// A file that finished uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Downloaded { path: PathBuf, bytes: u64 },
    /// The remote file vanished; its id was recorded as failed.
    Skipped { id: String },
}

pub struct ChunkedExecutor {
    session: DriveSession,
    file_system: Arc<dyn FileSystemAccess>,
    options: ExecutorOptions,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressSink>,
    state: FileTransferState,
}

impl ChunkedExecutor {
    pub fn new(
        session: DriveSession,
        file_system: Arc<dyn FileSystemAccess>,
        options: ExecutorOptions,
        cancel: CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            session,
            file_system,
            options,
            cancel,
            progress,
            state: FileTransferState::Completed,
        }
    }

    pub fn session_mut(&mut self) -> &mut DriveSession {
        &mut self.session
    }

    pub fn file_system(&self) -> &Arc<dyn FileSystemAccess> {
        &self.file_system
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// State of the file most recently started.
    pub fn state(&self) -> FileTransferState {
        self.state
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }

    /// Run `op` against the current store, rotating identities while it is throttled.
    pub async fn with_rotation<T, F, Fut>(&mut self, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = BridgeResult<T>>,
    {
        loop {
            self.check_cancelled()?;
            match op(self.session.store()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_throttled() => {
                    let reason = e.reason().unwrap_or("throttled").to_string();
                    self.rotate(&reason).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn rotate(&mut self, reason: &str) -> Result<()> {
        let file_in_flight = self.state == FileTransferState::InProgress;
        if file_in_flight {
            self.state = self.state.transition(FileTransferState::Throttled)?;
        }
        self.session.rotate(reason).await?;
        if file_in_flight {
            self.state = self.state.transition(FileTransferState::InProgress)?;
        }
        Ok(())
    }

    fn begin_file(&mut self) -> Result<()> {
        self.state = FileTransferState::Pending.transition(FileTransferState::InProgress)?;
        Ok(())
    }

    /// Close the current file after a failure and decide whether the job goes on.
    ///
    /// Anything but cancellation cancels the whole job.
    fn fail(&mut self, err: TransferError) -> TransferError {
        let to = if matches!(err, TransferError::Cancelled) {
            FileTransferState::Cancelled
        } else {
            FileTransferState::Failed
        };
        if let Ok(state) = self.state.transition(to) {
            self.state = state;
        }
        if to == FileTransferState::Failed {
            error!(error = %err, "Transfer failed, cancelling job");
            self.cancel.cancel();
        }
        err
    }

    fn complete_file(&mut self) -> Result<()> {
        self.state = self.state.transition(FileTransferState::Completed)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------

    /// Upload `local_path` as `name` into `parent_id`.
    #[instrument(skip(self, local_path, stats), fields(parent = %parent_id))]
    pub async fn upload_file(
        &mut self,
        local_path: &Path,
        name: &str,
        mime_type: &str,
        parent_id: &str,
        stats: &mut TransferStats,
    ) -> Result<UploadedFile> {
        self.check_cancelled()?;
        self.begin_file()?;

        match self.upload_inner(local_path, name, mime_type, parent_id, stats).await {
            Ok(uploaded) => {
                self.complete_file()?;
                Ok(uploaded)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn upload_inner(
        &mut self,
        local_path: &Path,
        name: &str,
        mime_type: &str,
        parent_id: &str,
        stats: &mut TransferStats,
    ) -> Result<UploadedFile> {
        let size = self.file_system.metadata(local_path).await?.size;
        stats.expect_bytes(size);

        let existing = if self.options.stop_duplicate {
            self.with_rotation(|store| async move {
                store.find_child(parent_id, name, mime_type).await
            })
            .await?
        } else {
            None
        };

        let new_file = NewFile {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parent_id: parent_id.to_string(),
            description: self.options.upload_description.clone(),
        };

        let node = if size == 0 {
            debug!(name, "Uploading empty file without a session");
            match &existing {
                Some(node) => {
                    let id = node.id();
                    self.with_rotation(|store| async move {
                        store.replace_content(id, mime_type, Bytes::new()).await
                    })
                    .await?
                }
                None => {
                    let file = &new_file;
                    self.with_rotation(|store| async move { store.create_file(file).await })
                        .await?
                }
            }
        } else {
            let target = match &existing {
                Some(node) => {
                    info!(name, id = node.id(), "Updating existing file");
                    UploadTarget::Replace {
                        file_id: node.id().to_string(),
                        mime_type: mime_type.to_string(),
                    }
                }
                None => UploadTarget::Create(new_file),
            };
            self.upload_resumable(local_path, name, &target, size).await?
        };

        if !self.options.team_drive {
            let id = node.id();
            self.with_rotation(|store| async move { store.grant_public_read(id).await })
                .await?;
        }

        stats.record_file(size);
        info!(name, id = node.id(), size, "Uploaded file");
        Ok(UploadedFile {
            id: node.id().to_string(),
            link: download_link(node.id()),
        })
    }

    async fn upload_resumable(
        &mut self,
        local_path: &Path,
        name: &str,
        target: &UploadTarget,
        size: u64,
    ) -> Result<RemoteNode> {
        let session = self
            .with_rotation(|store| async move { store.start_upload(target, size).await })
            .await?;
        let session = &session;

        let started = Instant::now();
        let mut offset = 0u64;

        loop {
            self.check_cancelled()?;

            let len = self.options.chunk_size.min(size - offset);
            let data = self.file_system.read_range(local_path, offset, len).await?;
            if data.is_empty() {
                return Err(BridgeError::OperationFailed(format!(
                    "{} ended at byte {} of {}",
                    local_path.display(),
                    offset,
                    size
                ))
                .into());
            }

            let outcome = match self.session.store().upload_chunk(session, offset, data).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_throttled() => {
                    let reason = e.reason().unwrap_or("throttled").to_string();
                    warn!(offset, reason = %reason, "Chunk throttled, resuming with next identity");
                    self.rotate(&reason).await?;
                    self.query_session(session).await?
                }
                Err(e) => return Err(e.into()),
            };

            match outcome {
                ChunkOutcome::Incomplete { next_offset } => {
                    offset = next_offset.min(size);
                    self.report(name, offset, size, started);
                }
                ChunkOutcome::Complete(node) => {
                    self.report(name, size, size, started);
                    return Ok(node);
                }
            }
        }
    }

    async fn query_session(&mut self, session: &UploadSession) -> Result<ChunkOutcome> {
        self.with_rotation(|store| async move { store.query_upload(session).await })
            .await
    }

    fn report(&self, name: &str, bytes_done: u64, total_bytes: u64, started: Instant) {
        self.progress.report(&ProgressSnapshot::new(
            name,
            bytes_done,
            total_bytes,
            started.elapsed(),
        ));
    }

    // ------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------

    /// Download `remote_id` into `dest_dir` under its sanitised name.
    ///
    /// A vanished file is recorded in `stats.failed` and reported as
    /// [`DownloadResult::Skipped`]; the partial local file is removed on any
    /// failure.
    #[instrument(skip(self, dest_dir, stats))]
    pub async fn download_file(
        &mut self,
        remote_id: &str,
        dest_dir: &Path,
        name: &str,
        mime_type: &str,
        size: Option<u64>,
        stats: &mut TransferStats,
    ) -> Result<DownloadResult> {
        self.check_cancelled()?;
        self.begin_file()?;

        let export = export_target(mime_type);
        let file_name = local_file_name(name, mime_type);
        let path = dest_dir.join(&file_name);

        let result = match export {
            Some(target) => self.export_to(remote_id, &path, &file_name, target, stats).await,
            None => self.fetch_to(remote_id, &path, &file_name, size, stats).await,
        };

        match result {
            Ok(bytes) => {
                self.complete_file()?;
                stats.record_file(bytes);
                info!(file = %file_name, bytes, "Downloaded file");
                Ok(DownloadResult::Downloaded { path, bytes })
            }
            Err(e) => {
                self.remove_partial(&path).await;
                if e.is_not_found() {
                    warn!(file = %file_name, "Remote file not found, skipping");
                    if let Ok(state) = self.state.transition(FileTransferState::Failed) {
                        self.state = state;
                    }
                    stats.record_failure(remote_id);
                    return Ok(DownloadResult::Skipped {
                        id: remote_id.to_string(),
                    });
                }
                Err(self.fail(e))
            }
        }
    }

    async fn export_to(
        &mut self,
        remote_id: &str,
        path: &Path,
        file_name: &str,
        target: ExportTarget,
        stats: &mut TransferStats,
    ) -> Result<u64> {
        let started = Instant::now();
        let data = self
            .with_rotation(|store| async move { store.export(remote_id, target.mime_type).await })
            .await?;
        let len = data.len() as u64;
        stats.expect_bytes(len);

        let mut writer = self.file_system.open_write_stream(path).await?;
        writer.write_all(&data).await.map_err(BridgeError::Io)?;
        writer.shutdown().await.map_err(BridgeError::Io)?;

        self.report(file_name, len, len, started);
        Ok(len)
    }

    async fn fetch_to(
        &mut self,
        remote_id: &str,
        path: &Path,
        file_name: &str,
        size: Option<u64>,
        stats: &mut TransferStats,
    ) -> Result<u64> {
        let total = match size {
            Some(size) => size,
            None => self
                .with_rotation(|store| async move { store.get_node(remote_id).await })
                .await?
                .size()
                .unwrap_or(0),
        };
        stats.expect_bytes(total);

        let started = Instant::now();
        let mut writer = self.file_system.open_write_stream(path).await?;
        let mut offset = 0u64;

        while offset < total {
            let len = self.options.chunk_size.min(total - offset);
            let data = self
                .with_rotation(|store| async move {
                    store.download_range(remote_id, offset, len).await
                })
                .await?;
            if data.is_empty() {
                warn!(file = %file_name, offset, total, "Remote returned fewer bytes than announced");
                break;
            }

            writer.write_all(&data).await.map_err(BridgeError::Io)?;
            offset += data.len() as u64;
            self.report(file_name, offset, total, started);
        }

        writer.shutdown().await.map_err(BridgeError::Io)?;
        self.check_cancelled()?;
        Ok(offset)
    }

    async fn remove_partial(&self, path: &Path) {
        if let Ok(true) = self.file_system.exists(path).await {
            if let Err(e) = self.file_system.delete_file(path).await {
                warn!(path = ?path, error = %e, "Failed to remove partial download");
            }
        }
    }

    // ------------------------------------------------------------------
    // Copy and listing
    // ------------------------------------------------------------------

    /// Server-side copy of `remote_id` into `dest_parent_id`.
    #[instrument(skip(self))]
    pub async fn copy_file(&mut self, remote_id: &str, dest_parent_id: &str) -> Result<RemoteNode> {
        self.check_cancelled()?;
        self.begin_file()?;

        match self
            .with_rotation(|store| async move { store.copy(remote_id, dest_parent_id).await })
            .await
        {
            Ok(node) => {
                self.complete_file()?;
                Ok(node)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Every child of `folder_id`, following page tokens.
    pub async fn list_all(&mut self, folder_id: &str, page_size: u32) -> Result<Vec<RemoteNode>> {
        let mut nodes = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = page_token.as_deref();
            let page = self
                .with_rotation(|store| async move {
                    store.list_children(folder_id, token, page_size).await
                })
                .await?;
            nodes.extend(page.nodes);

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(folder_id, count = nodes.len(), "Listed folder");
        Ok(nodes)
    }
}

/// Local name a remote file is downloaded to: sanitised, plus the export
/// extension for native documents.
pub fn local_file_name(name: &str, mime_type: &str) -> String {
    let mut file_name = sanitize_name(name);
    if let Some(target) = export_target(mime_type) {
        file_name.push_str(target.extension);
    }
    file_name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_file_name() {
        assert_eq!(local_file_name("a/b.txt", "text/plain"), "ab.txt");
        assert_eq!(
            local_file_name("Budget", "application/vnd.google-apps.spreadsheet"),
            "Budget.xlsx"
        );
    }

    #[test]
    fn test_default_options() {
        let options = ExecutorOptions::default();
        assert_eq!(options.chunk_size, 50 * 1024 * 1024);
        assert!(options.stop_duplicate);
        assert!(!options.team_drive);
    }
}
