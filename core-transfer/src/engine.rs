//! # Drive Engine
//!
//! Entry point of the transfer engine.
//!
//! A [`DriveEngine`] holds the configuration and the injected capabilities
//! and hands out [`TransferJob`]s. Each job authenticates its own
//! [`DriveSession`] (with its own identity pool cursor), runs exactly one
//! top-level operation and is consumed by it.
//!
//! ## Usage
//!
//! ```ignore
//! use core_transfer::DriveEngine;
//!
//! let engine = DriveEngine::new(config, credentials, factory);
//!
//! let job = engine.new_job().await?;
//! let handle = job.cancel_handle();
//! tokio::spawn(async move { wait_for_ctrl_c().await; handle.cancel() });
//!
//! let outcome = job.clone_link("https://drive.google.com/drive/folders/0AbC").await?;
//! ```
//!
//! Jobs can also be cancelled from anywhere through
//! [`DriveEngine::cancel`] and [`DriveEngine::cancel_all`].

use crate::executor::{ChunkedExecutor, DownloadResult, ExecutorOptions};
use crate::job::{Operation, TransferJobId, TransferStats};
use crate::link::{download_link, drive_id_from_link, folder_link};
use crate::naming::{guess_mime_type, readable_size, readable_time, sanitize_name};
use crate::pool::ServiceAccountPool;
use crate::progress::{EventBusProgressSink, NoopProgressSink, ProgressSink};
use crate::session::DriveSession;
use crate::walker::TransferWalker;
use crate::{Result, TransferError};
use bridge_traits::{Clock, RemoteNode, RemoteStoreFactory, StorageQuota, SystemClock};
use chrono::{DateTime, Utc};
use core_auth::{load_identities, CredentialProvider, FileCredentialProvider};
use core_runtime::config::TransferConfig;
use core_runtime::events::{CoreEvent, EventBus, TransferEvent};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

const CLONE_CANCELLED_CLEANED: &str =
    "your clone has been stopped and cloned data has been deleted!";
const CLONE_CANCELLED_KEPT: &str = "your clone has been stopped, cloned data was kept";

/// Cancellation tokens of the jobs still running.
///
/// The lock is never held across an await, so dropping a job can always
/// remove its entry synchronously.
#[derive(Clone, Default)]
struct ActiveJobs(Arc<Mutex<HashMap<TransferJobId, CancellationToken>>>);

impl ActiveJobs {
    fn lock(&self) -> MutexGuard<'_, HashMap<TransferJobId, CancellationToken>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Folder,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::File => write!(f, "File"),
            EntryKind::Folder => write!(f, "Folder"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub name: String,
    pub kind: EntryKind,
    pub link: String,
    pub files: u64,
    pub folders: u64,
    pub elapsed: Duration,
}

impl UploadOutcome {
    /// `elapsed` as `1h2m3s`
    pub fn readable_elapsed(&self) -> String {
        readable_time(self.elapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub name: String,
    /// Job directory below the configured download directory
    pub path: PathBuf,
    pub kind: EntryKind,
    pub files: u64,
    pub folders: u64,
    pub elapsed: Duration,
    /// Remote ids that vanished during the download
    pub failed: Vec<String>,
}

impl DownloadOutcome {
    pub fn readable_elapsed(&self) -> String {
        readable_time(self.elapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSummary {
    pub filename: String,
    /// Bytes copied
    pub size: u64,
    /// `Folder`, or the MIME type of a single file
    pub kind: String,
    pub sub_folders: u64,
    pub files: u64,
    pub link: String,
}

impl CloneSummary {
    pub fn readable_size(&self) -> String {
        readable_size(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloneOutcome {
    Completed(CloneSummary),
    Cancelled { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesOutcome {
    pub name: String,
    /// `Folder`, or the MIME type of a file
    pub kind: String,
    pub size: u64,
    pub files: u64,
    pub folders: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    InvalidLink(String),
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutcome::Deleted => write!(f, "Successfully deleted"),
            DeleteOutcome::NotFound => write!(f, "No such file exist"),
            DeleteOutcome::InvalidLink(message) => write!(f, "{}", message),
        }
    }
}

/// Name reported in the completion event; `None` when the job ended cancelled.
trait JobSummary {
    fn summary_name(&self) -> Option<String>;
}

impl JobSummary for UploadOutcome {
    fn summary_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

impl JobSummary for DownloadOutcome {
    fn summary_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

impl JobSummary for CloneOutcome {
    fn summary_name(&self) -> Option<String> {
        match self {
            CloneOutcome::Completed(summary) => Some(summary.filename.clone()),
            CloneOutcome::Cancelled { .. } => None,
        }
    }
}

impl JobSummary for PropertiesOutcome {
    fn summary_name(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

impl JobSummary for DeleteOutcome {
    fn summary_name(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl JobSummary for StorageQuota {
    fn summary_name(&self) -> Option<String> {
        Some("storage quota".to_string())
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct DriveEngine {
    config: TransferConfig,
    credentials: Arc<dyn CredentialProvider>,
    factory: Arc<dyn RemoteStoreFactory>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    active_jobs: ActiveJobs,
}

impl DriveEngine {
    pub fn new(
        config: TransferConfig,
        credentials: Arc<dyn CredentialProvider>,
        factory: Arc<dyn RemoteStoreFactory>,
    ) -> Self {
        Self {
            config,
            credentials,
            factory,
            clock: Arc::new(SystemClock),
            event_bus: None,
            active_jobs: ActiveJobs::default(),
        }
    }

    /// Engine reading credentials from the token files named in `config`.
    pub fn with_file_credentials(
        config: TransferConfig,
        factory: Arc<dyn RemoteStoreFactory>,
    ) -> Self {
        let credentials = Arc::new(FileCredentialProvider::new(
            Arc::clone(&config.http_client),
            Arc::clone(&config.file_system),
            config.token_path.clone(),
        ));
        Self::new(config, credentials, factory)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Publish job lifecycle and progress events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Start a job reporting progress on the event bus, if one is attached.
    pub async fn new_job(&self) -> Result<TransferJob> {
        let job_id = TransferJobId::new();
        let progress: Arc<dyn ProgressSink> = match &self.event_bus {
            Some(bus) => Arc::new(EventBusProgressSink::new(bus.clone(), job_id.as_str())),
            None => Arc::new(NoopProgressSink),
        };
        self.start_job(job_id, progress).await
    }

    /// Start a job reporting progress to `progress`.
    pub async fn new_job_with_progress(&self, progress: Arc<dyn ProgressSink>) -> Result<TransferJob> {
        self.start_job(TransferJobId::new(), progress).await
    }

    #[instrument(skip(self, progress), fields(job_id = %job_id))]
    async fn start_job(
        &self,
        job_id: TransferJobId,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<TransferJob> {
        let pool = match &self.config.accounts_dir {
            Some(dir) => {
                let identities = load_identities(self.config.file_system.as_ref(), dir).await?;
                Some(ServiceAccountPool::new(identities)?)
            }
            None => None,
        };

        let mut session = DriveSession::open(
            Arc::clone(&self.credentials),
            Arc::clone(&self.factory),
            self.config.scopes.clone(),
            pool,
            self.config.token_path.is_some(),
        )
        .await?;
        if let Some(bus) = &self.event_bus {
            session = session.with_events(bus.clone(), job_id.as_str());
        }
        info!(identity = session.identity_name(), "Job session ready");

        let cancel = CancellationToken::new();
        let options = ExecutorOptions {
            chunk_size: self.config.chunk_size,
            stop_duplicate: self.config.stop_duplicate,
            team_drive: self.config.team_drive,
            upload_description: self.config.upload_description.clone(),
        };
        let executor = ChunkedExecutor::new(
            session,
            Arc::clone(&self.config.file_system),
            options,
            cancel.clone(),
            progress,
        );

        self.active_jobs.lock().insert(job_id, cancel.clone());

        Ok(TransferJob {
            id: job_id,
            walker: TransferWalker::new(executor, self.config.page_size),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            started_at: self.clock.now(),
            event_bus: self.event_bus.clone(),
            active_jobs: self.active_jobs.clone(),
            cancel,
            stats: TransferStats::new(),
        })
    }

    /// Cancel a running job. Returns `false` if no such job is active.
    pub fn cancel(&self, job_id: &TransferJobId) -> bool {
        match self.active_jobs.lock().get(job_id) {
            Some(token) => {
                info!(job_id = %job_id, "Cancelling job");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active job; returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let jobs = self.active_jobs.lock();
        for token in jobs.values() {
            token.cancel();
        }
        jobs.len()
    }

    pub fn active_jobs(&self) -> Vec<TransferJobId> {
        self.active_jobs.lock().keys().copied().collect()
    }
}

/// Cloneable handle that cancels one job from another task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    job_id: TransferJobId,
    token: CancellationToken,
}

impl CancelHandle {
    pub fn job_id(&self) -> TransferJobId {
        self.job_id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

// ============================================================================
// Job
// ============================================================================

/// One top-level transfer. Every operation consumes the job.
pub struct TransferJob {
    id: TransferJobId,
    walker: TransferWalker,
    config: TransferConfig,
    clock: Arc<dyn Clock>,
    started_at: DateTime<Utc>,
    event_bus: Option<EventBus>,
    active_jobs: ActiveJobs,
    cancel: CancellationToken,
    stats: TransferStats,
}

impl TransferJob {
    pub fn id(&self) -> TransferJobId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            job_id: self.id,
            token: self.cancel.clone(),
        }
    }

    /// Request cancellation; idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Upload a local file or directory into the configured parent folder.
    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn upload(mut self, local_path: &Path) -> Result<UploadOutcome> {
        self.emit_started(Operation::Upload, &local_path.display().to_string());
        let result = self.run_upload(local_path).await;
        self.finish(Operation::Upload, result).await
    }

    /// Download the file or folder behind `link` into a fresh directory
    /// below the configured download directory.
    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn download(mut self, link: &str) -> Result<DownloadOutcome> {
        self.emit_started(Operation::Download, link);
        let result = self.run_download(link).await;
        self.finish(Operation::Download, result).await
    }

    /// Copy the file or folder behind `link` into the configured parent folder.
    ///
    /// Cancellation is reported as [`CloneOutcome::Cancelled`], not as an error.
    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn clone_link(mut self, link: &str) -> Result<CloneOutcome> {
        self.emit_started(Operation::Clone, link);
        let result = self.run_clone(link).await;
        self.finish(Operation::Clone, result).await
    }

    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn properties(mut self, link: &str) -> Result<PropertiesOutcome> {
        self.emit_started(Operation::Properties, link);
        let result = self.run_properties(link).await;
        self.finish(Operation::Properties, result).await
    }

    /// Delete the file or folder behind `link`.
    ///
    /// A malformed link and a missing file are outcomes, not errors.
    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn delete(mut self, link: &str) -> Result<DeleteOutcome> {
        self.emit_started(Operation::Delete, link);
        let result = self.run_delete(link).await;
        self.finish(Operation::Delete, result).await
    }

    pub async fn storage_quota(mut self) -> Result<StorageQuota> {
        self.emit_started(Operation::Quota, "about");
        let result = self
            .walker
            .executor_mut()
            .with_rotation(|store| async move { store.storage_quota().await })
            .await;
        self.finish(Operation::Quota, result).await
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    async fn run_upload(&mut self, local_path: &Path) -> Result<UploadOutcome> {
        let metadata = self.config.file_system.metadata(local_path).await?;
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TransferError::Config(format!("{} has no file name", local_path.display()))
            })?;
        let parent_id = self.config.parent_id.clone();

        if !metadata.is_directory {
            let mime_type = guess_mime_type(local_path);
            let uploaded = self
                .walker
                .executor_mut()
                .upload_file(local_path, &name, &mime_type, &parent_id, &mut self.stats)
                .await?;
            return Ok(UploadOutcome {
                name,
                kind: EntryKind::File,
                link: uploaded.link,
                files: self.stats.total_files,
                folders: self.stats.total_folders,
                elapsed: self.elapsed(),
            });
        }

        let root_id = self.walker.ensure_folder(&parent_id, &name).await?;
        if !self.config.team_drive {
            let id = root_id.as_str();
            self.walker
                .executor_mut()
                .with_rotation(|store| async move { store.grant_public_read(id).await })
                .await?;
        }

        if let Err(e) = self
            .walker
            .walk_upload_folder(local_path, &root_id, &mut self.stats)
            .await
        {
            if matches!(e, TransferError::Cancelled) {
                self.cleanup_remote(&root_id).await;
            }
            return Err(e);
        }

        Ok(UploadOutcome {
            name,
            kind: EntryKind::Folder,
            link: folder_link(&root_id),
            files: self.stats.total_files,
            folders: self.stats.total_folders,
            elapsed: self.elapsed(),
        })
    }

    async fn run_download(&mut self, link: &str) -> Result<DownloadOutcome> {
        let id = drive_id_from_link(link)?;
        let root = self.config.download_dir.join(job_dir_name());
        self.config.file_system.create_dir_all(&root).await?;

        let node = self.lookup(&id).await?;
        let name = node.name().to_string();

        let kind = match node {
            RemoteNode::Folder { id, name } => {
                let path = root.join(sanitize_name(&name));
                self.walker
                    .walk_download_folder(&id, &path, &mut self.stats)
                    .await?;
                EntryKind::Folder
            }
            RemoteNode::File {
                id,
                name,
                mime_type,
                size,
            } => {
                let result = self
                    .walker
                    .executor_mut()
                    .download_file(&id, &root, &name, &mime_type, size, &mut self.stats)
                    .await?;
                if let DownloadResult::Skipped { id } = result {
                    warn!(id = %id, "File disappeared before it could be downloaded");
                }
                EntryKind::File
            }
            RemoteNode::Shortcut { .. } => {
                return Err(TransferError::Config(
                    "Shortcut could not be resolved".to_string(),
                ))
            }
        };

        Ok(DownloadOutcome {
            name,
            path: root,
            kind,
            files: self.stats.total_files,
            folders: self.stats.total_folders,
            elapsed: self.elapsed(),
            failed: self.stats.failed.clone(),
        })
    }

    async fn run_clone(&mut self, link: &str) -> Result<CloneOutcome> {
        let id = drive_id_from_link(link)?;
        let node = match self.lookup(&id).await {
            Ok(node) => node,
            Err(TransferError::Cancelled) => {
                return Ok(CloneOutcome::Cancelled {
                    message: CLONE_CANCELLED_KEPT.to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        let parent_id = self.config.parent_id.clone();

        match node {
            RemoteNode::Folder { id, name } => {
                let dest_parent = parent_id.as_str();
                let folder_name = name.as_str();
                let dest = self
                    .walker
                    .executor_mut()
                    .with_rotation(|store| async move {
                        store.create_folder(dest_parent, folder_name).await
                    })
                    .await?;
                let dest_id = dest.id().to_string();

                match self
                    .walker
                    .walk_clone_folder(&id, &dest_id, &mut self.stats)
                    .await
                {
                    Ok(()) => Ok(CloneOutcome::Completed(CloneSummary {
                        filename: name,
                        size: self.stats.transferred_bytes,
                        kind: EntryKind::Folder.to_string(),
                        sub_folders: self.stats.total_folders,
                        files: self.stats.total_files,
                        link: folder_link(&dest_id),
                    })),
                    Err(TransferError::Cancelled) => Ok(self.clone_cancelled(&dest_id).await),
                    Err(e) => Err(e),
                }
            }
            RemoteNode::File {
                id,
                name,
                mime_type,
                size,
            } => match self.walker.executor_mut().copy_file(&id, &parent_id).await {
                Ok(copied) => {
                    let size = size.unwrap_or(0);
                    self.stats.expect_bytes(size);
                    self.stats.record_file(size);
                    Ok(CloneOutcome::Completed(CloneSummary {
                        filename: name,
                        size,
                        kind: mime_type,
                        sub_folders: 0,
                        files: self.stats.total_files,
                        link: download_link(copied.id()),
                    }))
                }
                Err(TransferError::Cancelled) => Ok(CloneOutcome::Cancelled {
                    message: CLONE_CANCELLED_KEPT.to_string(),
                }),
                Err(e) => Err(e),
            },
            RemoteNode::Shortcut { .. } => Err(TransferError::Config(
                "Shortcut could not be resolved".to_string(),
            )),
        }
    }

    async fn clone_cancelled(&mut self, dest_id: &str) -> CloneOutcome {
        if self.config.cleanup_on_cancel {
            self.cleanup_remote(dest_id).await;
            CloneOutcome::Cancelled {
                message: CLONE_CANCELLED_CLEANED.to_string(),
            }
        } else {
            CloneOutcome::Cancelled {
                message: CLONE_CANCELLED_KEPT.to_string(),
            }
        }
    }

    async fn run_properties(&mut self, link: &str) -> Result<PropertiesOutcome> {
        let id = drive_id_from_link(link)?;
        let node = self.lookup(&id).await?;

        match node {
            RemoteNode::Folder { id, name } => {
                let tree = self.walker.compute_tree_size(&id).await?;
                Ok(PropertiesOutcome {
                    name,
                    kind: EntryKind::Folder.to_string(),
                    size: tree.bytes,
                    files: tree.files,
                    folders: tree.folders,
                })
            }
            other => Ok(PropertiesOutcome {
                name: other.name().to_string(),
                kind: other.mime_type().to_string(),
                size: other.size().unwrap_or(0),
                files: 1,
                folders: 0,
            }),
        }
    }

    async fn run_delete(&mut self, link: &str) -> Result<DeleteOutcome> {
        let id = match drive_id_from_link(link) {
            Ok(id) => id,
            Err(TransferError::InvalidLink(message)) => {
                return Ok(DeleteOutcome::InvalidLink(message))
            }
            Err(e) => return Err(e),
        };

        let target = id.as_str();
        match self
            .walker
            .executor_mut()
            .with_rotation(|store| async move { store.delete(target).await })
            .await
        {
            Ok(()) => {
                info!(id = %id, "Deleted");
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.is_not_found() => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Fetch a node, following shortcuts.
    ///
    /// A missing node triggers one fallback from the identity pool to the
    /// user token before it is reported as [`TransferError::NotFound`].
    async fn lookup(&mut self, id: &str) -> Result<RemoteNode> {
        loop {
            let executor = self.walker.executor_mut();
            match executor
                .with_rotation(|store| async move { store.get_node(id).await })
                .await
            {
                Ok(node @ RemoteNode::Shortcut { .. }) => {
                    let resolved = node.resolve();
                    if resolved.is_folder() {
                        return Ok(resolved);
                    }
                    let target = resolved.id().to_string();
                    let target_node = executor
                        .with_rotation(|store| {
                            let target = target.clone();
                            async move { store.get_node(&target).await }
                        })
                        .await?;
                    return Ok(match target_node {
                        RemoteNode::File {
                            id,
                            mime_type,
                            size,
                            ..
                        } => RemoteNode::File {
                            id,
                            name: resolved.name().to_string(),
                            mime_type,
                            size,
                        },
                        other => other,
                    });
                }
                Ok(node) => return Ok(node),
                Err(e) if e.is_not_found() => {
                    if executor.session_mut().reauthenticate_once().await? {
                        warn!(id, "Not found, retrying with the user token");
                        continue;
                    }
                    return Err(TransferError::NotFound { id: id.to_string() });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete a partially transferred remote root when cleanup is enabled.
    async fn cleanup_remote(&mut self, id: &str) {
        if !self.config.cleanup_on_cancel {
            return;
        }
        info!(id, "Deleting partially transferred data");
        let store = self.walker.executor_mut().session_mut().store();
        if let Err(e) = store.delete(id).await {
            warn!(id, error = %e, "Failed to delete partially transferred data");
        }
    }

    fn elapsed(&self) -> Duration {
        (self.clock.now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn emit(&self, event: TransferEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Transfer(event)).ok();
        }
    }

    fn emit_started(&self, operation: Operation, target: &str) {
        info!(operation = operation.as_str(), target, "Job started");
        self.emit(TransferEvent::Started {
            job_id: self.id.as_str(),
            operation: operation.as_str().to_string(),
            target: target.to_string(),
        });
    }

    async fn finish<T: JobSummary>(&self, operation: Operation, result: Result<T>) -> Result<T> {
        self.active_jobs.lock().remove(&self.id);

        match &result {
            Ok(outcome) => match outcome.summary_name() {
                Some(name) => {
                    info!(
                        operation = operation.as_str(),
                        files = self.stats.total_files,
                        folders = self.stats.total_folders,
                        bytes = self.stats.transferred_bytes,
                        elapsed = %readable_time(self.elapsed()),
                        "Job completed"
                    );
                    self.emit(TransferEvent::Completed {
                        job_id: self.id.as_str(),
                        operation: operation.as_str().to_string(),
                        name,
                        files: self.stats.total_files,
                        folders: self.stats.total_folders,
                        bytes: self.stats.transferred_bytes,
                        duration_secs: self.elapsed().as_secs(),
                    });
                }
                None => self.emit_cancelled(),
            },
            Err(TransferError::Cancelled) => self.emit_cancelled(),
            Err(e) => {
                error!(operation = operation.as_str(), error = %e, "Job failed");
                self.emit(TransferEvent::Failed {
                    job_id: self.id.as_str(),
                    message: e.to_string(),
                    recoverable: e.is_recoverable(),
                });
            }
        }

        result
    }

    fn emit_cancelled(&self) {
        info!(files = self.stats.total_files, "Job cancelled");
        self.emit(TransferEvent::Cancelled {
            job_id: self.id.as_str(),
            files_completed: self.stats.total_files,
        });
    }
}

impl Drop for TransferJob {
    fn drop(&mut self) {
        self.active_jobs.lock().remove(&self.id);
    }
}

impl fmt::Debug for TransferJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferJob")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Random lowercase directory name for one download job.
fn job_dir_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
