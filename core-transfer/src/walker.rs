//! # Transfer Walker
//!
//! Recursive tree walks for uploads, downloads, clones and size computation.
//!
//! Children are visited sorted by name, and the cancellation token is checked
//! before each one. A cancelled walk returns [`TransferError::Cancelled`]
//! and leaves the siblings it already finished in place. Files are handed to
//! the [`ChunkedExecutor`]; the walker itself only creates folders and keeps
//! the counters in the caller's [`TransferStats`].

use crate::executor::{local_file_name, ChunkedExecutor};
use crate::job::TransferStats;
use crate::naming::{guess_mime_type, sanitize_name};
use crate::{Result, TransferError};
use bridge_traits::{RemoteNode, FOLDER_MIME_TYPE};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Size of a remote tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSize {
    pub files: u64,
    pub folders: u64,
    pub bytes: u64,
}

pub struct TransferWalker {
    executor: ChunkedExecutor,
    page_size: u32,
}

impl TransferWalker {
    pub fn new(executor: ChunkedExecutor, page_size: u32) -> Self {
        Self {
            executor,
            page_size,
        }
    }

    pub fn executor(&self) -> &ChunkedExecutor {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut ChunkedExecutor {
        &mut self.executor
    }

    /// Id of the folder named `name` under `parent_id`, created if missing.
    pub async fn ensure_folder(&mut self, parent_id: &str, name: &str) -> Result<String> {
        let existing = self
            .executor
            .with_rotation(|store| async move {
                store.find_child(parent_id, name, FOLDER_MIME_TYPE).await
            })
            .await?;

        if let Some(folder) = existing {
            debug!(name, id = folder.id(), "Reusing existing folder");
            return Ok(folder.id().to_string());
        }

        let folder = self
            .executor
            .with_rotation(|store| async move { store.create_folder(parent_id, name).await })
            .await?;
        info!(name, id = folder.id(), "Created folder");
        Ok(folder.id().to_string())
    }

    /// Upload the contents of `local_dir` into the remote folder `dest_parent_id`.
    ///
    /// Returns `dest_parent_id`; an empty directory uploads nothing.
    pub fn walk_upload_folder<'a>(
        &'a mut self,
        local_dir: &'a Path,
        dest_parent_id: &'a str,
        stats: &'a mut TransferStats,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            self.executor.check_cancelled()?;
            let file_system = Arc::clone(self.executor.file_system());

            let mut entries = file_system.list_directory(local_dir).await?;
            entries.sort();

            for entry in entries {
                self.executor.check_cancelled()?;

                let name = match entry.file_name() {
                    Some(name) => name.to_string_lossy().into_owned(),
                    None => continue,
                };

                if file_system.metadata(&entry).await?.is_directory {
                    let folder_id = self.ensure_folder(dest_parent_id, &name).await?;
                    stats.record_folder();
                    self.walk_upload_folder(&entry, &folder_id, stats).await?;
                } else {
                    let mime_type = guess_mime_type(&entry);
                    self.executor
                        .upload_file(&entry, &name, &mime_type, dest_parent_id, stats)
                        .await?;
                }
            }

            Ok(dest_parent_id.to_string())
        }
        .boxed()
    }

    /// Download the remote folder `remote_folder_id` into `local_path`.
    ///
    /// Files whose final local name already exists are skipped, so a re-run
    /// only fetches what is missing. Vanished files are recorded in
    /// `stats.failed` and the walk continues.
    pub async fn walk_download_folder(
        &mut self,
        remote_folder_id: &str,
        local_path: &Path,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let mut visited = HashSet::from([remote_folder_id.to_string()]);
        self.download_tree(remote_folder_id, local_path, stats, &mut visited)
            .await
    }

    fn download_tree<'a>(
        &'a mut self,
        remote_folder_id: &'a str,
        local_path: &'a Path,
        stats: &'a mut TransferStats,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.executor.check_cancelled()?;
            let file_system = Arc::clone(self.executor.file_system());
            file_system.create_dir_all(local_path).await?;

            let mut children = self.executor.list_all(remote_folder_id, self.page_size).await?;
            children.sort_by(|a, b| a.name().cmp(b.name()));

            for child in children {
                self.executor.check_cancelled()?;

                match child.resolve() {
                    RemoteNode::Folder { id, name } => {
                        if !visited.insert(id.clone()) {
                            warn!(folder = %name, id = %id, "Folder already visited, skipping");
                            continue;
                        }
                        debug!(folder = %name, "Descending into folder");
                        let sub_path = local_path.join(sanitize_name(&name));
                        self.download_tree(&id, &sub_path, stats, visited).await?;
                        stats.record_folder();
                    }
                    RemoteNode::File {
                        id,
                        name,
                        mime_type,
                        size,
                    } => {
                        let target = local_path.join(local_file_name(&name, &mime_type));
                        if file_system.exists(&target).await? {
                            debug!(file = %name, "Already downloaded, skipping");
                            continue;
                        }
                        self.executor
                            .download_file(&id, local_path, &name, &mime_type, size, stats)
                            .await?;
                    }
                    RemoteNode::Shortcut { .. } => {}
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// Copy the contents of `remote_folder_id` into `dest_parent_id` server side.
    ///
    /// A shortcut to a file copies the target under the target's own name;
    /// a shortcut whose target is gone is recorded in `stats.failed`.
    pub async fn walk_clone_folder(
        &mut self,
        remote_folder_id: &str,
        dest_parent_id: &str,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let mut visited = HashSet::from([
            remote_folder_id.to_string(),
            dest_parent_id.to_string(),
        ]);
        self.clone_tree(remote_folder_id, dest_parent_id, stats, &mut visited)
            .await
    }

    fn clone_tree<'a>(
        &'a mut self,
        remote_folder_id: &'a str,
        dest_parent_id: &'a str,
        stats: &'a mut TransferStats,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.executor.check_cancelled()?;

            let mut children = self.executor.list_all(remote_folder_id, self.page_size).await?;
            children.sort_by(|a, b| a.name().cmp(b.name()));

            for child in children {
                self.executor.check_cancelled()?;

                let child_id = child.id().to_string();
                let node = match self.follow_file_shortcut(child).await? {
                    Some(node) => node,
                    None => {
                        stats.record_failure(child_id);
                        continue;
                    }
                };

                match node {
                    RemoteNode::Folder { id, name } => {
                        if !visited.insert(id.clone()) {
                            warn!(folder = %name, id = %id, "Folder already visited, skipping");
                            continue;
                        }
                        let folder_id = self.ensure_folder(dest_parent_id, &name).await?;
                        visited.insert(folder_id.clone());
                        stats.record_folder();
                        self.clone_tree(&id, &folder_id, stats, visited).await?;
                    }
                    RemoteNode::File {
                        id,
                        name,
                        mime_type,
                        size,
                    } => {
                        if self.is_duplicate(dest_parent_id, &name, &mime_type).await? {
                            debug!(file = %name, "Already in destination, skipping");
                            continue;
                        }
                        let copied = self.executor.copy_file(&id, dest_parent_id).await?;
                        let size = copied.size().or(size).unwrap_or(0);
                        stats.expect_bytes(size);
                        stats.record_file(size);
                    }
                    RemoteNode::Shortcut { .. } => {}
                }
            }

            Ok(())
        }
        .boxed()
    }

    /// Replace a shortcut to a file by its target's metadata.
    ///
    /// Folder shortcuts and plain nodes are resolved in place. `None` when the
    /// target no longer exists.
    async fn follow_file_shortcut(&mut self, node: RemoteNode) -> Result<Option<RemoteNode>> {
        match node {
            RemoteNode::Shortcut {
                target_id,
                target_mime_type,
                ..
            } if target_mime_type != FOLDER_MIME_TYPE => {
                let target = target_id.as_str();
                let fetched = self
                    .executor
                    .with_rotation(|store| async move { store.get_node(target).await })
                    .await;
                match fetched {
                    Ok(node) => Ok(Some(node.resolve())),
                    Err(e) if e.is_not_found() => {
                        warn!(target = %target_id, "Shortcut target no longer exists");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            other => Ok(Some(other.resolve())),
        }
    }

    async fn is_duplicate(&mut self, parent_id: &str, name: &str, mime_type: &str) -> Result<bool> {
        if !self.executor.options().stop_duplicate {
            return Ok(false);
        }
        let existing = self
            .executor
            .with_rotation(|store| async move { store.find_child(parent_id, name, mime_type).await })
            .await?;
        Ok(existing.is_some())
    }

    /// Count files, folders and bytes below `remote_folder_id`.
    ///
    /// File shortcuts count their target's size; each folder is counted once.
    pub async fn compute_tree_size(&mut self, remote_folder_id: &str) -> Result<TreeSize> {
        let mut size = TreeSize::default();
        let mut visited = HashSet::from([remote_folder_id.to_string()]);
        self.accumulate_size(remote_folder_id, &mut size, &mut visited)
            .await?;
        Ok(size)
    }

    fn accumulate_size<'a>(
        &'a mut self,
        folder_id: &'a str,
        size: &'a mut TreeSize,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let children = self.executor.list_all(folder_id, self.page_size).await?;

            for child in children {
                if self.executor.cancel_token().is_cancelled() {
                    return Err(TransferError::Cancelled);
                }

                match self.follow_file_shortcut(child).await? {
                    Some(RemoteNode::Folder { id, .. }) => {
                        if !visited.insert(id.clone()) {
                            continue;
                        }
                        size.folders += 1;
                        self.accumulate_size(&id, size, visited).await?;
                    }
                    Some(RemoteNode::File { size: bytes, .. }) => {
                        size.files += 1;
                        size.bytes += bytes.unwrap_or(0);
                    }
                    Some(RemoteNode::Shortcut { .. }) | None => {}
                }
            }

            Ok(())
        }
        .boxed()
    }
}
