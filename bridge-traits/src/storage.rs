//! Storage Abstractions
//!
//! Provides platform-agnostic traits for local file I/O and for the remote
//! object store the transfer engine talks to.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// MIME type the remote store uses for folders.
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// MIME type the remote store uses for shortcuts.
pub const SHORTCUT_MIME_TYPE: &str = "application/vnd.google-apps.shortcut";

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations so the engine can be driven against the real
/// filesystem on desktop and against temporary directories in tests.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn first_chunk(fs: &dyn FileSystemAccess, path: &Path) -> Result<Bytes> {
///     fs.read_range(path, 0, 1024).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    ///
    /// For large files, use `read_range` instead.
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Read at most `len` bytes starting at `offset`.
    ///
    /// Returns fewer bytes than requested only at end of file.
    async fn read_range(&self, path: &Path, offset: u64, len: u64) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Delete a directory and all its contents
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Open a file for streaming writes, truncating any existing content
    async fn open_write_stream(
        &self,
        path: &Path,
    ) -> Result<Box<dyn tokio::io::AsyncWrite + Send + Unpin>>;

    /// Calculate total size of a directory recursively
    async fn directory_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        let entries = self.list_directory(path).await?;

        for entry in entries {
            let metadata = self.metadata(&entry).await?;
            if metadata.is_directory {
                total += self.directory_size(&entry).await?;
            } else {
                total += metadata.size;
            }
        }

        Ok(total)
    }
}

// ============================================================================
// Remote store
// ============================================================================

/// A node in the remote tree.
///
/// Identity is the store's opaque id. Native documents carry no size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteNode {
    File {
        id: String,
        name: String,
        mime_type: String,
        size: Option<u64>,
    },
    Folder {
        id: String,
        name: String,
    },
    Shortcut {
        id: String,
        name: String,
        target_id: String,
        target_mime_type: String,
    },
}

impl RemoteNode {
    pub fn id(&self) -> &str {
        match self {
            RemoteNode::File { id, .. }
            | RemoteNode::Folder { id, .. }
            | RemoteNode::Shortcut { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RemoteNode::File { name, .. }
            | RemoteNode::Folder { name, .. }
            | RemoteNode::Shortcut { name, .. } => name,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            RemoteNode::File { mime_type, .. } => mime_type,
            RemoteNode::Folder { .. } => FOLDER_MIME_TYPE,
            RemoteNode::Shortcut { .. } => SHORTCUT_MIME_TYPE,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            RemoteNode::File { size, .. } => *size,
            _ => None,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, RemoteNode::Folder { .. })
    }

    /// Follow a shortcut to the node it points at, keeping the shortcut's name.
    ///
    /// The target's size is unknown until fetched; non-shortcuts are returned as is.
    pub fn resolve(self) -> RemoteNode {
        match self {
            RemoteNode::Shortcut {
                name,
                target_id,
                target_mime_type,
                ..
            } => {
                if target_mime_type == FOLDER_MIME_TYPE {
                    RemoteNode::Folder {
                        id: target_id,
                        name,
                    }
                } else {
                    RemoteNode::File {
                        id: target_id,
                        name,
                        mime_type: target_mime_type,
                        size: None,
                    }
                }
            }
            other => other,
        }
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub nodes: Vec<RemoteNode>,
    pub next_page_token: Option<String>,
}

/// Metadata for a file about to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub name: String,
    pub mime_type: String,
    pub parent_id: String,
    pub description: Option<String>,
}

/// Destination of a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// Create a new file.
    Create(NewFile),
    /// Overwrite the content of an existing file.
    Replace { file_id: String, mime_type: String },
}

/// Handle to an open resumable upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub uri: String,
    pub total_size: u64,
}

/// Result of sending (or querying) a chunk of a resumable upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The store has committed everything before `next_offset`.
    Incomplete { next_offset: u64 },
    /// The upload finished and produced this file.
    Complete(RemoteNode),
}

/// Storage quota of the authenticated identity, in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuota {
    /// `None` for unlimited plans.
    pub limit: Option<u64>,
    pub usage: u64,
    pub usage_in_drive: u64,
    pub usage_in_trash: u64,
}

/// Remote object store used by the transfer engine.
///
/// Failures are reported as [`BridgeError::Remote`](crate::error::BridgeError::Remote)
/// carrying the store's reason code so callers can tell throttling and
/// missing objects apart from other failures.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch metadata for a single node
    async fn get_node(&self, id: &str) -> Result<RemoteNode>;

    /// List the non-trashed children of a folder, one page at a time
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<RemotePage>;

    /// First child of `parent_id` with exactly this name and MIME type
    async fn find_child(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
    ) -> Result<Option<RemoteNode>>;

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<RemoteNode>;

    /// Create a file with empty content
    async fn create_file(&self, file: &NewFile) -> Result<RemoteNode>;

    /// Replace a file's content in a single request
    async fn replace_content(&self, file_id: &str, mime_type: &str, data: Bytes)
        -> Result<RemoteNode>;

    /// Open a resumable upload session for `total_size` bytes
    async fn start_upload(&self, target: &UploadTarget, total_size: u64) -> Result<UploadSession>;

    /// Send `data` starting at `offset`
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        data: Bytes,
    ) -> Result<ChunkOutcome>;

    /// Ask the store how much of the session it has committed
    async fn query_upload(&self, session: &UploadSession) -> Result<ChunkOutcome>;

    /// Download `length` bytes of a binary file starting at `offset`
    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> Result<Bytes>;

    /// Export a native document to `mime_type`
    async fn export(&self, file_id: &str, mime_type: &str) -> Result<Bytes>;

    /// Server-side copy of a file into `dest_parent_id`
    async fn copy(&self, file_id: &str, dest_parent_id: &str) -> Result<RemoteNode>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Make a node readable by anyone with the link
    async fn grant_public_read(&self, id: &str) -> Result<()>;

    async fn storage_quota(&self) -> Result<StorageQuota>;
}

/// Builds a [`RemoteStore`] handle bound to one access token.
///
/// Called again whenever the engine switches identity.
#[async_trait]
pub trait RemoteStoreFactory: Send + Sync {
    async fn connect(&self, access_token: &str) -> Result<Arc<dyn RemoteStore>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_metadata() {
        let metadata = FileMetadata {
            size: 1024,
            created_at: Some(1234567890),
            modified_at: Some(1234567900),
            is_directory: false,
        };

        assert_eq!(metadata.size, 1024);
        assert!(!metadata.is_directory);
    }

    #[test]
    fn test_shortcut_resolves_to_folder() {
        let shortcut = RemoteNode::Shortcut {
            id: "sc".into(),
            name: "Linked".into(),
            target_id: "target".into(),
            target_mime_type: FOLDER_MIME_TYPE.into(),
        };

        let resolved = shortcut.resolve();
        assert!(resolved.is_folder());
        assert_eq!(resolved.id(), "target");
        assert_eq!(resolved.name(), "Linked");
    }

    #[test]
    fn test_shortcut_resolves_to_file() {
        let shortcut = RemoteNode::Shortcut {
            id: "sc".into(),
            name: "report.pdf".into(),
            target_id: "t1".into(),
            target_mime_type: "application/pdf".into(),
        };

        match shortcut.resolve() {
            RemoteNode::File { id, mime_type, size, .. } => {
                assert_eq!(id, "t1");
                assert_eq!(mime_type, "application/pdf");
                assert_eq!(size, None);
            }
            other => panic!("unexpected node: {:?}", other),
        }
    }

    #[test]
    fn test_mime_type_of_folder() {
        let folder = RemoteNode::Folder {
            id: "f".into(),
            name: "Docs".into(),
        };
        assert_eq!(folder.mime_type(), FOLDER_MIME_TYPE);
        assert_eq!(folder.size(), None);
    }
}
