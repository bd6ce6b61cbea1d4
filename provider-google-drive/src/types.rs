//! Google Drive API request and response types
//!
//! Data structures for (de)serializing Google Drive API v3 payloads.

use bridge_traits::storage::{RemoteNode, StorageQuota, FOLDER_MIME_TYPE, SHORTCUT_MIME_TYPE};
use serde::{Deserialize, Serialize};

/// Google Drive API file resource
///
/// See: https://developers.google.com/drive/api/v3/reference/files#resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,

    pub name: String,

    pub mime_type: String,

    /// File size in bytes, as a decimal string (omitted for folders and native documents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Present when `mime_type` is the shortcut type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut_details: Option<ShortcutDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutDetails {
    pub target_id: String,
    #[serde(default)]
    pub target_mime_type: String,
}

impl DriveFile {
    pub fn into_node(self) -> RemoteNode {
        if self.mime_type == FOLDER_MIME_TYPE {
            return RemoteNode::Folder {
                id: self.id,
                name: self.name,
            };
        }

        if self.mime_type == SHORTCUT_MIME_TYPE {
            if let Some(details) = self.shortcut_details {
                return RemoteNode::Shortcut {
                    id: self.id,
                    name: self.name,
                    target_id: details.target_id,
                    target_mime_type: details.target_mime_type,
                };
            }
        }

        RemoteNode::File {
            id: self.id,
            name: self.name,
            size: self.size.and_then(|s| s.parse().ok()),
            mime_type: self.mime_type,
        }
    }
}

/// Google Drive API files.list response
///
/// See: https://developers.google.com/drive/api/v3/reference/files/list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesListResponse {
    #[serde(default)]
    pub files: Vec<DriveFile>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Metadata body of files.create / files.copy
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadataRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Body of permissions.create
#[derive(Debug, Serialize)]
pub struct PermissionRequest {
    pub role: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

/// Google Drive API about.get response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutResponse {
    pub storage_quota: StorageQuotaResource,
}

/// Quota figures, encoded by the API as decimal strings
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageQuotaResource {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub usage_in_drive: Option<String>,
    #[serde(default)]
    pub usage_in_drive_trash: Option<String>,
}

impl From<StorageQuotaResource> for StorageQuota {
    fn from(resource: StorageQuotaResource) -> Self {
        let parse = |value: Option<String>| value.and_then(|v| v.parse::<u64>().ok());
        StorageQuota {
            limit: parse(resource.limit),
            usage: parse(resource.usage).unwrap_or(0),
            usage_in_drive: parse(resource.usage_in_drive).unwrap_or(0),
            usage_in_trash: parse(resource.usage_in_drive_trash).unwrap_or(0),
        }
    }
}

/// Error envelope returned with non-2xx statuses
///
/// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorItem {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}
