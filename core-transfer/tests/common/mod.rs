//! In-memory Drive used by the integration tests.
//!
//! `FakeDrive` keeps a tree of nodes shared by every store handle the
//! factory hands out. Each handle is bound to the access token it was
//! connected with, so tests can tell which identity made which call.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    ChunkOutcome, FileSystemAccess, HttpClient, HttpRequest, HttpResponse, NewFile, RemoteNode,
    RemotePage, RemoteStore, RemoteStoreFactory, StorageQuota, UploadSession, UploadTarget,
    FOLDER_MIME_TYPE,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use core_auth::{Credential, CredentialProvider, Identity};
use core_runtime::config::TransferConfig;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const USER_TOKEN: &str = "token-user";

#[derive(Debug, Clone)]
struct FakeNode {
    node: RemoteNode,
    parent: Option<String>,
    content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct FakeSession {
    target: UploadTarget,
    total: u64,
    data: Vec<u8>,
    result: Option<RemoteNode>,
}

#[derive(Default)]
struct DriveState {
    order: Vec<String>,
    nodes: HashMap<String, FakeNode>,
    next_id: u64,
    sessions: HashMap<String, FakeSession>,
    chunk_calls: Vec<(String, u64)>,
    throttled_chunk_calls: HashSet<usize>,
    throttled_downloads: usize,
    throttled_tokens: HashSet<String>,
    vanished: HashSet<String>,
    user_only: HashSet<String>,
    grants: Vec<String>,
}

impl DriveState {
    fn insert(&mut self, parent: Option<&str>, node: impl FnOnce(String) -> RemoteNode, content: Vec<u8>) -> String {
        self.next_id += 1;
        let id = format!("id-{}", self.next_id);
        self.order.push(id.clone());
        self.nodes.insert(
            id.clone(),
            FakeNode {
                node: node(id.clone()),
                parent: parent.map(str::to_string),
                content,
            },
        );
        id
    }

    fn visible(&self, id: &str, token: &str) -> BridgeResult<&FakeNode> {
        if self.vanished.contains(id) || (self.user_only.contains(id) && token != USER_TOKEN) {
            return Err(not_found(id));
        }
        self.nodes.get(id).ok_or_else(|| not_found(id))
    }

    fn remove_tree(&mut self, id: &str) {
        let children: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.as_deref() == Some(id))
            .map(|(child, _)| child.clone())
            .collect();
        for child in children {
            self.remove_tree(&child);
        }
        self.nodes.remove(id);
        self.order.retain(|other| other != id);
    }
}

pub fn remote_error(status: u16, reason: &str) -> BridgeError {
    BridgeError::Remote {
        status,
        reason: reason.to_string(),
        message: format!("fake {}", reason),
    }
}

fn not_found(id: &str) -> BridgeError {
    BridgeError::Remote {
        status: 404,
        reason: "notFound".to_string(),
        message: format!("File not found: {}", id),
    }
}

fn throttled() -> BridgeError {
    remote_error(403, "userRateLimitExceeded")
}

fn with_size(node: RemoteNode, len: usize) -> RemoteNode {
    match node {
        RemoteNode::File {
            id,
            name,
            mime_type,
            ..
        } => RemoteNode::File {
            id,
            name,
            mime_type,
            size: Some(len as u64),
        },
        other => other,
    }
}

/// Shared in-memory Drive.
#[derive(Clone)]
pub struct FakeDrive {
    state: Arc<Mutex<DriveState>>,
}

impl FakeDrive {
    pub fn new() -> Self {
        let drive = Self {
            state: Arc::new(Mutex::new(DriveState::default())),
        };
        {
            let mut state = drive.state.lock().unwrap();
            state.order.push("root".to_string());
            state.nodes.insert(
                "root".to_string(),
                FakeNode {
                    node: RemoteNode::Folder {
                        id: "root".to_string(),
                        name: "My Drive".to_string(),
                    },
                    parent: None,
                    content: Vec::new(),
                },
            );
        }
        drive
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        let name = name.to_string();
        self.state
            .lock()
            .unwrap()
            .insert(Some(parent), |id| RemoteNode::Folder { id, name }, Vec::new())
    }

    pub fn add_file(&self, parent: &str, name: &str, mime_type: &str, content: &[u8]) -> String {
        let (name, mime_type) = (name.to_string(), mime_type.to_string());
        let size = Some(content.len() as u64);
        self.state.lock().unwrap().insert(
            Some(parent),
            |id| RemoteNode::File {
                id,
                name,
                mime_type,
                size,
            },
            content.to_vec(),
        )
    }

    /// Native document: no size, exportable.
    pub fn add_native(&self, parent: &str, name: &str, mime_type: &str) -> String {
        let (name, mime_type) = (name.to_string(), mime_type.to_string());
        self.state.lock().unwrap().insert(
            Some(parent),
            |id| RemoteNode::File {
                id,
                name,
                mime_type,
                size: None,
            },
            Vec::new(),
        )
    }

    pub fn add_shortcut(&self, parent: &str, name: &str, target_id: &str) -> String {
        let target_mime_type = self.node(target_id).mime_type().to_string();
        let (name, target_id) = (name.to_string(), target_id.to_string());
        self.state.lock().unwrap().insert(
            Some(parent),
            |id| RemoteNode::Shortcut {
                id,
                name,
                target_id,
                target_mime_type,
            },
            Vec::new(),
        )
    }

    pub fn node(&self, id: &str) -> RemoteNode {
        self.state.lock().unwrap().nodes[id].node.clone()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(id)
    }

    pub fn content(&self, id: &str) -> Vec<u8> {
        self.state.lock().unwrap().nodes[id].content.clone()
    }

    /// Children of `parent` in creation order.
    pub fn children(&self, parent: &str) -> Vec<RemoteNode> {
        let state = self.state.lock().unwrap();
        state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .filter(|n| n.parent.as_deref() == Some(parent))
            .map(|n| n.node.clone())
            .collect()
    }

    pub fn child_named(&self, parent: &str, name: &str) -> Option<RemoteNode> {
        self.children(parent).into_iter().find(|n| n.name() == name)
    }

    /// Listed in its folder but gone when fetched.
    pub fn vanish(&self, id: &str) {
        self.state.lock().unwrap().vanished.insert(id.to_string());
    }

    /// Only the user token can see `id`.
    pub fn restrict_to_user(&self, id: &str) {
        self.state.lock().unwrap().user_only.insert(id.to_string());
    }

    /// Throttle the `index`-th (0-based) upload chunk call.
    pub fn throttle_chunk_call(&self, index: usize) {
        self.state.lock().unwrap().throttled_chunk_calls.insert(index);
    }

    /// Throttle the next `count` range downloads.
    pub fn throttle_downloads(&self, count: usize) {
        self.state.lock().unwrap().throttled_downloads = count;
    }

    /// Every chunk call made with `token` is throttled.
    pub fn throttle_token(&self, token: &str) {
        self.state.lock().unwrap().throttled_tokens.insert(token.to_string());
    }

    /// `(token, offset)` of every upload chunk call.
    pub fn chunk_calls(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().chunk_calls.clone()
    }

    pub fn sessions_started(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn grants(&self) -> Vec<String> {
        self.state.lock().unwrap().grants.clone()
    }

    pub fn store(&self, token: &str) -> FakeStore {
        FakeStore {
            drive: self.clone(),
            token: token.to_string(),
        }
    }
}

/// Store handle bound to one access token.
pub struct FakeStore {
    drive: FakeDrive,
    token: String,
}

impl FakeStore {
    fn state(&self) -> std::sync::MutexGuard<'_, DriveState> {
        self.drive.state.lock().unwrap()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn get_node(&self, id: &str) -> BridgeResult<RemoteNode> {
        let state = self.state();
        Ok(state.visible(id, &self.token)?.node.clone())
    }

    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> BridgeResult<RemotePage> {
        let children = self.drive.children(folder_id);
        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + page_size as usize).min(children.len());

        Ok(RemotePage {
            nodes: children[start..end].to_vec(),
            next_page_token: (end < children.len()).then(|| end.to_string()),
        })
    }

    async fn find_child(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: &str,
    ) -> BridgeResult<Option<RemoteNode>> {
        Ok(self
            .drive
            .children(parent_id)
            .into_iter()
            .find(|n| n.name() == name && n.mime_type() == mime_type))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> BridgeResult<RemoteNode> {
        let id = self.drive.add_folder(parent_id, name);
        Ok(self.drive.node(&id))
    }

    async fn create_file(&self, file: &NewFile) -> BridgeResult<RemoteNode> {
        let id = self
            .drive
            .add_file(&file.parent_id, &file.name, &file.mime_type, &[]);
        Ok(self.drive.node(&id))
    }

    async fn replace_content(
        &self,
        file_id: &str,
        _mime_type: &str,
        data: Bytes,
    ) -> BridgeResult<RemoteNode> {
        let mut state = self.state();
        let node = state.nodes.get_mut(file_id).ok_or_else(|| not_found(file_id))?;
        node.content = data.to_vec();
        node.node = with_size(node.node.clone(), data.len());
        Ok(node.node.clone())
    }

    async fn start_upload(&self, target: &UploadTarget, total_size: u64) -> BridgeResult<UploadSession> {
        let mut state = self.state();
        let uri = format!("session-{}", state.sessions.len() + 1);
        state.sessions.insert(
            uri.clone(),
            FakeSession {
                target: target.clone(),
                total: total_size,
                data: Vec::new(),
                result: None,
            },
        );
        Ok(UploadSession {
            uri,
            total_size,
        })
    }

    async fn upload_chunk(
        &self,
        session: &UploadSession,
        offset: u64,
        data: Bytes,
    ) -> BridgeResult<ChunkOutcome> {
        let (content, target) = {
            let mut state = self.state();
            let call = state.chunk_calls.len();
            state.chunk_calls.push((self.token.clone(), offset));
            if state.throttled_chunk_calls.contains(&call)
                || state.throttled_tokens.contains(&self.token)
            {
                return Err(throttled());
            }

            let upload = state
                .sessions
                .get_mut(&session.uri)
                .ok_or_else(|| remote_error(404, "notFound"))?;
            if offset as usize > upload.data.len() {
                return Err(remote_error(400, "badRange"));
            }
            upload.data.truncate(offset as usize);
            upload.data.extend_from_slice(&data);

            if (upload.data.len() as u64) < upload.total {
                return Ok(ChunkOutcome::Incomplete {
                    next_offset: upload.data.len() as u64,
                });
            }
            (upload.data.clone(), upload.target.clone())
        };

        let node = match target {
            UploadTarget::Create(file) => {
                let id = self
                    .drive
                    .add_file(&file.parent_id, &file.name, &file.mime_type, &content);
                self.drive.node(&id)
            }
            UploadTarget::Replace { file_id, mime_type } => {
                self.replace_content(&file_id, &mime_type, Bytes::from(content))
                    .await?
            }
        };

        if let Some(upload) = self.state().sessions.get_mut(&session.uri) {
            upload.result = Some(node.clone());
        }
        Ok(ChunkOutcome::Complete(node))
    }

    async fn query_upload(&self, session: &UploadSession) -> BridgeResult<ChunkOutcome> {
        let state = self.state();
        let upload = state
            .sessions
            .get(&session.uri)
            .ok_or_else(|| remote_error(404, "notFound"))?;
        Ok(match &upload.result {
            Some(node) => ChunkOutcome::Complete(node.clone()),
            None => ChunkOutcome::Incomplete {
                next_offset: upload.data.len() as u64,
            },
        })
    }

    async fn download_range(&self, file_id: &str, offset: u64, length: u64) -> BridgeResult<Bytes> {
        let mut state = self.state();
        if state.throttled_downloads > 0 {
            state.throttled_downloads -= 1;
            return Err(remote_error(403, "downloadQuotaExceeded"));
        }
        let content = &state.visible(file_id, &self.token)?.content;
        let start = (offset as usize).min(content.len());
        let end = (start + length as usize).min(content.len());
        Ok(Bytes::copy_from_slice(&content[start..end]))
    }

    async fn export(&self, file_id: &str, mime_type: &str) -> BridgeResult<Bytes> {
        let state = self.state();
        let node = state.visible(file_id, &self.token)?;
        Ok(Bytes::from(format!("{} as {}", node.node.name(), mime_type)))
    }

    async fn copy(&self, file_id: &str, dest_parent_id: &str) -> BridgeResult<RemoteNode> {
        let source = {
            let state = self.state();
            state.visible(file_id, &self.token)?.clone()
        };
        let id = self.drive.add_file(
            dest_parent_id,
            source.node.name(),
            source.node.mime_type(),
            &source.content,
        );
        Ok(self.drive.node(&id))
    }

    async fn delete(&self, id: &str) -> BridgeResult<()> {
        let mut state = self.state();
        if !state.nodes.contains_key(id) {
            return Err(not_found(id));
        }
        state.remove_tree(id);
        Ok(())
    }

    async fn grant_public_read(&self, id: &str) -> BridgeResult<()> {
        self.state().grants.push(id.to_string());
        Ok(())
    }

    async fn storage_quota(&self) -> BridgeResult<StorageQuota> {
        Ok(StorageQuota {
            limit: Some(15 * 1024 * 1024 * 1024),
            usage: 1024,
            usage_in_drive: 512,
            usage_in_trash: 0,
        })
    }
}

pub struct FakeFactory {
    drive: FakeDrive,
    connects: Mutex<Vec<String>>,
}

impl FakeFactory {
    pub fn new(drive: &FakeDrive) -> Self {
        Self {
            drive: drive.clone(),
            connects: Mutex::new(Vec::new()),
        }
    }

    pub fn connects(&self) -> Vec<String> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteStoreFactory for FakeFactory {
    async fn connect(&self, access_token: &str) -> BridgeResult<Arc<dyn RemoteStore>> {
        self.connects.lock().unwrap().push(access_token.to_string());
        Ok(Arc::new(self.drive.store(access_token)))
    }
}

/// Issues `token-<identity>` for pool identities and [`USER_TOKEN`] otherwise.
#[derive(Default)]
pub struct FakeCredentials;

#[async_trait]
impl CredentialProvider for FakeCredentials {
    async fn get_credentials(
        &self,
        _scopes: &[String],
        identity: Option<&Identity>,
    ) -> core_auth::Result<Credential> {
        let access_token = match identity {
            Some(identity) => format!("token-{}", identity.name()),
            None => USER_TOKEN.to_string(),
        };
        Ok(Credential {
            access_token,
            expires_at: Utc::now() + Duration::hours(1),
            identity: identity.cloned(),
        })
    }
}

/// The engine never talks HTTP directly in these tests.
pub struct UnusedHttpClient;

#[async_trait]
impl HttpClient for UnusedHttpClient {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("http".to_string()))
    }
}

/// Write `count` empty identity files into `dir`.
pub fn write_accounts(dir: &Path, count: usize) {
    for i in 0..count {
        std::fs::write(dir.join(format!("{:02}.json", i)), "{}").unwrap();
    }
}

pub fn config_builder(
    download_dir: &Path,
    file_system: Arc<dyn FileSystemAccess>,
) -> core_runtime::config::TransferConfigBuilder {
    TransferConfig::builder()
        .download_dir(download_dir)
        .http_client(Arc::new(UnusedHttpClient))
        .file_system(file_system)
}

pub fn folder_mime() -> &'static str {
    FOLDER_MIME_TYPE
}
