//! # Host Bridge Traits
//!
//! Capability traits that the transfer engine requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the engine and concrete
//! implementations. Each trait represents a capability the engine needs but
//! that is provided from outside: real network and disk access on desktop,
//! in-memory fakes in tests.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and TLS
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Local file I/O
//!
//! ### Remote storage
//! - [`RemoteStore`](storage::RemoteStore) - Folder listing, resumable uploads, ranged downloads, copies
//! - [`RemoteStoreFactory`](storage::RemoteStoreFactory) - Builds a store bound to one access token
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The engine fails fast with descriptive errors when a required capability is missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let http_client = config.http_client
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "HttpClient".to_string(),
//!         message: "No HTTP client implementation provided. \
//!                  Enable the desktop-shims feature or inject one.".to_string()
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Remote
//! stores report failures as `BridgeError::Remote` with the store's reason code
//! so throttling and missing objects can be classified with
//! [`BridgeError::is_throttled`] and [`BridgeError::is_not_found`].
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::{
    ChunkOutcome, FileMetadata, FileSystemAccess, NewFile, RemoteNode, RemotePage, RemoteStore,
    RemoteStoreFactory, StorageQuota, UploadSession, UploadTarget, FOLDER_MIME_TYPE,
    SHORTCUT_MIME_TYPE,
};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
