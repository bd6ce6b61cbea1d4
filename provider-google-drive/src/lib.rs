//! # Google Drive Provider
//!
//! Implements the `RemoteStore` trait for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Folder listing with shortcut details, shared-drive aware
//! - Resumable chunked uploads and ranged downloads
//! - Native document export, server-side copy, permissions and quota
//! - Error bodies decoded into reason codes for throttling/not-found handling
//! - Exponential backoff for transient failures of idempotent requests

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GoogleDriveConnector, GoogleDriveStoreFactory};
pub use error::{GoogleDriveError, Result};
