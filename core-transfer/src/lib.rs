//! # Drive Transfer Engine
//!
//! Uploads, downloads, clones, inspects and deletes Google Drive trees.
//!
//! ## Overview
//!
//! A top-level operation runs inside a [`TransferJob`]:
//! - [`TransferWalker`] walks the local or remote tree, creating folders and
//!   keeping the counters in [`TransferStats`]
//! - [`ChunkedExecutor`] moves single files: resumable chunked uploads,
//!   ranged downloads, document exports and server-side copies
//! - [`DriveSession`] owns the job's credential and, when an accounts
//!   directory is configured, its [`ServiceAccountPool`]; throttled calls
//!   rotate to the next identity and retry the same unit of work
//!
//! ## Components
//!
//! - **Engine** (`engine`): job creation, cancellation, top-level operations
//! - **Walker** (`walker`): recursive walks and size computation
//! - **Executor** (`executor`): per-file transfers and the per-file state machine
//! - **Session / Pool** (`session`, `pool`): identity handling
//! - **Progress** (`progress`): snapshots and sinks
//! - **Export / Link / Naming**: document export table, link parsing, name helpers

pub mod engine;
pub mod error;
pub mod executor;
pub mod export;
pub mod job;
pub mod link;
pub mod naming;
pub mod pool;
pub mod progress;
pub mod session;
pub mod walker;

pub use engine::{
    CancelHandle, CloneOutcome, CloneSummary, DeleteOutcome, DownloadOutcome, DriveEngine,
    EntryKind, PropertiesOutcome, TransferJob, UploadOutcome,
};
pub use error::{Result, TransferError};
pub use executor::{ChunkedExecutor, DownloadResult, ExecutorOptions, UploadedFile};
pub use export::{export_target, ExportTarget};
pub use job::{FileTransferState, Operation, TransferJobId, TransferStats};
pub use link::drive_id_from_link;
pub use pool::ServiceAccountPool;
pub use progress::{
    ChannelProgressSink, EventBusProgressSink, NoopProgressSink, ProgressSink, ProgressSnapshot,
};
pub use session::DriveSession;
pub use walker::{TransferWalker, TreeSize};
