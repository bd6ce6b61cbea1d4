//! # Transfer Job Bookkeeping
//!
//! Identifiers, the per-file state machine and the counters a job
//! accumulates while it walks a tree.
//!
//! ## Per-file state machine
//!
//! ```text
//! Pending → InProgress → Completed
//!              ↓  ↑    ↘
//!           Throttled    Failed / Cancelled
//! ```
//!
//! `Throttled → InProgress` happens after the session switched identity;
//! the number of round trips is bounded by the pool size.

use crate::{Result, TransferError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a transfer job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferJobId(Uuid);

impl TransferJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| TransferError::InvalidJobId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TransferJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TransferJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Top-level operation a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
    Clone,
    Properties,
    Delete,
    Quota,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::Clone => "clone",
            Operation::Properties => "properties",
            Operation::Delete => "delete",
            Operation::Quota => "quota",
        }
    }
}

// ============================================================================
// Per-file state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTransferState {
    Pending,
    InProgress,
    /// Waiting for the session to switch identity
    Throttled,
    Completed,
    Cancelled,
    Failed,
}

impl FileTransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileTransferState::Completed | FileTransferState::Cancelled | FileTransferState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileTransferState::Pending => "pending",
            FileTransferState::InProgress => "in_progress",
            FileTransferState::Throttled => "throttled",
            FileTransferState::Completed => "completed",
            FileTransferState::Cancelled => "cancelled",
            FileTransferState::Failed => "failed",
        }
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn transition(self, to: FileTransferState) -> Result<FileTransferState> {
        use FileTransferState::*;

        let valid = match (self, to) {
            // From Pending
            (Pending, InProgress) => true,
            (Pending, Cancelled) => true,
            (Pending, Failed) => true,

            // From InProgress
            (InProgress, Throttled) => true,
            (InProgress, Completed) => true,
            (InProgress, Cancelled) => true,
            (InProgress, Failed) => true,

            // From Throttled
            (Throttled, InProgress) => true,
            (Throttled, Cancelled) => true,
            (Throttled, Failed) => true,

            // Terminal states cannot transition
            _ => false,
        };

        if !valid {
            return Err(TransferError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }

        Ok(to)
    }
}

// ============================================================================
// Counters
// ============================================================================

/// Counters accumulated while a job walks a tree.
///
/// Passed `&mut` down the walk; every counter only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    /// Files transferred (or counted, for size computation)
    pub total_files: u64,
    pub total_folders: u64,
    /// Bytes known to be part of the job
    pub total_bytes: u64,
    /// Bytes actually moved
    pub transferred_bytes: u64,
    /// Remote ids that could not be fetched
    pub failed: Vec<String>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce `bytes` about to be transferred.
    pub fn expect_bytes(&mut self, bytes: u64) {
        self.total_bytes += bytes;
    }

    /// Record a finished file of `bytes`.
    pub fn record_file(&mut self, bytes: u64) {
        self.total_files += 1;
        self.transferred_bytes += bytes;
        if self.transferred_bytes > self.total_bytes {
            self.total_bytes = self.transferred_bytes;
        }
    }

    pub fn record_folder(&mut self) {
        self.total_folders += 1;
    }

    pub fn record_failure(&mut self, id: impl Into<String>) {
        self.failed.push(id.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_round_trip() {
        let id = TransferJobId::new();
        let parsed = TransferJobId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(TransferJobId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = FileTransferState::Pending
            .transition(FileTransferState::InProgress)
            .unwrap()
            .transition(FileTransferState::Throttled)
            .unwrap()
            .transition(FileTransferState::InProgress)
            .unwrap()
            .transition(FileTransferState::Completed)
            .unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(FileTransferState::Pending
            .transition(FileTransferState::Completed)
            .is_err());
        assert!(FileTransferState::Completed
            .transition(FileTransferState::InProgress)
            .is_err());

        match FileTransferState::Cancelled.transition(FileTransferState::Pending) {
            Err(TransferError::InvalidStateTransition { from, to }) => {
                assert_eq!(from, "cancelled");
                assert_eq!(to, "pending");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_stats_accumulate() {
        let mut stats = TransferStats::new();
        stats.expect_bytes(10);
        stats.record_file(10);
        stats.record_file(0);
        stats.record_folder();
        stats.record_failure("gone");

        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_folders, 1);
        assert_eq!(stats.transferred_bytes, 10);
        assert!(stats.transferred_bytes <= stats.total_bytes);
        assert_eq!(stats.failed, vec!["gone".to_string()]);
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Clone.as_str(), "clone");
        assert_eq!(Operation::Quota.as_str(), "quota");
    }
}
