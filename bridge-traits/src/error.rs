use thiserror::Error;

/// Reason codes the remote store uses to signal quota or rate throttling.
pub const THROTTLING_REASONS: &[&str] = &[
    "userRateLimitExceeded",
    "dailyLimitExceeded",
    "downloadQuotaExceeded",
];

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Structured failure returned by a remote store, carrying the
    /// machine-readable reason code (e.g. `userRateLimitExceeded`, `notFound`).
    #[error("Remote store error (status {status}, reason {reason}): {message}")]
    Remote {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Reason code of a remote failure, if this is one.
    pub fn reason(&self) -> Option<&str> {
        match self {
            BridgeError::Remote { reason, .. } => Some(reason.as_str()),
            _ => None,
        }
    }

    /// Whether the remote store rejected the call because of rate or quota limits.
    pub fn is_throttled(&self) -> bool {
        self.reason()
            .map(|reason| THROTTLING_REASONS.contains(&reason))
            .unwrap_or(false)
    }

    /// Whether the remote object does not exist (or is not visible to the identity).
    pub fn is_not_found(&self) -> bool {
        match self {
            BridgeError::Remote { status, reason, .. } => *status == 404 || reason == "notFound",
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16, reason: &str) -> BridgeError {
        BridgeError::Remote {
            status,
            reason: reason.to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_throttling_classification() {
        assert!(remote(403, "userRateLimitExceeded").is_throttled());
        assert!(remote(403, "dailyLimitExceeded").is_throttled());
        assert!(remote(403, "downloadQuotaExceeded").is_throttled());
        assert!(!remote(403, "insufficientFilePermissions").is_throttled());
        assert!(!BridgeError::OperationFailed("x".into()).is_throttled());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(remote(404, "notFound").is_not_found());
        assert!(remote(404, "unknown").is_not_found());
        assert!(!remote(403, "userRateLimitExceeded").is_not_found());
    }
}
