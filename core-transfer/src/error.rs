use bridge_traits::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Transfer cancelled by user")]
    Cancelled,

    #[error("All {pool_size} identities are throttled")]
    PoolExhausted { pool_size: usize },

    /// Throttled with no identity pool to fall back on.
    #[error("Throttled by remote store: {reason}")]
    Throttled { reason: String },

    #[error("File not found.")]
    NotFound { id: String },

    #[error("{0}")]
    InvalidLink(String),

    #[error("Remote store error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl TransferError {
    /// Whether the underlying remote failure was a rate or quota limit.
    pub fn is_throttled(&self) -> bool {
        matches!(self, TransferError::Bridge(e) if e.is_throttled())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            TransferError::NotFound { .. } => true,
            TransferError::Bridge(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Reason code of a remote failure, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            TransferError::Bridge(e) => e.reason(),
            TransferError::Throttled { reason } => Some(reason),
            _ => None,
        }
    }

    /// Whether retrying the job later can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransferError::PoolExhausted { .. } | TransferError::Throttled { .. }
        ) || self.is_throttled()
    }
}

impl From<core_runtime::Error> for TransferError {
    fn from(err: core_runtime::Error) -> Self {
        TransferError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
