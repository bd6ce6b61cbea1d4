use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication failed for {identity}: {reason}")]
    AuthenticationFailed { identity: String, reason: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// No credential could be produced for the requested identity.
    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("Invalid credential file {path}: {reason}")]
    InvalidCredentialFile { path: String, reason: String },

    #[error("OAuth state mismatch (expected {expected}, got {actual})")]
    StateMismatch { expected: String, actual: String },

    #[error("Invalid authorization code: {0}")]
    InvalidAuthCode(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
