//! Error types for Google Drive provider

use crate::types::ApiErrorResponse;
use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// API request returned an error status
    #[error("Google Drive API error (status {status_code}, reason {reason}): {message}")]
    ApiError {
        status_code: u16,
        reason: String,
        message: String,
    },

    /// A resumable upload answered with something other than 200/201/308
    #[error("Unexpected upload response: {0}")]
    InvalidUploadResponse(String),

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

impl GoogleDriveError {
    /// Decode an error response.
    ///
    /// The first entry of `error.errors` supplies the reason code. Bodies that
    /// are not the JSON envelope fall back to a reason derived from the status.
    pub fn from_response(status_code: u16, body: &[u8]) -> Self {
        match serde_json::from_slice::<ApiErrorResponse>(body) {
            Ok(envelope) => {
                let first = envelope.error.errors.into_iter().next();
                let reason = first
                    .as_ref()
                    .map(|item| item.reason.clone())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| fallback_reason(status_code).to_string());
                let message = if envelope.error.message.is_empty() {
                    first.map(|item| item.message).unwrap_or_default()
                } else {
                    envelope.error.message
                };

                GoogleDriveError::ApiError {
                    status_code,
                    reason,
                    message,
                }
            }
            Err(_) => GoogleDriveError::ApiError {
                status_code,
                reason: fallback_reason(status_code).to_string(),
                message: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }
}

fn fallback_reason(status_code: u16) -> &'static str {
    match status_code {
        401 => "authError",
        403 => "forbidden",
        404 => "notFound",
        429 => "rateLimitExceeded",
        500..=599 => "backendError",
        _ => "unknown",
    }
}

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            GoogleDriveError::ApiError {
                status_code,
                reason,
                message,
            } => BridgeError::Remote {
                status: status_code,
                reason,
                message,
            },
            GoogleDriveError::InvalidUploadResponse(msg) => {
                BridgeError::OperationFailed(format!("Unexpected upload response: {}", msg))
            }
            GoogleDriveError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            GoogleDriveError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_decoded_from_envelope() {
        let body = br#"{
            "error": {
                "code": 403,
                "message": "User rate limit exceeded.",
                "errors": [{"domain": "usageLimits", "reason": "userRateLimitExceeded", "message": "User rate limit exceeded."}]
            }
        }"#;

        let bridge: BridgeError = GoogleDriveError::from_response(403, body).into();
        assert!(bridge.is_throttled());
        assert_eq!(bridge.reason(), Some("userRateLimitExceeded"));
    }

    #[test]
    fn test_plain_body_falls_back_to_status() {
        let bridge: BridgeError = GoogleDriveError::from_response(404, b"Not Found").into();
        assert!(bridge.is_not_found());
        assert!(!bridge.is_throttled());
    }

    #[test]
    fn test_error_display() {
        let error = GoogleDriveError::ApiError {
            status_code: 404,
            reason: "notFound".to_string(),
            message: "File not found: x.".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Google Drive API error (status 404, reason notFound): File not found: x."
        );
    }

    #[test]
    fn test_parse_error_conversion() {
        let bridge: BridgeError = GoogleDriveError::ParseError("bad json".to_string()).into();
        assert!(matches!(bridge, BridgeError::OperationFailed(_)));
    }
}
