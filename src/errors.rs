use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("{name}: Only images and videos are allowed (detected: {mime_type})")]
    InvalidFileType { name: String, mime_type: String },

    #[error("{name}: File too large ({size_mb:.1}MB). Please keep files under {max_mb}MB.")]
    FileTooLarge {
        name: String,
        size_mb: f64,
        max_mb: u64,
    },

    #[error("{name}: File appears to be empty or corrupted")]
    EmptyFile { name: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Please select at least one file to upload")]
    EmptyBatch,

    #[error("Upload batch for session {session_id} has already started")]
    BatchAlreadyStarted { session_id: String },

    #[error("All uploads failed: {}", failures.join(", "))]
    AllUploadsFailed { failures: Vec<String> },

    #[error("Event not found: {id}")]
    EventNotFound { id: String },

    #[error("Event {id} is {status} and not accepting uploads")]
    EventClosed { id: String, status: String },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Access denied to event {event_id}")]
    AccessDenied { event_id: String },

    #[error("Owner of event {event_id} has not connected cloud storage")]
    OwnerNotConnected { event_id: String },

    #[error("Cloud storage token for the owner of event {event_id} expired")]
    DriveTokenExpired { event_id: String },
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::FileNotFound {
            path: path.to_string(),
        }
    }

    pub fn event_not_found(id: &str) -> Self {
        Self::EventNotFound { id: id.to_string() }
    }

    pub fn user_not_found(id: &str) -> Self {
        Self::UserNotFound { id: id.to_string() }
    }

    pub fn access_denied(event_id: &str) -> Self {
        Self::AccessDenied {
            event_id: event_id.to_string(),
        }
    }

    pub fn batch_already_started(session_id: &str) -> Self {
        Self::BatchAlreadyStarted {
            session_id: session_id.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::AllUploadsFailed { .. } | AppError::Io(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::FileNotFound { .. }
                | AppError::InvalidFileType { .. }
                | AppError::FileTooLarge { .. }
                | AppError::EmptyFile { .. }
                | AppError::Validation { .. }
                | AppError::EventNotFound { .. }
                | AppError::EventClosed { .. }
                | AppError::AccessDenied { .. }
        )
    }
}

/// Classification of a single file's failed upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadErrorKind {
    TooLarge,
    Timeout,
    NetworkError,
    ServerError,
    InvalidResponse,
    Unknown,
}

/// Outcome of a failed transfer. Never escapes the pipeline on its own; it is
/// folded into the batch result.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{message}")]
pub struct UploadFailure {
    pub kind: UploadErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl UploadFailure {
    /// Classify by HTTP status and error text.
    ///
    /// 413 or a "too large" message wins over everything. Any other non-2xx
    /// status is a server error, whatever its text says. Only status-less
    /// failures are matched on "timeout" (case-sensitive, so a gateway's
    /// "Gateway Timeout" reason phrase stays a server error).
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();

        let kind = if status == Some(413) || message.contains("too large") {
            UploadErrorKind::TooLarge
        } else if status.map_or(false, |s| !(200..300).contains(&s)) {
            UploadErrorKind::ServerError
        } else if message.contains("timeout") {
            UploadErrorKind::Timeout
        } else {
            UploadErrorKind::Unknown
        };

        Self {
            kind,
            status,
            message,
        }
    }

    /// Non-2xx response from the endpoint.
    pub fn from_status(status: u16, status_text: &str) -> Self {
        if status == 413 {
            Self::classify(Some(status), "File too large for server (HTTP 413)")
        } else {
            Self::classify(Some(status), format!("HTTP {}: {}", status, status_text))
        }
    }

    pub fn timeout(after: Duration) -> Self {
        let minutes = after.as_secs_f64() / 60.0;
        Self {
            kind: UploadErrorKind::Timeout,
            status: None,
            message: format!("Upload timeout after {:.1} minutes", minutes),
        }
    }

    pub fn network(detail: impl std::fmt::Display) -> Self {
        log::debug!("Network failure detail: {}", detail);
        Self {
            kind: UploadErrorKind::NetworkError,
            status: None,
            message: "Network error occurred".to_string(),
        }
    }

    pub fn invalid_response() -> Self {
        Self {
            kind: UploadErrorKind::InvalidResponse,
            status: None,
            message: "Invalid response format".to_string(),
        }
    }

    /// Map a transport error, using the timeout that was applied to the request.
    pub fn from_reqwest(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::timeout(timeout)
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), &error.to_string())
        } else if error.is_connect() || error.is_request() || error.is_body() {
            Self::network(error)
        } else if error.is_decode() {
            Self::invalid_response()
        } else {
            Self::classify(None, error.to_string())
        }
    }

    /// Short, user-facing reason used in batch summaries.
    pub fn reason(&self) -> String {
        match self.kind {
            UploadErrorKind::TooLarge => "File too large for server".to_string(),
            UploadErrorKind::Timeout => "Upload timeout".to_string(),
            UploadErrorKind::NetworkError => "Network error occurred".to_string(),
            _ => self.message.clone(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            UploadErrorKind::Timeout | UploadErrorKind::NetworkError | UploadErrorKind::ServerError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_payload_too_large() {
        let failure = UploadFailure::from_status(413, "Payload Too Large");
        assert_eq!(failure.kind, UploadErrorKind::TooLarge);
        assert_eq!(failure.reason(), "File too large for server");

        let by_message = UploadFailure::classify(None, "Request entity too large");
        assert_eq!(by_message.kind, UploadErrorKind::TooLarge);
    }

    #[test]
    fn test_classify_timeout_and_server_errors() {
        let timeout = UploadFailure::timeout(Duration::from_secs(150));
        assert_eq!(timeout.kind, UploadErrorKind::Timeout);
        assert_eq!(timeout.message, "Upload timeout after 2.5 minutes");
        assert_eq!(timeout.reason(), "Upload timeout");

        let server = UploadFailure::from_status(500, "Internal Server Error");
        assert_eq!(server.kind, UploadErrorKind::ServerError);
        assert_eq!(server.reason(), "HTTP 500: Internal Server Error");
        assert!(server.is_retryable());

        let by_text = UploadFailure::classify(None, "connection timeout");
        assert_eq!(by_text.kind, UploadErrorKind::Timeout);

        let unknown = UploadFailure::classify(None, "something odd");
        assert_eq!(unknown.kind, UploadErrorKind::Unknown);
        assert_eq!(unknown.reason(), "something odd");
    }

    #[test]
    fn test_gateway_timeouts_are_server_errors() {
        let gateway = UploadFailure::from_status(504, "Gateway Timeout");
        assert_eq!(gateway.kind, UploadErrorKind::ServerError);
        assert_eq!(gateway.status, Some(504));
        assert_eq!(gateway.reason(), "HTTP 504: Gateway Timeout");

        let request = UploadFailure::from_status(408, "Request Timeout");
        assert_eq!(request.kind, UploadErrorKind::ServerError);
        assert_eq!(request.reason(), "HTTP 408: Request Timeout");

        assert_eq!(
            UploadFailure::classify(None, "Upload Timeout").kind,
            UploadErrorKind::Unknown
        );
    }

    #[test]
    fn test_all_uploads_failed_lists_every_failure() {
        let error = AppError::AllUploadsFailed {
            failures: vec![
                "a.jpg (1.0MB): Upload timeout".to_string(),
                "b.mp4 (90.0MB): File too large for server".to_string(),
            ],
        };

        assert_eq!(
            error.to_string(),
            "All uploads failed: a.jpg (1.0MB): Upload timeout, b.mp4 (90.0MB): File too large for server"
        );
        assert!(error.is_retryable());
        assert!(!error.is_permanent());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(AppError::EmptyFile { name: "a.jpg".into() }.is_permanent());
        assert!(AppError::access_denied("evt").is_permanent());
        assert!(!AppError::access_denied("evt").is_retryable());
        assert!(!AppError::Internal("boom".into()).is_permanent());
        assert!(!AppError::Config("bad".into()).is_retryable());
    }
}
