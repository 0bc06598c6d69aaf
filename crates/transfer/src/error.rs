//! Error taxonomy and user-facing classification.

use std::fmt;

use serde::Serialize;

/// What the transport observed for a failed HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpFailure {
    /// Response status code; `None` when no response arrived at all.
    pub status: Option<u16>,
    /// Diagnostic from a structured server error payload, when parseable.
    pub server_message: Option<String>,
}

impl HttpFailure {
    /// A failure with no response (connection refused, timeout, DNS).
    pub fn no_response() -> Self {
        Self::default()
    }

    /// A non-success response, optionally with a parsed server diagnostic.
    pub fn status(status: u16, server_message: Option<String>) -> Self {
        Self {
            status: Some(status),
            server_message,
        }
    }
}

impl fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.server_message) {
            (None, _) => write!(f, "no response from server"),
            (Some(code), Some(msg)) => write!(f, "status {code}: {msg}"),
            (Some(code), None) => write!(f, "status {code}"),
        }
    }
}

/// Errors produced by the transfer engine and its transports.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file size {size} exceeds the {limit} byte limit")]
    SizeLimit { size: u64, limit: u64 },

    #[error("file is empty")]
    EmptyFile,

    #[error("chunk index {0} out of range")]
    ChunkOutOfRange(u32),

    #[error("session init failed: {0}")]
    Init(HttpFailure),

    #[error("chunk upload failed: {0}")]
    Chunk(HttpFailure),

    #[error("status query failed: {0}")]
    Status(HttpFailure),

    #[error("server did not confirm completion")]
    MissingCompletion,

    #[error("cancelled")]
    Cancelled,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// A failure mapped to a user-facing message plus whether the session can
/// still be resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub message: String,
    pub recoverable: bool,
}

impl ClassifiedError {
    fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: false,
        }
    }

    fn recoverable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            recoverable: true,
        }
    }
}

/// Maps an error to its user-facing classification.
///
/// Cancellation is not a failure — the engine maps it to the paused state
/// before classification; the fallback here only covers direct callers.
/// Size/empty violations are client-side precondition failures and terminal;
/// every transport-level fault leaves the session resumable.
pub fn classify(err: &TransferError) -> ClassifiedError {
    match err {
        TransferError::SizeLimit { .. } => {
            ClassifiedError::terminal("File size exceeds the maximum limit of 4GB.")
        }
        TransferError::EmptyFile => ClassifiedError::terminal("Cannot upload an empty file."),
        TransferError::Init(f) | TransferError::Chunk(f) | TransferError::Status(f) => {
            match (f.status, &f.server_message) {
                (None, _) => ClassifiedError::recoverable(
                    "No response from server. Please check your connection.",
                ),
                (Some(_), Some(msg)) => ClassifiedError::recoverable(msg.clone()),
                (Some(code), None) => {
                    ClassifiedError::recoverable(format!("Server error: {code}"))
                }
            }
        }
        TransferError::MissingCompletion => ClassifiedError::recoverable(
            "Server accepted all chunks but did not confirm completion.",
        ),
        TransferError::Json(e) => {
            ClassifiedError::recoverable(format!("Invalid server response: {e}"))
        }
        TransferError::Cancelled => ClassifiedError::recoverable("Upload cancelled."),
        TransferError::Io(e) => ClassifiedError::terminal(format!("File read failed: {e}")),
        TransferError::ChunkOutOfRange(_)
        | TransferError::InvalidTransition(_)
        | TransferError::Internal(_) => ClassifiedError::terminal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit_is_terminal() {
        let c = classify(&TransferError::SizeLimit {
            size: 5,
            limit: 4,
        });
        assert!(!c.recoverable);
        assert_eq!(c.message, "File size exceeds the maximum limit of 4GB.");
    }

    #[test]
    fn empty_file_is_terminal() {
        let c = classify(&TransferError::EmptyFile);
        assert!(!c.recoverable);
    }

    #[test]
    fn no_response_is_recoverable_with_connection_hint() {
        let c = classify(&TransferError::Chunk(HttpFailure::no_response()));
        assert!(c.recoverable);
        assert_eq!(
            c.message,
            "No response from server. Please check your connection."
        );
    }

    #[test]
    fn server_message_is_surfaced_verbatim() {
        let c = classify(&TransferError::Init(HttpFailure::status(
            400,
            Some("File upload not found".into()),
        )));
        assert!(c.recoverable);
        assert_eq!(c.message, "File upload not found");
    }

    #[test]
    fn unparseable_payload_gets_status_coded_message() {
        let c = classify(&TransferError::Status(HttpFailure::status(502, None)));
        assert!(c.recoverable);
        assert_eq!(c.message, "Server error: 502");
    }

    #[test]
    fn failure_display() {
        assert_eq!(HttpFailure::no_response().to_string(), "no response from server");
        assert_eq!(HttpFailure::status(404, None).to_string(), "status 404");
        assert_eq!(
            HttpFailure::status(400, Some("bad chunk".into())).to_string(),
            "status 400: bad chunk"
        );
    }

    #[test]
    fn local_read_failure_is_terminal() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let c = classify(&TransferError::Io(io));
        assert!(!c.recoverable);
    }
}
