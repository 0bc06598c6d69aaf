use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::UPLOAD_STATUS_COMPLETED;

// ---------------------------------------------------------------------------
// Session identifier
// ---------------------------------------------------------------------------

/// Opaque server-assigned session identifier.
///
/// The reference server stores sessions in a database and returns the row id
/// as a JSON number; other deployments return string ids. Both deserialize
/// into the same type, and the id is always sent back as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(String);

impl SessionId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = SessionId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer session id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<SessionId, E> {
                Ok(SessionId(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<SessionId, E> {
                Ok(SessionId(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<SessionId, E> {
                Ok(SessionId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Starts a new upload session.
///
/// `POST /api/upload/init/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub filename: String,
    pub filesize: u64,
    pub total_chunks: u32,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Response to session init.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitUploadResponse {
    pub file_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Acknowledgment for one uploaded chunk.
///
/// The server reports `upload_status == "completed"` together with a
/// `file_path` on the acknowledgment of the final chunk; that pair is the
/// only completion signal in the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl ChunkUploadResponse {
    /// Returns the stored artifact path when this acknowledgment signals
    /// session completion, `None` otherwise.
    ///
    /// Both conditions must hold: a "completed" upload status without a path
    /// is not a completion.
    pub fn completed_path(&self) -> Option<&str> {
        match (self.upload_status.as_deref(), self.file_path.as_deref()) {
            (Some(UPLOAD_STATUS_COMPLETED), Some(path)) => Some(path),
            _ => None,
        }
    }
}

/// Response to a progress query.
///
/// `GET /api/upload/status/{file_id}/`
///
/// Deployed servers answer in one of two shapes: `{chunks_received}` or
/// `{status, progress}` with `progress` as a percentage. Both normalize to
/// a chunk count via [`received_chunks`](Self::received_chunks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_received: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

impl UploadStatusResponse {
    /// Normalizes either response shape to a count of durably received
    /// chunks, clamped to `[0, total_chunks]`.
    ///
    /// An explicit `chunks_received` wins over a percentage. Percentages are
    /// server-derived from an exact count, so rounding back recovers it.
    pub fn received_chunks(&self, total_chunks: u32) -> u32 {
        if let Some(n) = self.chunks_received {
            return n.min(u64::from(total_chunks)) as u32;
        }
        if let Some(pct) = self.progress {
            let count = (pct / 100.0 * f64::from(total_chunks)).round();
            return count.clamp(0.0, f64::from(total_chunks)) as u32;
        }
        0
    }
}

/// Structured error payload returned on non-success responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
