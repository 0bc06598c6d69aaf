//! Session state machine: status, progress cursor and guarded transitions.

use std::sync::RwLock;

use serde::Serialize;

use crate::chunker::ChunkPlan;
use crate::error::ClassifiedError;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Lifecycle of one upload session.
///
/// `idle → uploading → {paused, error, completed}`, with `paused → uploading`
/// on resume. `completed` is terminal; `error` is terminal unless the
/// recorded error is classified recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Idle,
    Uploading,
    Paused,
    Error,
    Completed,
}

/// Point-in-time view of a session, safe to hand to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub file_name: String,
    pub status: UploadStatus,
    pub next_chunk_index: u32,
    pub total_chunks: u32,
    pub progress_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

/// Mutable progress record for one transfer (thread-safe).
///
/// Owns the status, the `next_chunk_index` cursor and the terminal outcome.
/// All transitions are guarded: an illegal transition returns
/// [`TransferError::InvalidTransition`] instead of silently no-opping.
pub struct UploadSession {
    inner: RwLock<SessionInner>,
}

struct SessionInner {
    session_id: Option<String>,
    file_name: String,
    file_size: u64,
    chunk_size: u64,
    total_chunks: u32,
    status: UploadStatus,
    next_chunk_index: u32,
    result_location: Option<String>,
    last_error: Option<ClassifiedError>,
}

impl UploadSession {
    /// Creates an idle session for a file of `file_size` bytes.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(file_name: String, file_size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let total_chunks = ChunkPlan::new(file_size, chunk_size).total_chunks();
        Self {
            inner: RwLock::new(SessionInner {
                session_id: None,
                file_name,
                file_size,
                chunk_size,
                total_chunks,
                status: UploadStatus::Idle,
                next_chunk_index: 0,
                result_location: None,
                last_error: None,
            }),
        }
    }

    /// Records the server-assigned session id. Immutable once assigned.
    pub fn attach_session_id(&self, id: String) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        if s.session_id.is_some() {
            return Err(TransferError::InvalidTransition(
                "session id already assigned".into(),
            ));
        }
        s.session_id = Some(id);
        Ok(())
    }

    /// `idle → uploading`: enters the upload loop for the first time.
    pub fn begin_upload(&self) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        if s.status != UploadStatus::Idle {
            return Err(invalid("begin upload", s.status));
        }
        s.status = UploadStatus::Uploading;
        Ok(())
    }

    /// Advances the cursor past an acknowledged chunk.
    ///
    /// The cursor is monotone: it never moves backwards and never exceeds
    /// `total_chunks`. Progress counts whole acknowledged chunks only.
    /// Permitted while paused too: a request that was in flight when the
    /// pause hit may still complete, and its receipt is truth.
    pub fn record_ack(&self, acked_index: u32) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        if !matches!(s.status, UploadStatus::Uploading | UploadStatus::Paused) {
            return Err(invalid("record acknowledgment", s.status));
        }
        s.next_chunk_index = s
            .next_chunk_index
            .max(acked_index.saturating_add(1))
            .min(s.total_chunks);
        Ok(())
    }

    /// `uploading → paused`: the in-flight request is being cancelled.
    pub fn pause(&self) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        if s.status != UploadStatus::Uploading {
            return Err(invalid("pause", s.status));
        }
        s.status = UploadStatus::Paused;
        Ok(())
    }

    /// `paused → uploading` (also `error → uploading` for recoverable
    /// errors): re-enters the loop from the reconciled cursor.
    ///
    /// `server_index` is the server-reported durable chunk count; the cursor
    /// becomes `max(local, server)` clamped to `total_chunks` — the server
    /// count is trusted and never subtracted from.
    pub fn resume_to(&self, server_index: u32) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        let resumable = s.status == UploadStatus::Paused
            || (s.status == UploadStatus::Error
                && s.last_error.as_ref().is_some_and(|e| e.recoverable));
        if !resumable {
            return Err(invalid("resume", s.status));
        }
        s.next_chunk_index = s.next_chunk_index.max(server_index).min(s.total_chunks);
        s.status = UploadStatus::Uploading;
        s.last_error = None;
        Ok(())
    }

    /// `uploading → completed`: the final acknowledgment carried the stored
    /// artifact location. The only successful end of a transfer. Also
    /// permitted while paused, for a final chunk that was in flight when the
    /// pause hit.
    pub fn complete(&self, location: String) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        if !matches!(s.status, UploadStatus::Uploading | UploadStatus::Paused) {
            return Err(invalid("complete", s.status));
        }
        s.status = UploadStatus::Completed;
        s.next_chunk_index = s.total_chunks;
        s.result_location = Some(location);
        Ok(())
    }

    /// `* → error` with a classified description. Completed sessions cannot
    /// fail retroactively.
    pub fn fail(&self, error: ClassifiedError) -> Result<(), TransferError> {
        let mut s = self.inner.write().unwrap();
        if s.status == UploadStatus::Completed {
            return Err(invalid("fail", s.status));
        }
        s.status = UploadStatus::Error;
        s.last_error = Some(error);
        Ok(())
    }

    /// `true` if a resume attempt is permitted right now.
    pub fn can_resume(&self) -> bool {
        let s = self.inner.read().unwrap();
        s.status == UploadStatus::Paused
            || (s.status == UploadStatus::Error
                && s.last_error.as_ref().is_some_and(|e| e.recoverable))
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.read().unwrap().session_id.clone()
    }

    pub fn file_name(&self) -> String {
        self.inner.read().unwrap().file_name.clone()
    }

    pub fn file_size(&self) -> u64 {
        self.inner.read().unwrap().file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.inner.read().unwrap().chunk_size
    }

    pub fn total_chunks(&self) -> u32 {
        self.inner.read().unwrap().total_chunks
    }

    /// Index of the next chunk to send.
    pub fn next_chunk_index(&self) -> u32 {
        self.inner.read().unwrap().next_chunk_index
    }

    /// Whole-chunk progress in percent, clamped to `[0, 100]`.
    pub fn progress_percent(&self) -> f64 {
        let s = self.inner.read().unwrap();
        if s.total_chunks == 0 {
            return 0.0;
        }
        (f64::from(s.next_chunk_index) / f64::from(s.total_chunks) * 100.0).clamp(0.0, 100.0)
    }

    /// Artifact location, set only once completed.
    pub fn result_location(&self) -> Option<String> {
        self.inner.read().unwrap().result_location.clone()
    }

    /// Classified error, set only while in the error state.
    pub fn last_error(&self) -> Option<ClassifiedError> {
        self.inner.read().unwrap().last_error.clone()
    }

    /// Returns a point-in-time snapshot.
    pub fn snapshot(&self) -> UploadSnapshot {
        let s = self.inner.read().unwrap();
        let percent = if s.total_chunks == 0 {
            0.0
        } else {
            (f64::from(s.next_chunk_index) / f64::from(s.total_chunks) * 100.0).clamp(0.0, 100.0)
        };
        UploadSnapshot {
            session_id: s.session_id.clone(),
            file_name: s.file_name.clone(),
            status: s.status,
            next_chunk_index: s.next_chunk_index,
            total_chunks: s.total_chunks,
            progress_percent: percent,
            result_location: s.result_location.clone(),
            error: s.last_error.clone(),
        }
    }
}

fn invalid(action: &str, status: UploadStatus) -> TransferError {
    TransferError::InvalidTransition(format!("cannot {action} while {status:?}"))
}
