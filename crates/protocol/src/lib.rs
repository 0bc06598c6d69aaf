//! Wire protocol types for the modelup upload API.
//!
//! The upload server exposes a small REST surface: session init, chunk
//! upload, progress query and session cleanup. This crate holds the
//! request/response payloads for those endpoints plus the helpers that
//! smooth over the server's wire quirks (numeric session ids, two status
//! response shapes, relative artifact paths).

pub mod messages;
pub mod types;

pub use messages::{
    ChunkUploadResponse, ErrorResponse, InitUploadRequest, InitUploadResponse, SessionId,
    UploadStatusResponse,
};
pub use types::{UPLOAD_STATUS_COMPLETED, resolve_artifact_url};
