//! Resumable chunked file upload with pause/resume and progress tracking.
//!
//! This crate implements the **client-side engine** for transferring one
//! large file to the upload server: splitting it into fixed-size chunks,
//! sending them strictly in order, and reconciling against server-reported
//! progress when an interrupted transfer resumes. It is a library crate with
//! no UI or HTTP dependencies — callers provide an [`UploadTransport`]
//! implementation that bridges to the actual wire client.
//!
//! # Flow
//!
//! 1. **Split** — derive the chunk layout from the file size ([`ChunkPlan`])
//! 2. **Init** — register the session with the server
//! 3. **Loop** — send chunks sequentially, one acknowledgment at a time
//! 4. **Pause/Resume** — cancel the in-flight send; on resume, query the
//!    server for durable progress and continue from the reconciled index
//! 5. **Complete** — only when the final acknowledgment carries the stored
//!    artifact location

use std::time::Duration;

pub mod chunker;
pub mod error;
pub mod session;
pub mod transport;
pub mod uploader;

// Re-export primary types for convenience.
pub use chunker::{ChunkPlan, ChunkReader, ChunkSpec};
pub use error::{ClassifiedError, HttpFailure, TransferError, classify};
pub use session::{UploadSession, UploadSnapshot, UploadStatus};
pub use transport::{ChunkAck, ServerProgress, SessionInit, TransportFuture, UploadTransport};
pub use uploader::{UploadEvent, Uploader};

/// Default chunk size: 1 MiB, agreed with the server for the session's
/// lifetime.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Maximum accepted file size: 4 GiB. Checked before any network call.
pub const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Delay inserted after each acknowledged chunk to bound request rate.
/// Pacing only — not part of transfer correctness.
pub const CHUNK_PACING: Duration = Duration::from_millis(100);
