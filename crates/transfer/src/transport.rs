//! Transport seam between the engine and the wire client.
//!
//! The engine drives uploads through [`UploadTransport`]; the
//! `modelup-client` crate implements it over HTTP. Using a trait keeps the
//! loop decoupled from the wire and testable with mocks.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::TransferError;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, TransferError>> + Send + 'a>>;

/// Metadata registered with the server when a session is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInit {
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
}

/// Acknowledgment for one chunk send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkAck {
    /// Resolved artifact URL, present only on the acknowledgment that
    /// completes the session.
    pub completed_location: Option<String>,
}

/// Server-side durable progress, normalized to a chunk count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerProgress {
    pub chunks_received: u32,
}

/// One network exchange per method; no internal retries — retry policy
/// belongs to the caller.
///
/// Every operation takes a [`CancellationToken`] and must return
/// [`TransferError::Cancelled`] when the token fires before a response
/// arrives. A cancelled `send_chunk` has unknown server-side effect: the
/// chunk may or may not have been durably received, so resume always asks
/// `query_progress` for the truth instead of trusting local state.
pub trait UploadTransport: Send + Sync {
    /// Registers a new session and returns the server-assigned id.
    fn init_session<'a>(
        &'a self,
        init: &'a SessionInit,
        cancel: CancellationToken,
    ) -> TransportFuture<'a, String>;

    /// Uploads the chunk at `index`.
    fn send_chunk<'a>(
        &'a self,
        session_id: &'a str,
        index: u32,
        data: Vec<u8>,
        cancel: CancellationToken,
    ) -> TransportFuture<'a, ChunkAck>;

    /// Queries how many chunks the server has durably received.
    fn query_progress<'a>(
        &'a self,
        session_id: &'a str,
        total_chunks: u32,
        cancel: CancellationToken,
    ) -> TransportFuture<'a, ServerProgress>;

    /// Asks the server to discard an abandoned session. Best-effort.
    fn cleanup<'a>(&'a self, session_id: &'a str) -> TransportFuture<'a, ()>;
}
