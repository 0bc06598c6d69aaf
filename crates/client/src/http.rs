//! `reqwest`-backed implementation of the upload transport.
//!
//! Endpoint layout mirrors the server:
//!
//! - `POST   {base}/api/upload/init/`            JSON body, returns the session id
//! - `POST   {base}/api/upload/chunk/`           multipart body (`chunk`, `chunk_number`, `file_id`)
//! - `GET    {base}/api/upload/status/{id}/`     progress as a chunk count or a percentage
//! - `DELETE {base}/api/upload/cleanup/{id}/`    discards a partial upload
//!
//! Network failures carry no status code and are surfaced as retryable
//! connection errors; HTTP-level failures keep the status and any `{"error"}`
//! payload the server attached.

use std::future::Future;

use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use modelup_protocol::{
    ChunkUploadResponse, ErrorResponse, InitUploadRequest, InitUploadResponse,
    UploadStatusResponse, resolve_artifact_url,
};
use modelup_transfer::{
    ChunkAck, HttpFailure, ServerProgress, SessionInit, TransferError, TransportFuture,
    UploadTransport,
};

/// Upload transport speaking the server's REST protocol.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    media_base: String,
}

impl HttpTransport {
    /// Creates a transport for the given server base URL.
    ///
    /// Completed-artifact paths are resolved against `{base_url}/media` unless
    /// overridden with [`with_media_base`](Self::with_media_base).
    pub fn new(base_url: &str) -> Result<Self, TransferError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = reqwest::Client::builder().build().map_err(|err| {
            TransferError::Internal(format!("failed to build HTTP client: {err}"))
        })?;
        let media_base = format!("{base_url}/media");
        Ok(Self {
            http,
            base_url,
            media_base,
        })
    }

    /// Overrides the base URL used to resolve completed-artifact paths.
    pub fn with_media_base(mut self, media_base: &str) -> Self {
        self.media_base = media_base.trim_end_matches('/').to_string();
        self
    }

    async fn post_init(&self, init: &SessionInit) -> Result<String, TransferError> {
        let req = InitUploadRequest {
            filename: init.file_name.clone(),
            filesize: init.file_size,
            total_chunks: init.total_chunks,
        };
        let url = format!("{}/api/upload/init/", self.base_url);
        debug!(filename = %req.filename, chunks = req.total_chunks, "initializing upload session");
        let resp = self
            .http
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|err| TransferError::Init(request_failure(&err)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::Init(response_failure(status.as_u16(), &body)));
        }
        let parsed: InitUploadResponse = resp.json().await.map_err(|err| {
            TransferError::Init(HttpFailure::status(
                status.as_u16(),
                Some(format!("invalid init response: {err}")),
            ))
        })?;
        Ok(parsed.file_id.to_string())
    }

    async fn post_chunk(
        &self,
        session_id: &str,
        index: u32,
        data: Vec<u8>,
    ) -> Result<ChunkAck, TransferError> {
        let part = Part::bytes(data)
            .file_name("blob")
            .mime_str("application/octet-stream")
            .map_err(|err| TransferError::Internal(format!("invalid chunk part: {err}")))?;
        let form = Form::new()
            .part("chunk", part)
            .text("chunk_number", index.to_string())
            .text("file_id", session_id.to_string());
        let url = format!("{}/api/upload/chunk/", self.base_url);
        let resp = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| TransferError::Chunk(request_failure(&err)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::Chunk(response_failure(
                status.as_u16(),
                &body,
            )));
        }
        let parsed: ChunkUploadResponse = resp.json().await.map_err(|err| {
            TransferError::Chunk(HttpFailure::status(
                status.as_u16(),
                Some(format!("invalid chunk response: {err}")),
            ))
        })?;
        let completed_location = parsed
            .completed_path()
            .map(|path| resolve_artifact_url(&self.media_base, path));
        Ok(ChunkAck { completed_location })
    }

    async fn get_status(
        &self,
        session_id: &str,
        total_chunks: u32,
    ) -> Result<ServerProgress, TransferError> {
        let url = format!("{}/api/upload/status/{}/", self.base_url, session_id);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| TransferError::Status(request_failure(&err)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransferError::Status(response_failure(
                status.as_u16(),
                &body,
            )));
        }
        let parsed: UploadStatusResponse = resp.json().await.map_err(|err| {
            TransferError::Status(HttpFailure::status(
                status.as_u16(),
                Some(format!("invalid status response: {err}")),
            ))
        })?;
        let chunks_received = parsed.received_chunks(total_chunks);
        debug!(session = %session_id, chunks_received, "reconciled server progress");
        Ok(ServerProgress { chunks_received })
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), TransferError> {
        let url = format!("{}/api/upload/cleanup/{}/", self.base_url, session_id);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|err| TransferError::Status(request_failure(&err)))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(session = %session_id, status = status.as_u16(), "session cleanup refused");
            return Err(TransferError::Status(response_failure(
                status.as_u16(),
                &body,
            )));
        }
        Ok(())
    }
}

impl UploadTransport for HttpTransport {
    fn init_session<'a>(
        &'a self,
        init: &'a SessionInit,
        cancel: CancellationToken,
    ) -> TransportFuture<'a, String> {
        Box::pin(cancellable(cancel, self.post_init(init)))
    }

    fn send_chunk<'a>(
        &'a self,
        session_id: &'a str,
        index: u32,
        data: Vec<u8>,
        cancel: CancellationToken,
    ) -> TransportFuture<'a, ChunkAck> {
        Box::pin(cancellable(cancel, self.post_chunk(session_id, index, data)))
    }

    fn query_progress<'a>(
        &'a self,
        session_id: &'a str,
        total_chunks: u32,
        cancel: CancellationToken,
    ) -> TransportFuture<'a, ServerProgress> {
        Box::pin(cancellable(cancel, self.get_status(session_id, total_chunks)))
    }

    fn cleanup<'a>(&'a self, session_id: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(self.delete_session(session_id))
    }
}

/// Races an in-flight request against the pause/cancel signal.
async fn cancellable<T>(
    cancel: CancellationToken,
    op: impl Future<Output = Result<T, TransferError>>,
) -> Result<T, TransferError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = op => result,
    }
}

fn request_failure(err: &reqwest::Error) -> HttpFailure {
    match err.status() {
        Some(code) => HttpFailure::status(code.as_u16(), None),
        None => HttpFailure::no_response(),
    }
}

fn response_failure(status: u16, body: &str) -> HttpFailure {
    let server_message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|err| err.error);
    HttpFailure::status(status, server_message)
}

// ---
