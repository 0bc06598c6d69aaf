//! Sequential upload loop with pause/resume and cancellation.
//!
//! One [`Uploader`] drives one session. The loop is cooperative and strictly
//! sequential: chunk *n + 1* is never sent before chunk *n*'s response is
//! observed, which keeps the resume point trivially consistent.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunker::ChunkReader;
use crate::error::{TransferError, classify};
use crate::session::{UploadSession, UploadSnapshot, UploadStatus};
use crate::transport::{SessionInit, UploadTransport};
use crate::{CHUNK_PACING, DEFAULT_CHUNK_SIZE, MAX_FILE_SIZE};

/// Notifications emitted by the upload loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Started {
        session_id: String,
        total_chunks: u32,
    },
    Progress {
        chunk_index: u32,
        percent: f64,
    },
    Paused {
        next_chunk_index: u32,
    },
    Resumed {
        from_chunk: u32,
    },
    Completed {
        location: String,
    },
    Failed {
        message: String,
        recoverable: bool,
    },
}

/// File handle state owned by the active loop.
///
/// The mutex around it doubles as the single-loop guard: `start()` and
/// `resume()` hold it for the whole leg, so a second loop on the same
/// session cannot start.
struct IoState {
    reader: Option<ChunkReader>,
}

/// Drives one resumable upload session end to end.
pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    session: Mutex<Option<Arc<UploadSession>>>,
    io: tokio::sync::Mutex<IoState>,
    cancel: Mutex<CancellationToken>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<UploadEvent>>>,
    chunk_size: u64,
    pacing: Duration,
}

impl Uploader {
    /// Creates an uploader over the given transport.
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            transport,
            session: Mutex::new(None),
            io: tokio::sync::Mutex::new(IoState { reader: None }),
            cancel: Mutex::new(CancellationToken::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: CHUNK_PACING,
        }
    }

    /// Overrides the chunk size (ignored if 0). The size is fixed for the
    /// session's lifetime once `start()` runs.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    /// Overrides the inter-chunk pacing delay.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.lock().unwrap().take()
    }

    /// Returns the session state machine, if a transfer was started.
    pub fn session(&self) -> Option<Arc<UploadSession>> {
        self.session.lock().unwrap().clone()
    }

    /// Returns a point-in-time snapshot of the session.
    pub fn snapshot(&self) -> Option<UploadSnapshot> {
        self.session().map(|s| s.snapshot())
    }

    /// Starts a new transfer of `path` and runs the upload loop until it
    /// completes, pauses or fails.
    ///
    /// The size preconditions are checked before any network call; a file
    /// over 4 GiB (or empty) moves the session straight to the error state.
    /// Returns `Ok(())` on completion *and* on pause — check the session
    /// status to distinguish them.
    pub async fn start(&self, path: &Path) -> Result<(), TransferError> {
        let mut io = self.io.try_lock().map_err(|_| {
            TransferError::InvalidTransition("an upload loop is already running".into())
        })?;
        if self.session.lock().unwrap().is_some() {
            return Err(TransferError::InvalidTransition(
                "upload already started; create a new uploader to retry from scratch".into(),
            ));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let file_size = tokio::fs::metadata(path).await?.len();

        let session = Arc::new(UploadSession::new(
            file_name.clone(),
            file_size,
            self.chunk_size,
        ));
        *self.session.lock().unwrap() = Some(Arc::clone(&session));

        if file_size > MAX_FILE_SIZE {
            let err = TransferError::SizeLimit {
                size: file_size,
                limit: MAX_FILE_SIZE,
            };
            return Err(self.reject(&session, err).await);
        }
        if file_size == 0 {
            return Err(self.reject(&session, TransferError::EmptyFile).await);
        }

        let reader = {
            let path = path.to_path_buf();
            let chunk_size = self.chunk_size;
            tokio::task::spawn_blocking(move || ChunkReader::open(&path, chunk_size))
                .await
                .map_err(|e| TransferError::Internal(format!("task join error: {e}")))??
        };

        let cancel = self.fresh_token();
        let init = SessionInit {
            file_name,
            file_size,
            total_chunks: reader.plan().total_chunks(),
        };
        let session_id = match self.transport.init_session(&init, cancel).await {
            Ok(id) => id,
            Err(e) => return self.finish_leg(&session, Err(e)).await,
        };
        session.attach_session_id(session_id.clone())?;
        session.begin_upload()?;
        info!(
            session = %session_id,
            size = file_size,
            chunks = init.total_chunks,
            "upload session initialized"
        );
        self.emit(UploadEvent::Started {
            session_id,
            total_chunks: init.total_chunks,
        })
        .await;

        io.reader = Some(reader);
        let result = self.run_loop(&session, &mut io).await;
        self.finish_leg(&session, result).await
    }

    /// Pauses the running upload: cancels the in-flight request and leaves
    /// the session resumable. Errors unless the session is uploading.
    ///
    /// The request already in flight may still land on the server — that is
    /// fine; `resume()` re-derives the cursor from the server either way.
    pub fn pause(&self) -> Result<(), TransferError> {
        let session = self.require_session()?;
        session.pause()?;
        self.current_token().cancel();
        Ok(())
    }

    /// Resumes a paused (or recoverably failed) transfer.
    ///
    /// Always queries the server for durable progress first and continues
    /// from `max(local, server)` — client memory alone is never trusted,
    /// since a cancelled send has unknown server-side effect.
    pub async fn resume(&self) -> Result<(), TransferError> {
        let mut io = self.io.try_lock().map_err(|_| {
            TransferError::InvalidTransition("an upload loop is already running".into())
        })?;
        let session = self.require_session()?;
        if !session.can_resume() {
            return Err(TransferError::InvalidTransition(format!(
                "cannot resume while {:?}",
                session.status()
            )));
        }
        if io.reader.is_none() {
            return Err(TransferError::InvalidTransition(
                "no file attached to this uploader".into(),
            ));
        }
        let session_id = session
            .session_id()
            .ok_or_else(|| TransferError::InvalidTransition("session has no id".into()))?;

        let cancel = self.fresh_token();
        let progress = match self
            .transport
            .query_progress(&session_id, session.total_chunks(), cancel)
            .await
        {
            Ok(p) => p,
            Err(e) => return self.finish_leg(&session, Err(e)).await,
        };

        let local = session.next_chunk_index();
        session.resume_to(progress.chunks_received)?;
        let from_chunk = session.next_chunk_index();
        info!(
            session = %session_id,
            local,
            server = progress.chunks_received,
            from_chunk,
            "resume reconciled against server progress"
        );
        self.emit(UploadEvent::Resumed { from_chunk }).await;

        let result = self.run_loop(&session, &mut io).await;
        self.finish_leg(&session, result).await
    }

    /// Cancels any in-flight request and asks the server to discard the
    /// session. For caller teardown; safe in any state.
    pub async fn abandon(&self) -> Result<(), TransferError> {
        self.current_token().cancel();
        let session_id = self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.session_id());
        if let Some(id) = session_id {
            debug!(session = %id, "cleaning up abandoned session");
            self.transport.cleanup(&id).await?;
        }
        Ok(())
    }

    /// One leg of the sequential loop: sends chunks from the current cursor
    /// until completion, pause or error.
    async fn run_loop(
        &self,
        session: &UploadSession,
        io: &mut IoState,
    ) -> Result<(), TransferError> {
        let session_id = session
            .session_id()
            .ok_or_else(|| TransferError::InvalidTransition("session has no id".into()))?;
        let cancel = self.current_token();
        // Signalled on every exit path: completion, pause, error, teardown.
        let _signal_on_exit = cancel.clone().drop_guard();

        let total = session.total_chunks();
        while session.status() == UploadStatus::Uploading {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            let index = session.next_chunk_index();
            if index >= total {
                // All chunks acknowledged but the completion signal never
                // arrived; resume re-queries the server for the truth.
                warn!(session = %session_id, total, "ran out of chunks without completion");
                return Err(TransferError::MissingCompletion);
            }

            let mut reader = io.reader.take().ok_or_else(|| {
                TransferError::InvalidTransition("no file attached to this uploader".into())
            })?;
            let (reader, read) = tokio::task::spawn_blocking(move || {
                let read = reader.read_chunk(index);
                (reader, read)
            })
            .await
            .map_err(|e| TransferError::Internal(format!("task join error: {e}")))?;
            io.reader = Some(reader);
            let data = read?;

            let ack = self
                .transport
                .send_chunk(&session_id, index, data, cancel.clone())
                .await?;
            session.record_ack(index)?;
            let percent = session.progress_percent();
            debug!(session = %session_id, chunk = index, percent, "chunk acknowledged");
            self.emit(UploadEvent::Progress {
                chunk_index: index,
                percent,
            })
            .await;

            if let Some(location) = ack.completed_location {
                session.complete(location.clone())?;
                info!(session = %session_id, %location, "upload completed");
                self.emit(UploadEvent::Completed { location }).await;
                return Ok(());
            }

            // Inter-chunk pacing, cancellable like the send itself.
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(self.pacing) => {}
            }
        }
        Ok(())
    }

    /// Settles a finished leg: cancellation maps to paused, everything else
    /// to a classified failure.
    async fn finish_leg(
        &self,
        session: &UploadSession,
        result: Result<(), TransferError>,
    ) -> Result<(), TransferError> {
        match result {
            Ok(()) => {
                if session.status() == UploadStatus::Paused {
                    self.emit(UploadEvent::Paused {
                        next_chunk_index: session.next_chunk_index(),
                    })
                    .await;
                }
                Ok(())
            }
            Err(TransferError::Cancelled) => {
                // Cancellation is not a failure; it maps to paused.
                if session.status() == UploadStatus::Uploading {
                    session.pause()?;
                }
                if session.status() == UploadStatus::Paused {
                    debug!(next = session.next_chunk_index(), "upload paused");
                    self.emit(UploadEvent::Paused {
                        next_chunk_index: session.next_chunk_index(),
                    })
                    .await;
                }
                Ok(())
            }
            Err(err) => {
                let classified = classify(&err);
                error!(
                    error = %err,
                    recoverable = classified.recoverable,
                    "upload leg failed"
                );
                session.fail(classified.clone())?;
                self.emit(UploadEvent::Failed {
                    message: classified.message,
                    recoverable: classified.recoverable,
                })
                .await;
                Err(err)
            }
        }
    }

    /// Records a precondition failure that happens before any network call.
    async fn reject(&self, session: &UploadSession, err: TransferError) -> TransferError {
        let classified = classify(&err);
        warn!(error = %err, "upload rejected before init");
        // A fresh idle session always accepts the failure transition.
        let _ = session.fail(classified.clone());
        self.emit(UploadEvent::Failed {
            message: classified.message,
            recoverable: classified.recoverable,
        })
        .await;
        err
    }

    fn require_session(&self) -> Result<Arc<UploadSession>, TransferError> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransferError::InvalidTransition("no upload started".into()))
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();
        token
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }

    async fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.send(event).await;
    }
}

impl Drop for Uploader {
    fn drop(&mut self) {
        // Teardown guarantee: an in-flight request is never leaked.
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }
}
