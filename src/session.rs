//! One request/response cycle, from opening the stream to its terminal event.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::dispatch::{Accumulator, Dispatch};
use crate::event::parse_event;
use crate::model::{FinalResult, Mode, StreamRequest};
use crate::options::SessionOptions;
use crate::sse::SseStreamExt;
use crate::status::SessionStatus;
use crate::transport::Transport;

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Request failed, non-success status, missing body, or the body broke off.
    #[error("{0}")]
    Transport(String),

    /// The stream carried an `error` event.
    #[error("{0}")]
    Upstream(String),

    /// The body ended before any terminal event.
    #[error("stream ended without terminal event")]
    Incomplete,
}

/// What the presentation layer receives from a session.
///
/// Any number of `Progress` snapshots, then exactly one `Finished` or
/// `Failed`. A cancelled session closes the channel without a terminal update.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Progress {
        status_text: String,
        partial_answer: String,
    },
    Finished(FinalResult),
    Failed(FailureReason),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Finished(FinalResult),
    Failed(FailureReason),
    Cancelled,
}

/// Starts streaming sessions.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use streamchat::model::StreamRequest;
/// use streamchat::options::{SessionOptions, TransportOptions};
/// use streamchat::session::{SessionUpdate, StreamSession};
/// use streamchat::transport::HttpTransport;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(HttpTransport::new(TransportOptions::default())?);
/// let mut handle = StreamSession::start(
///     transport,
///     StreamRequest::question("What is our refund policy?"),
///     CancellationToken::new(),
///     &SessionOptions::default(),
/// )?;
///
/// while let Some(update) = handle.next_update().await {
///     if let SessionUpdate::Progress { partial_answer, .. } = update {
///         println!("{}", partial_answer);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct StreamSession;

impl StreamSession {
    /// Spawn a session on the current tokio runtime.
    ///
    /// `cancel` stays owned by the caller; cancelling it, calling
    /// [`SessionHandle::cancel`] or dropping the handle stops the session.
    pub fn start(
        transport: Arc<dyn Transport>,
        request: StreamRequest,
        cancel: CancellationToken,
        options: &SessionOptions,
    ) -> Result<SessionHandle, ClientError> {
        let (status_tx, _) = watch::channel(SessionStatus::idle());
        Self::start_with_status(transport, request, cancel, options, Arc::new(status_tx))
    }

    pub(crate) fn start_with_status(
        transport: Arc<dyn Transport>,
        request: StreamRequest,
        cancel: CancellationToken,
        options: &SessionOptions,
        status: Arc<watch::Sender<SessionStatus>>,
    ) -> Result<SessionHandle, ClientError> {
        request.validate()?;

        let mode = request.mode();
        status.send_modify(|s| s.begin(options.initial_status.clone()));
        info!(mode = %mode, "stream session started");

        let (tx, rx) = mpsc::channel(options.update_buffer.max(1));
        let finished = CancellationToken::new();
        let status_rx = status.subscribe();
        let cancel = cancel.child_token();

        let task = tokio::spawn(run_session(SessionTask {
            transport,
            request,
            cancel: cancel.clone(),
            status,
            updates: tx,
            initial_status: options.initial_status.clone(),
            _finished: finished.clone().drop_guard(),
        }));

        Ok(SessionHandle {
            mode,
            _abandoned: cancel.clone().drop_guard(),
            cancel,
            finished,
            status: status_rx,
            updates: rx,
            task,
        })
    }
}

/// Caller's view of a running session.
pub struct SessionHandle {
    mode: Mode,
    cancel: CancellationToken,
    finished: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    updates: mpsc::Receiver<SessionUpdate>,
    task: JoinHandle<SessionOutcome>,
    // Dropping the handle stops the session.
    _abandoned: DropGuard,
}

impl SessionHandle {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Stop the session. No-op once it has ended. The token passed to
    /// `start` is left untouched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that is notified on every status change.
    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Whether the session task has exited.
    pub fn is_done(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Next update, or `None` once the session has ended.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        self.updates.recv().await
    }

    /// Wait for the session to end and return its outcome.
    ///
    /// Updates not yet received are discarded.
    pub async fn finish(self) -> SessionOutcome {
        drop(self.updates);
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => SessionOutcome::Failed(FailureReason::Transport(format!(
                "session task failed: {}",
                e
            ))),
        }
    }

    pub(crate) fn finished_token(&self) -> CancellationToken {
        self.finished.clone()
    }
}

struct SessionTask {
    transport: Arc<dyn Transport>,
    request: StreamRequest,
    cancel: CancellationToken,
    status: Arc<watch::Sender<SessionStatus>>,
    updates: mpsc::Sender<SessionUpdate>,
    initial_status: String,
    // Cancelled when the task exits, even by panic.
    _finished: DropGuard,
}

impl SessionTask {
    fn cancelled(&self) -> SessionOutcome {
        self.status.send_if_modified(|s| s.cancel());
        info!("stream session cancelled");
        SessionOutcome::Cancelled
    }

    async fn fail(&self, reason: FailureReason) -> SessionOutcome {
        warn!(error = %reason, "stream session failed");
        self.status.send_if_modified(|s| s.fail(reason.to_string()));
        self.deliver(SessionUpdate::Failed(reason.clone())).await;
        SessionOutcome::Failed(reason)
    }

    async fn finish(&self, result: FinalResult) -> SessionOutcome {
        info!("stream session completed");
        self.status.send_if_modified(|s| s.complete());
        self.deliver(SessionUpdate::Finished(result.clone())).await;
        SessionOutcome::Finished(result)
    }

    /// Wait for room for the terminal update, unless the session is
    /// cancelled first. The status already holds the outcome by then.
    async fn deliver(&self, update: SessionUpdate) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("terminal update dropped, session cancelled");
            }
            _ = self.updates.send(update) => {}
        }
    }

    fn progress(&self, acc: &Accumulator) {
        self.status
            .send_if_modified(|s| s.set_status_text(acc.status_text()));
        // Snapshots carry the whole answer so far; dropping one under
        // backpressure loses nothing the next one does not repeat.
        let _ = self.updates.try_send(SessionUpdate::Progress {
            status_text: acc.status_text().to_string(),
            partial_answer: acc.text().to_string(),
        });
    }
}

async fn run_session(task: SessionTask) -> SessionOutcome {
    let mode = task.request.mode();

    let opened = tokio::select! {
        biased;
        _ = task.cancel.cancelled() => return task.cancelled(),
        opened = task.transport.open(&task.request) => opened,
    };

    let response = match opened {
        Ok(response) => response,
        Err(e) => return task.fail(FailureReason::Transport(e.to_string())).await,
    };

    if !response.status.is_success() {
        let err = ClientError::Status {
            status: response.status.as_u16(),
            body: String::new(),
        };
        return task.fail(FailureReason::Transport(err.to_string())).await;
    }

    let Some(body) = response.body else {
        return task
            .fail(FailureReason::Transport(ClientError::MissingBody.to_string()))
            .await;
    };

    let mut records = Box::pin(body.sse_records());
    let mut acc = Accumulator::new(mode, task.initial_status.clone());

    loop {
        let next = tokio::select! {
            biased;
            _ = task.cancel.cancelled() => return task.cancelled(),
            next = records.next() => next,
        };

        let record = match next {
            Some(Ok(record)) => record,
            Some(Err(e)) => return task.fail(FailureReason::Transport(e.to_string())).await,
            None => return task.fail(FailureReason::Incomplete).await,
        };

        let event = match parse_event(mode, &record.data) {
            Ok(event) => event,
            Err(failure) => {
                warn!(error = %failure, payload = %record.data, "dropping stream record");
                continue;
            }
        };
        debug!(kind = %event.kind(), "dispatching stream event");

        match acc.on_event(event) {
            Dispatch::Continue => task.progress(&acc),
            Dispatch::Finished(result) => return task.finish(result).await,
            Dispatch::Failed(message) => {
                return task.fail(FailureReason::Upstream(message)).await
            }
            Dispatch::Ignored => {}
        }
    }
}
