//! Chat client and error types.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{BlockSseRequest, StreamRequest};
use crate::options::{SessionOptions, TransportOptions};
use crate::session::{SessionHandle, StreamSession};
use crate::status::SessionStatus;
use crate::transport::{HttpTransport, Transport};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP error: status {status}")]
    Status { status: u16, body: String },

    #[error("Response body is missing")]
    MissingBody,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error ({kind}) for block {block_id}")]
    Api {
        kind: String,
        block_id: String,
        trace_id: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

struct ActiveSession {
    cancel: CancellationToken,
    finished: CancellationToken,
}

/// Runs streaming sessions one at a time against a [`Transport`].
///
/// Starting a request while another is in flight cancels the earlier one and
/// waits for it to wind down, so the shared status only ever has one writer.
///
/// # Example
/// ```no_run
/// use streamchat::client::ChatClient;
/// use streamchat::options::TransportOptions;
/// use streamchat::session::SessionOutcome;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ChatClient::http(TransportOptions::from_env())?;
/// let handle = client.ask("How do I reset my password?").await?;
/// if let SessionOutcome::Finished(result) = handle.finish().await {
///     println!("{:?}", result);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatClient {
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    status: Arc<watch::Sender<SessionStatus>>,
    active: Mutex<Option<ActiveSession>>,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn Transport>, options: SessionOptions) -> Self {
        let (status, _) = watch::channel(SessionStatus::idle());
        Self {
            transport,
            options,
            status: Arc::new(status),
            active: Mutex::new(None),
        }
    }

    /// Client over HTTP with default session options.
    pub fn http(transport_options: TransportOptions) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(transport_options)?;
        Ok(Self::new(Arc::new(transport), SessionOptions::default()))
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Current status of the latest session.
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change, across sessions.
    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Ask a question in answer mode.
    pub async fn ask(&self, message: impl Into<String>) -> Result<SessionHandle, ClientError> {
        self.start(StreamRequest::question(message)).await
    }

    /// Generate a block in artifact mode.
    pub async fn generate_block(&self, request: BlockSseRequest) -> Result<SessionHandle, ClientError> {
        self.start(StreamRequest::Artifact(request)).await
    }

    /// Start a session with a fresh cancellation token.
    pub async fn start(&self, request: StreamRequest) -> Result<SessionHandle, ClientError> {
        self.start_with_token(request, CancellationToken::new()).await
    }

    /// Start a session the caller can also cancel through `cancel`.
    pub async fn start_with_token(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<SessionHandle, ClientError> {
        request.validate()?;

        let mut active = self.active.lock().await;
        if let Some(prior) = active.take() {
            stop(prior).await;
        }

        let handle = StreamSession::start_with_status(
            self.transport.clone(),
            request,
            cancel,
            &self.options,
            self.status.clone(),
        )?;

        *active = Some(ActiveSession {
            cancel: handle.cancellation_token(),
            finished: handle.finished_token(),
        });
        Ok(handle)
    }

    /// Cancel the in-flight session, if any, and wait for it to stop.
    pub async fn cancel(&self) {
        if let Some(prior) = self.active.lock().await.take() {
            stop(prior).await;
        }
    }

    /// Dismiss a displayed error.
    pub fn clear_error(&self) {
        self.status.send_if_modified(|s| s.clear_error());
    }
}

async fn stop(session: ActiveSession) {
    if !session.finished.is_cancelled() {
        debug!("cancelling in-flight session");
        session.cancel.cancel();
    }
    session.finished.cancelled().await;
}
