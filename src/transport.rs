//! The seam between sessions and the network.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use crate::client::ClientError;
use crate::http::{apply_headers, build_http_client};
use crate::model::{Mode, StreamRequest};
use crate::options::TransportOptions;

/// Body of an open response, chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// An opened response: its status and, if there is one, its body.
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: Option<ByteStream>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Issues streaming requests.
///
/// Implementations must be cancel-safe: a session drops the `open` future or
/// the body stream as soon as it is cancelled.
///
/// # Example
/// ```rust,ignore
/// struct Canned(&'static str);
///
/// #[async_trait]
/// impl Transport for Canned {
///     async fn open(&self, _request: &StreamRequest) -> Result<TransportResponse, ClientError> {
///         let body = futures::stream::once(async move { Ok(Bytes::from_static(self.0.as_bytes())) });
///         Ok(TransportResponse { status: StatusCode::OK, body: Some(Box::pin(body)) })
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, ClientError>;
}

/// [`Transport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    options: TransportOptions,
}

impl HttpTransport {
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    fn endpoint(&self, mode: Mode) -> String {
        let path = match mode {
            Mode::Answer => &self.options.endpoints.chat_stream,
            Mode::Artifact => &self.options.endpoints.block_stream,
        };
        self.options.url_for(path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<TransportResponse, ClientError> {
        let url = self.endpoint(request.mode());
        debug!(url = %url, mode = %request.mode(), "opening event stream");

        let req = self
            .http
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json");

        let response = apply_headers(req, &self.options).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(TransportResponse { status, body: None });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from));

        Ok(TransportResponse {
            status,
            body: Some(Box::pin(body)),
        })
    }
}
