//! Non-streaming block endpoints: one-shot generation and stored block lookup.

use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::client::ClientError;
use crate::http::{apply_headers, build_http_client};
use crate::model::{BlockData, BlockRecord, BlockRequest};
use crate::options::TransportOptions;

/// Client for the block REST endpoints.
#[derive(Debug, Clone)]
pub struct BlockApi {
    http: reqwest::Client,
    options: TransportOptions,
}

impl BlockApi {
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self { http, options })
    }

    /// Look up a stored block by id.
    pub async fn fetch_block(&self, block_id: &str) -> Result<BlockRecord, ClientError> {
        let block_id = block_id.trim();
        if block_id.is_empty() {
            return Err(ClientError::Config("block id must not be empty".to_string()));
        }

        let url = self.block_url(block_id)?;
        debug!(url = %url, "fetching block");

        let response = apply_headers(self.http.get(url), &self.options).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("block {}", block_id)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Lookup URL with the id appended as a single, percent-encoded segment.
    fn block_url(&self, block_id: &str) -> Result<Url, ClientError> {
        let base = self.options.url_for(&self.options.endpoints.block_lookup);
        let mut url = Url::parse(&base)
            .map_err(|e| ClientError::Config(format!("invalid block lookup url {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("block lookup url {} cannot take a path", base)))?
            .pop_if_empty()
            .push(block_id);
        Ok(url)
    }

    /// Generate a block in one request.
    ///
    /// The endpoint answers 200 for both outcomes and reports failures through
    /// `success: false`.
    pub async fn generate_block(&self, request: &BlockRequest) -> Result<BlockData, ClientError> {
        if request.prompt.trim().is_empty() {
            return Err(ClientError::Config("prompt must not be empty".to_string()));
        }

        let url = self.options.url_for(&self.options.endpoints.block_generate);
        debug!(url = %url, block_id = %request.block_id, "generating block");

        let req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(request);

        let response = apply_headers(req, &self.options).send().await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<BlockApiResponse>(&body) {
            Ok(parsed) => parsed.into_result(&request.block_id),
            Err(_) if !status.is_success() => Err(ClientError::Status {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(ClientError::Parse(e)),
        }
    }
}

// --- Block API Response Types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockApiResponse {
    success: bool,
    #[serde(default)]
    data: Option<BlockData>,
    #[serde(default)]
    error: Option<BlockApiError>,
    #[serde(default)]
    block_id: Option<String>,
    #[serde(default)]
    trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlockApiError {
    #[serde(rename = "type")]
    error_type: String,
}

impl BlockApiResponse {
    fn into_result(self, requested_block_id: &str) -> Result<BlockData, ClientError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(ClientError::Config(
                "successful block response without data".to_string(),
            )),
            (false, _) => Err(ClientError::Api {
                kind: self
                    .error
                    .map(|e| e.error_type)
                    .unwrap_or_else(|| "unknown".to_string()),
                block_id: self
                    .block_id
                    .unwrap_or_else(|| requested_block_id.to_string()),
                trace_id: self.trace_id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_response() {
        let parsed: BlockApiResponse = serde_json::from_value(json!({
            "success": true,
            "data": {"code": "<b/>", "summary": "s", "settings": [], "property": {"color": "red"}},
            "traceId": "t-1"
        }))
        .unwrap();
        let block = parsed.into_result("b-1").unwrap();
        assert_eq!(block.code, "<b/>");
        assert_eq!(block.property["color"], "red");
    }

    #[test]
    fn test_error_response() {
        let parsed: BlockApiResponse = serde_json::from_value(json!({
            "success": false,
            "error": {"type": "GENERATION_FAILED", "original": {"timestamp": "2024-01-01T00:00:00Z"}},
            "blockId": "b-9",
            "traceId": "t-2"
        }))
        .unwrap();
        match parsed.into_result("ignored") {
            Err(ClientError::Api { kind, block_id, trace_id }) => {
                assert_eq!(kind, "GENERATION_FAILED");
                assert_eq!(block_id, "b-9");
                assert_eq!(trace_id.as_deref(), Some("t-2"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_block_id_is_a_single_path_segment() {
        let api = BlockApi::new(TransportOptions::new("http://localhost:8000/")).unwrap();
        assert_eq!(
            api.block_url("blk-7").unwrap().as_str(),
            "http://localhost:8000/api/analytics/blocks/blk-7"
        );
        assert_eq!(
            api.block_url("a/b?c#d").unwrap().as_str(),
            "http://localhost:8000/api/analytics/blocks/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn test_block_url_with_trailing_slash_endpoint() {
        let mut endpoints = crate::options::Endpoints::default();
        endpoints.block_lookup = "/blocks/".to_string();
        let api = BlockApi::new(TransportOptions::new("http://host").with_endpoints(endpoints)).unwrap();
        assert_eq!(api.block_url("x").unwrap().as_str(), "http://host/blocks/x");
    }

    #[tokio::test]
    async fn test_blank_block_id_is_rejected() {
        let api = BlockApi::new(TransportOptions::default()).unwrap();
        assert!(matches!(api.fetch_block("  ").await, Err(ClientError::Config(_))));
    }
}
