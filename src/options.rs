//! Options structures for transport and session configuration.

use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_INITIAL_STATUS: &str = "Processing your question...";
const DEFAULT_UPDATE_BUFFER: usize = 64;

/// A secret string type for sensitive data like API keys.
/// Prevents accidental logging or display of secrets.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    /// Create a new secret string.
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Get the underlying secret value.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Streaming question answering.
    pub chat_stream: String,

    /// Streaming block generation.
    pub block_stream: String,

    /// Non-streaming block generation.
    pub block_generate: String,

    /// Stored block lookup; the block id is appended as a path segment.
    pub block_lookup: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            chat_stream: "/api/chat/stream".to_string(),
            block_stream: "/api/blocks/stream".to_string(),
            block_generate: "/api/blocks/generate".to_string(),
            block_lookup: "/api/analytics/blocks".to_string(),
        }
    }
}

/// HTTP transport configuration.
///
/// # Example
/// ```rust
/// use streamchat::options::TransportOptions;
/// use std::time::Duration;
///
/// let options = TransportOptions::new("http://localhost:8000")
///     .with_timeout(Duration::from_secs(30))
///     .with_header("x-store".to_string(), "42".to_string());
/// assert_eq!(options.url_for("/api/chat/stream"), "http://localhost:8000/api/chat/stream");
/// ```
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL for API endpoints
    pub base_url: String,

    /// Request timeout, enforced by the HTTP client
    pub timeout: Option<Duration>,

    /// Optional bearer token
    pub api_key: Option<SecretString>,

    /// HTTP proxy URL
    pub proxy: Option<String>,

    /// Additional HTTP headers to include in requests
    pub extra_headers: Option<HashMap<String, String>>,

    /// Endpoint paths
    pub endpoints: Endpoints,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl TransportOptions {
    /// Create new transport options for a base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            api_key: None,
            proxy: None,
            extra_headers: None,
            endpoints: Endpoints::default(),
        }
    }

    /// Build options from the environment.
    ///
    /// Reads `STREAMCHAT_BASE_URL`, `STREAMCHAT_TIMEOUT_SECS` and
    /// `STREAMCHAT_API_KEY`; unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut options = match std::env::var("STREAMCHAT_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => Self::new(base_url),
            _ => Self::default(),
        };

        if let Some(secs) = std::env::var("STREAMCHAT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            options.timeout = Some(Duration::from_secs(secs));
        }

        if let Ok(key) = std::env::var("STREAMCHAT_API_KEY") {
            options.api_key = Some(SecretString::new(key));
        }

        options
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the proxy URL.
    pub fn with_proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Add a single extra header.
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.extra_headers
            .get_or_insert_with(HashMap::new)
            .insert(key, value);
        self
    }

    /// Replace the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Join the base URL and an endpoint path.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Per-session behaviour.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capacity of the update channel between the session task and its consumer
    pub update_buffer: usize,

    /// Status text shown from the moment a request starts
    pub initial_status: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            update_buffer: DEFAULT_UPDATE_BUFFER,
            initial_status: DEFAULT_INITIAL_STATUS.to_string(),
        }
    }
}

impl SessionOptions {
    /// Set the update channel capacity. Zero is clamped to one.
    pub fn with_update_buffer(mut self, capacity: usize) -> Self {
        self.update_buffer = capacity.max(1);
        self
    }

    /// Set the initial status text.
    pub fn with_initial_status(mut self, text: impl Into<String>) -> Self {
        self.initial_status = text.into();
        self
    }
}
