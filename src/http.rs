//! HTTP client construction shared by the streaming transport and the block API.

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};

use crate::options::TransportOptions;

/// Build a configured HTTP client from transport options.
///
/// This applies timeouts and proxies; an unparsable proxy URL is an error.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&transport_options)?;
/// ```
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    builder.build()
}

/// Add the bearer token and any extra headers from transport options.
///
/// # Example
/// ```ignore
/// let req = apply_headers(client.post(url), &transport_options);
/// ```
pub fn apply_headers(mut request: RequestBuilder, transport_options: &TransportOptions) -> RequestBuilder {
    if let Some(api_key) = &transport_options.api_key {
        request = request.header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()));
    }

    if let Some(headers) = &transport_options.extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}
