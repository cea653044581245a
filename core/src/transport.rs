//! One network round trip per call.
//!
//! # Design
//! `Transport` is the seam between the pipeline and the network. It receives
//! a fully laid out `TransportRequest` and yields a `RawResponse` with the
//! body captured as bytes whatever its content type. Failures are returned
//! as `TransportError`; the registry turns them into status-0 responses.
//!
//! `UreqTransport` drives a blocking `ureq` agent on Tokio's blocking pool.
//! Cancelling the surrounding task drops the result; the socket itself is
//! released when the blocking call returns.

use std::future::Future;

use tracing::debug;

use crate::http::{HttpMethod, RawResponse, TransportRequest};

/// Errors a transport may report instead of a response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection refused, DNS failure, protocol error, body limit exceeded.
    #[error("request failed: {0}")]
    Request(String),

    /// The blocking task running the request did not finish.
    #[error("transport task failed: {0}")]
    Task(String),
}

/// Performs a single request.
pub trait Transport: Send + Sync + 'static {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// Default read limit for response bodies.
pub const DEFAULT_BODY_LIMIT: u64 = 64 * 1024 * 1024;

/// Transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    body_limit: u64,
}

impl UreqTransport {
    /// Non-2xx statuses are returned as data rather than errors, letting the
    /// caller render every response the service produces.
    pub fn new() -> Self {
        Self::with_body_limit(DEFAULT_BODY_LIMIT)
    }

    pub fn with_body_limit(body_limit: u64) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent, body_limit }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        let agent = self.agent.clone();
        let body_limit = self.body_limit;
        async move {
            tokio::task::spawn_blocking(move || run_blocking(&agent, request, body_limit))
                .await
                .map_err(|e| TransportError::Task(e.to_string()))?
        }
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn run_blocking(
    agent: &ureq::Agent,
    request: TransportRequest,
    body_limit: u64,
) -> Result<RawResponse, TransportError> {
    debug!(method = %request.method, url = %request.url, "dispatching");
    let body = request.body.unwrap_or_default();
    let headers = &request.headers;
    let url = request.url.as_str();

    let result = match request.method {
        HttpMethod::Get => with_headers(agent.get(url), headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), headers).call(),
        HttpMethod::Post => with_headers(agent.post(url), headers).send(&body[..]),
        HttpMethod::Put => with_headers(agent.put(url), headers).send(&body[..]),
        HttpMethod::Patch => with_headers(agent.patch(url), headers).send(&body[..]),
    };
    let mut response = result.map_err(|e| TransportError::Request(e.to_string()))?;

    let status = response.status();
    let status_text = status.canonical_reason().unwrap_or("").to_string();
    let header_lines = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let bytes = response
        .body_mut()
        .with_config()
        .limit(body_limit)
        .read_to_vec()
        .map_err(|e| TransportError::Request(e.to_string()))?;

    Ok(RawResponse::new(status.as_u16(), status_text, header_lines, bytes))
}
