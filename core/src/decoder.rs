//! Content-sniffed decoding of response bodies.
//!
//! # Design
//! The transport always captures the body as raw bytes, so no guess about
//! the representation is needed before the response arrives. Classification
//! looks only at the already-received `content-type` header: text and JSON
//! bodies are decoded as UTF-8 and parsed as JSON when possible; everything
//! else becomes a base64 data URI usable as an image source or download
//! target.
//!
//! Decoding runs on the blocking pool so large bodies never stall the event
//! loop.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::http::RawResponse;

const OCTET_STREAM: &str = "application/octet-stream";

/// The decoded body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseData {
    /// A text body that parsed as JSON.
    Json(Value),
    /// A text body that is not JSON.
    Text(String),
    /// A binary body as a `data:<type>;base64,<payload>` reference.
    DataUri(String),
}

impl ResponseData {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_data_uri(&self) -> Option<&str> {
        match self {
            ResponseData::DataUri(uri) => Some(uri),
            _ => None,
        }
    }
}

/// A response ready for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub raw_headers: BTreeMap<String, String>,
    /// Left out of the serialized form; `data` already carries the content.
    #[serde(default, skip_serializing)]
    pub body: Bytes,
    #[serde(default)]
    pub elapsed: Duration,
    pub data: ResponseData,
    pub is_text: bool,
    /// The `content-length` header, when present and numeric.
    pub length: Option<u64>,
}

impl DecodedResponse {
    /// Wrap a status-0 response without touching its body.
    pub fn unavailable(raw: RawResponse) -> Self {
        Self::assemble(raw, ResponseData::Text(String::new()), false)
    }

    fn assemble(raw: RawResponse, data: ResponseData, is_text: bool) -> Self {
        let length = raw
            .headers
            .get("content-length")
            .and_then(|value| value.parse::<u64>().ok());
        Self {
            status: raw.status,
            status_text: raw.status_text,
            headers: raw.headers,
            raw_headers: raw.raw_headers,
            body: raw.body,
            elapsed: raw.elapsed,
            data,
            is_text,
            length,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }

    /// The media type without parameters, e.g. `text/html` for
    /// `text/html; charset=utf-8`.
    pub fn media_type(&self) -> &str {
        media_type(self.content_type())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Split header lines into a lower-cased map and a case-preserving map, with
/// names and values trimmed. Lines with an empty name are skipped; a repeated
/// name keeps its last value.
pub fn normalize_headers(
    lines: Vec<(String, String)>,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut headers = BTreeMap::new();
    let mut raw_headers = BTreeMap::new();
    for (name, value) in lines {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().to_string();
        headers.insert(name.to_ascii_lowercase(), value.clone());
        raw_headers.insert(name.to_string(), value);
    }
    (headers, raw_headers)
}

/// Whether a body of this content type is decoded as text.
pub fn is_text(content_type: &str) -> bool {
    let content_type = content_type.trim().to_ascii_lowercase();
    content_type.starts_with("text/") || content_type.contains("/json")
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

/// Decode `raw` off the event loop.
pub async fn decode(raw: RawResponse) -> DecodedResponse {
    let fallback = raw.clone();
    match tokio::task::spawn_blocking(move || decode_now(raw)).await {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "decode task failed, decoding inline");
            decode_now(fallback)
        }
    }
}

/// Decode `raw` on the current thread.
pub fn decode_now(raw: RawResponse) -> DecodedResponse {
    let is_text = is_text(raw.content_type());
    let data = if is_text {
        let text = String::from_utf8_lossy(&raw.body).into_owned();
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => ResponseData::Json(value),
            Err(_) => ResponseData::Text(text),
        }
    } else {
        ResponseData::DataUri(data_uri(media_type(raw.content_type()), &raw.body))
    };
    DecodedResponse::assemble(raw, data, is_text)
}

/// Embed `bytes` as a base64 data URI of the given media type.
pub fn data_uri(media_type: &str, bytes: &[u8]) -> String {
    let media_type = if media_type.is_empty() { OCTET_STREAM } else { media_type };
    format!(
        "data:{media_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
