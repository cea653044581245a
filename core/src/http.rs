//! HTTP data types shared by every pipeline stage.
//!
//! # Design
//! Requests and responses are described as plain data. `Request` is what the
//! builder produces and the request hooks rewrite; `TransportRequest` is the
//! wire-ready form (query appended, multipart body encoded, standard headers
//! attached) handed to a `Transport`. `RawResponse` is what comes back.
//!
//! Header lists are kept as ordered `(name, value)` pairs on the way out so
//! caller-supplied headers reach the wire verbatim. Incoming headers are
//! normalized once into two maps, see `RawResponse::new`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// `accept` header sent with every test request. Prefers JSON, then text,
/// then images, then anything.
pub const ACCEPT: &str = "application/json, text/*;q=0.9, image/*;q=0.8, */*;q=0.5";

/// Marker header identifying a script-initiated request.
pub const REQUESTED_WITH: (&str, &str) = ("x-requested-with", "XMLHttpRequest");

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// `GET` and `DELETE` carry their fields in the URL query; every other
    /// method sends them as a multipart body.
    pub fn uses_query(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }

    /// Whether the console offers the full set of typed fields for
    /// variable arguments of a route with this method.
    pub fn accepts_form(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when parsing an unsupported method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// An uploaded file: the selected binary content plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    /// Serialized as a base64 string.
    #[serde(with = "base64_bytes")]
    pub content: Bytes,
}

mod base64_bytes {
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

impl FilePart {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// A single value of a multipart body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

/// The mutable part of a request: what request hooks receive and may replace.
///
/// `params` is only populated for query methods and `body` only for the
/// others; the builder never fills both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub params: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<Vec<(String, FormValue)>>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// A request as assembled by `RequestBuilder`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: HttpMethod,
    pub url: String,
    pub options: RequestOptions,
}

/// A request ready for the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Lay out `options` for the wire: query parameters are appended to
    /// `url`, a body is multipart encoded, and the standard headers come
    /// before any caller-supplied ones.
    pub fn encode(method: HttpMethod, url: &str, options: RequestOptions) -> Self {
        let mut headers = vec![
            ("accept".to_string(), ACCEPT.to_string()),
            (REQUESTED_WITH.0.to_string(), REQUESTED_WITH.1.to_string()),
        ];

        let body = options.body.map(|fields| {
            let form = crate::builder::MultipartForm::encode(&fields);
            headers.push(("content-type".to_string(), form.content_type()));
            form.into_body()
        });
        headers.extend(options.headers);

        Self {
            method,
            url: append_query(url, &options.params),
            headers,
            body,
        }
    }
}

/// Append `params` to `url` as `key=value` pairs joined by `&`, continuing an
/// existing query string if the URL already has one.
pub fn append_query(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    let separator = match url.find('?') {
        None => "?",
        Some(_) if url.ends_with('?') || url.ends_with('&') => "",
        Some(_) => "&",
    };
    format!("{url}{separator}{query}")
}

/// A completed response with its body captured as raw bytes.
///
/// `status == 0` means no response was received: the request failed to
/// connect or was refused before any status line arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    /// Lower-cased, trimmed names and trimmed values.
    pub headers: BTreeMap<String, String>,
    /// Trimmed names and values, in the case the transport reports them.
    /// `UreqTransport` only sees lower-cased names, so for its responses
    /// this matches `headers`.
    pub raw_headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Time between dispatch and completion.
    #[serde(default)]
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn new(
        status: u16,
        status_text: impl Into<String>,
        header_lines: Vec<(String, String)>,
        body: impl Into<Bytes>,
    ) -> Self {
        let (headers, raw_headers) = crate::decoder::normalize_headers(header_lines);
        Self {
            status,
            status_text: status_text.into(),
            headers,
            raw_headers,
            body: body.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// The status-0 response standing in for a transport failure.
    pub fn failed() -> Self {
        Self::new(0, "", Vec::new(), Bytes::new())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The `content-type` header, or `""` when absent.
    pub fn content_type(&self) -> &str {
        self.header("content-type").unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!(" Delete ".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn file_content_serializes_as_base64() {
        let part = FilePart::new("a.bin", "application/octet-stream", vec![1u8, 2, 3]);
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["content"], "AQID");
        let back: FilePart = serde_json::from_value(json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn method_deserializes_from_lowercase_catalogue_names() {
        let method: HttpMethod = serde_json::from_str(r#""post""#).unwrap();
        assert_eq!(method, HttpMethod::Post);
        assert_eq!(serde_json::to_string(&HttpMethod::Patch).unwrap(), r#""PATCH""#);
    }

    #[test]
    fn only_get_and_delete_use_query() {
        assert!(HttpMethod::Get.uses_query());
        assert!(HttpMethod::Delete.uses_query());
        assert!(!HttpMethod::Post.uses_query());
        assert!(!HttpMethod::Put.uses_query());
        assert!(!HttpMethod::Patch.uses_query());
    }

    #[test]
    fn append_query_starts_a_new_query() {
        let params = vec![("id".to_string(), "5".to_string())];
        assert_eq!(append_query("http://h/users", &params), "http://h/users?id=5");
    }

    #[test]
    fn append_query_continues_an_existing_query() {
        let params = vec![("b".to_string(), "2".to_string())];
        assert_eq!(append_query("http://h/x?a=1", &params), "http://h/x?a=1&b=2");
        assert_eq!(append_query("http://h/x?", &params), "http://h/x?b=2");
        assert_eq!(append_query("http://h/x?a=1&", &params), "http://h/x?a=1&b=2");
    }

    #[test]
    fn append_query_without_params_leaves_url_alone() {
        assert_eq!(append_query("http://h/x", &[]), "http://h/x");
    }

    #[test]
    fn encode_query_request_has_no_body() {
        let options = RequestOptions {
            params: vec![("id".to_string(), "5".to_string())],
            body: None,
            headers: vec![("X-Token".to_string(), "abc".to_string())],
        };
        let req = TransportRequest::encode(HttpMethod::Get, "http://h/users", options);
        assert_eq!(req.url, "http://h/users?id=5");
        assert!(req.body.is_none());
        assert_eq!(req.headers[0].0, "accept");
        assert_eq!(req.headers[1], ("x-requested-with".to_string(), "XMLHttpRequest".to_string()));
        assert_eq!(req.headers.last().unwrap(), &("X-Token".to_string(), "abc".to_string()));
    }

    #[test]
    fn encode_form_request_sets_multipart_content_type() {
        let options = RequestOptions {
            params: Vec::new(),
            body: Some(vec![("name".to_string(), FormValue::Text("a".to_string()))]),
            headers: Vec::new(),
        };
        let req = TransportRequest::encode(HttpMethod::Post, "http://h/users", options);
        assert_eq!(req.url, "http://h/users");
        let content_type = req
            .headers
            .iter()
            .find(|(name, _)| name == "content-type")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert!(req.body.is_some());
    }

    #[test]
    fn raw_response_normalizes_header_lines() {
        let response = RawResponse::new(
            200,
            "OK",
            vec![(" Content-Type ".to_string(), " text/plain ".to_string())],
            "hi",
        );
        assert_eq!(response.content_type(), "text/plain");
        assert_eq!(response.raw_headers.get("Content-Type").unwrap(), "text/plain");
        assert_eq!(response.header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn failed_response_has_status_zero_and_empty_content_type() {
        let response = RawResponse::failed();
        assert_eq!(response.status, 0);
        assert_eq!(response.content_type(), "");
        assert!(response.body.is_empty());
    }
}
