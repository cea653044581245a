//! Turns the user's field values into a `Request`.
//!
//! # Design
//! Coercion happens at the edge and never fails the send: a value that does
//! not yield a usable primitive for its declared type is left out of the
//! request. Malformed input then surfaces as whatever the service under test
//! answers for the missing field.
//!
//! Query methods (`GET`, `DELETE`) put every field into `params`; all other
//! methods build a multipart body so file fields carry their bytes rather
//! than a file name.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;
use uuid::Uuid;

use crate::http::{FormValue, HttpMethod, Request, RequestOptions};
use crate::route::{ArgumentSpec, FieldInput, FieldMap, FieldType, FieldValue};

/// Builds requests for one route from its declared arguments.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    arguments: &'a [ArgumentSpec],
}

impl<'a> RequestBuilder<'a> {
    pub fn new(arguments: &'a [ArgumentSpec]) -> Self {
        Self { arguments }
    }

    pub fn build(
        &self,
        method: HttpMethod,
        url: &str,
        fields: &FieldMap,
        headers: Vec<(String, String)>,
    ) -> Request {
        let mut params = Vec::new();
        let mut body = Vec::new();

        for (name, field) in fields.iter() {
            if name.trim().is_empty() {
                trace!("dropping field with blank name");
                continue;
            }
            let kind = self.field_type(name, field);
            let Some(value) = coerce(&field.value, &kind) else {
                trace!(field = name, kind = kind.as_str(), "dropping field without usable value");
                continue;
            };

            if method.uses_query() {
                match value {
                    FormValue::Text(text) => params.push((name.to_string(), text)),
                    FormValue::File(_) => {
                        trace!(field = name, "file field cannot travel in a query string");
                    }
                }
            } else {
                body.push((name.to_string(), value));
            }
        }

        Request {
            method,
            url: url.to_string(),
            options: RequestOptions {
                params,
                body: (!method.uses_query()).then_some(body),
                headers,
            },
        }
    }

    /// The editor's type wins; otherwise the declared argument's type,
    /// matched by name or alias; otherwise a plain string.
    fn field_type(&self, name: &str, field: &FieldValue) -> FieldType {
        if let Some(kind) = &field.kind {
            return kind.clone();
        }
        self.arguments
            .iter()
            .find(|arg| arg.answers_to(name))
            .map(ArgumentSpec::field_type)
            .unwrap_or(FieldType::Str)
    }
}

/// Coerce one input to the primitive its type calls for.
///
/// Returns `None` when no usable value results.
pub fn coerce(input: &FieldInput, kind: &FieldType) -> Option<FormValue> {
    let text = match input {
        FieldInput::Empty => return None,
        FieldInput::File(part) => return Some(FormValue::File(part.clone())),
        FieldInput::Text(text) => text,
    };

    let coerced = match kind {
        FieldType::Int => text.trim().parse::<i64>().ok()?.to_string(),
        FieldType::Float => {
            let value = text.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
            value.to_string()
        }
        FieldType::Bool => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            (text == "true").to_string()
        }
        FieldType::File => return None,
        FieldType::Str | FieldType::List | FieldType::Dict | FieldType::Other(_) => text.clone(),
    };
    Some(FormValue::Text(coerced))
}

/// One row of the request-header editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRow {
    pub enabled: bool,
    pub name: String,
    pub value: String,
}

impl HeaderRow {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            enabled: true,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Collect the enabled header rows, trimmed. A later row with the same name
/// replaces the earlier one where it stood.
pub fn collect_headers(rows: &[HeaderRow]) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    for row in rows.iter().filter(|row| row.enabled) {
        let name = row.name.trim();
        if name.is_empty() {
            continue;
        }
        let value = row.value.trim().to_string();
        match headers.iter_mut().find(|(existing, _)| existing == name) {
            Some((_, slot)) => *slot = value,
            None => headers.push((name.to_string(), value)),
        }
    }
    headers
}

/// A `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    body: Bytes,
}

impl MultipartForm {
    pub fn encode(fields: &[(String, FormValue)]) -> Self {
        Self::with_boundary(format!("----RouteConsole{}", Uuid::new_v4().simple()), fields)
    }

    pub fn with_boundary(boundary: String, fields: &[(String, FormValue)]) -> Self {
        let mut body = BytesMut::new();
        for (name, value) in fields {
            body.put_slice(format!("--{boundary}\r\n").as_bytes());
            match value {
                FormValue::Text(text) => {
                    body.put_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape(name))
                            .as_bytes(),
                    );
                    body.put_slice(text.as_bytes());
                }
                FormValue::File(part) => {
                    let content_type = if part.content_type.is_empty() {
                        "application/octet-stream"
                    } else {
                        part.content_type.as_str()
                    };
                    body.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {content_type}\r\n\r\n",
                            escape(name),
                            escape(&part.filename),
                        )
                        .as_bytes(),
                    );
                    body.put_slice(&part.content);
                }
            }
            body.put_slice(b"\r\n");
        }
        body.put_slice(format!("--{boundary}--\r\n").as_bytes());

        Self {
            boundary,
            body: body.freeze(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

fn escape(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
