//! What the presentation layer can show for a decoded response, and how it
//! can offer the body for download.

use base64::Engine as _;
use serde_json::Value;

use crate::decoder::{data_uri, DecodedResponse, ResponseData};

/// How a response body can be previewed.
#[derive(Debug, Clone, PartialEq)]
pub enum Preview<'a> {
    /// An image; the value is usable directly as an image source.
    Image(&'a str),
    Html(&'a str),
    Text(&'a str),
    Json(&'a Value),
    /// Text or JSON above the preview limit: download only.
    TooLarge,
    /// Binary content other than images, or no response at all.
    Unsupported,
}

impl<'a> Preview<'a> {
    pub fn of(response: &'a DecodedResponse, limit: usize) -> Self {
        if response.status == 0 {
            return Preview::Unsupported;
        }
        let media_type = response.media_type().to_ascii_lowercase();
        match &response.data {
            ResponseData::DataUri(uri) if media_type.starts_with("image/") => Preview::Image(uri),
            ResponseData::Text(text) if response.is_text => {
                if text.len() >= limit {
                    Preview::TooLarge
                } else if media_type.contains("text/html") {
                    Preview::Html(text)
                } else {
                    Preview::Text(text)
                }
            }
            ResponseData::Json(value) => {
                let length = response.length.unwrap_or(response.body.len() as u64);
                if length >= limit as u64 {
                    Preview::TooLarge
                } else {
                    Preview::Json(value)
                }
            }
            _ => Preview::Unsupported,
        }
    }
}

/// A download link for the response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveAs {
    /// Self-contained `data:` URI of the body.
    pub href: String,
    pub filename: String,
}

impl SaveAs {
    /// `url` is the request URL, used to name the file when the response
    /// carries no `content-disposition`.
    pub fn of(response: &DecodedResponse, url: &str) -> Self {
        let media_type = response.media_type();
        let href = match &response.data {
            ResponseData::DataUri(uri) => uri.clone(),
            ResponseData::Text(text) => data_uri(media_type, text.as_bytes()),
            ResponseData::Json(value) => data_uri(media_type, value.to_string().as_bytes()),
        };
        let filename = response
            .header("content-disposition")
            .and_then(disposition_filename)
            .unwrap_or_else(|| fallback_filename(url, media_type));
        Self { href, filename }
    }
}

/// Extract the file name from a `content-disposition` value.
///
/// Only the final path component of the decoded name is kept, so the result
/// is always a bare file name. `None` when nothing usable remains.
pub fn disposition_filename(disposition: &str) -> Option<String> {
    if let Some((_, extended)) = disposition.split_once("filename*=") {
        let value = first_parameter(extended);
        let encoded = value.split_once("''").map_or(value, |(_, rest)| rest);
        return bare_file_name(&percent_decode(encoded));
    }

    let (_, value) = disposition.split_once("filename=")?;
    let value = first_parameter(value);
    if let Some(encoded) = mime_word(value) {
        return match base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        {
            Some(decoded) => bare_file_name(&decoded),
            None => bare_file_name(value),
        };
    }
    bare_file_name(&percent_decode(value))
}

fn first_parameter(value: &str) -> &str {
    value.split(';').next().unwrap_or("").trim().trim_matches('"')
}

/// The payload of an `=?utf-8?B?...?=` encoded word.
fn mime_word(value: &str) -> Option<&str> {
    const PREFIX: &str = "=?utf-8?b?";
    let head = value.get(..PREFIX.len())?;
    if !head.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    value[PREFIX.len()..].strip_suffix("?=")
}

fn percent_decode(value: &str) -> String {
    percent_encoding::percent_decode_str(value)
        .decode_utf8_lossy()
        .into_owned()
}

/// The last component of `name` split on either path separator; `None` for
/// empty, `.` and `..`.
fn bare_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match last {
        "" | "." | ".." => None,
        last => Some(last.to_string()),
    }
}

/// Last path segment of `url` plus an extension from the media subtype.
fn fallback_filename(url: &str, media_type: &str) -> String {
    let path = url::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or("").to_string());
    let stem = path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .and_then(|segment| bare_file_name(&percent_decode(segment)))
        .unwrap_or_else(|| "response".to_string());

    let extension: String = media_type
        .split_once('/')
        .map(|(_, subtype)| {
            subtype
                .chars()
                .take_while(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
                .collect()
        })
        .unwrap_or_default();

    if extension.is_empty() || stem.ends_with(&format!(".{extension}")) {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}
