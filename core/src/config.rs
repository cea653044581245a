//! Console configuration.
//!
//! Layered as defaults, then an optional JSON file, then environment
//! variables. Command-line flags are applied by the host on top.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConsoleError;
use crate::transport::DEFAULT_BODY_LIMIT;

pub const ENV_URL_ROOT: &str = "ROUTE_CONSOLE_URL_ROOT";
pub const ENV_API_PREFIX: &str = "ROUTE_CONSOLE_API_PREFIX";
pub const ENV_PREVIEW_LIMIT: &str = "ROUTE_CONSOLE_PREVIEW_LIMIT";

/// Bodies larger than this are offered for download only.
pub const DEFAULT_PREVIEW_LIMIT: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Origin of the service under test.
    pub url_root: String,
    /// Path segment between the origin and every route path.
    pub api_prefix: String,
    pub preview_limit: usize,
    pub body_limit: u64,
    /// Headers added to every test request, before the user's own.
    pub default_headers: Vec<(String, String)>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            url_root: "http://127.0.0.1:3000".to_string(),
            api_prefix: String::new(),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            body_limit: DEFAULT_BODY_LIMIT,
            default_headers: Vec::new(),
        }
    }
}

impl ConsoleConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConsoleError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Defaults, overlaid by `path` when given, overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConsoleError> {
        let config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConsoleError> {
        if let Some(root) = lookup(ENV_URL_ROOT) {
            self.url_root = root;
        }
        if let Some(prefix) = lookup(ENV_API_PREFIX) {
            self.api_prefix = prefix;
        }
        if let Some(limit) = lookup(ENV_PREVIEW_LIMIT) {
            self.preview_limit = limit
                .trim()
                .parse()
                .map_err(|_| ConsoleError::Config(format!("{ENV_PREVIEW_LIMIT} is not a byte count: {limit}")))?;
        }
        Ok(self)
    }

    /// Absolute URL of a route path: root, prefix and path joined by single
    /// slashes.
    pub fn route_url(&self, path: &str) -> String {
        let mut url = self.url_root.trim_end_matches('/').to_string();
        for segment in [self.api_prefix.as_str(), path] {
            let segment = segment.trim_matches('/');
            if !segment.is_empty() {
                url.push('/');
                url.push_str(segment);
            }
        }
        url
    }

    /// Where the service publishes its route catalogue.
    pub fn catalogue_url(&self) -> String {
        self.route_url("api.json")
    }
}
