//! Caller-registered interceptors for outgoing requests and incoming
//! responses.
//!
//! # Design
//! A hook returns a `HookOutcome`: `Continue` with a replacement value,
//! `Abort` to stop the send (or the delivery), or `Invalid` when it produced
//! something unusable. Folding pattern-matches on the tag: `Invalid` is
//! logged and skipped, and the chain carries on with the previous value.
//!
//! Both lists are append-only. A fold works on a snapshot, so a hook
//! registered while a send is in progress applies from the next send on.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::decoder::DecodedResponse;
use crate::http::{HttpMethod, RequestOptions};

/// Result of running one hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome<T> {
    Continue(T),
    Abort,
    /// The hook's output was not a usable value; the text describes what it
    /// returned instead.
    Invalid(String),
}

impl<T: DeserializeOwned> HookOutcome<T> {
    /// Interpret a loosely-typed hook result: `false` aborts, an object is
    /// the replacement value, anything else is invalid.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(false) => HookOutcome::Abort,
            Value::Object(_) => match serde_json::from_value(value) {
                Ok(replacement) => HookOutcome::Continue(replacement),
                Err(e) => HookOutcome::Invalid(format!("object of the wrong shape: {e}")),
            },
            other => HookOutcome::Invalid(format!("{} `{other}`", json_kind(&other))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub type RequestHook =
    Arc<dyn Fn(HttpMethod, &str, RequestOptions) -> HookOutcome<RequestOptions> + Send + Sync>;

pub type ResponseHook =
    Arc<dyn Fn(HttpMethod, &str, DecodedResponse) -> HookOutcome<DecodedResponse> + Send + Sync>;

/// A hook of either kind, for registration by name.
#[derive(Clone)]
pub enum Hook {
    Request(RequestHook),
    Response(ResponseHook),
}

impl Hook {
    pub fn request<F>(f: F) -> Self
    where
        F: Fn(HttpMethod, &str, RequestOptions) -> HookOutcome<RequestOptions> + Send + Sync + 'static,
    {
        Hook::Request(Arc::new(f))
    }

    pub fn response<F>(f: F) -> Self
    where
        F: Fn(HttpMethod, &str, DecodedResponse) -> HookOutcome<DecodedResponse> + Send + Sync + 'static,
    {
        Hook::Response(Arc::new(f))
    }

    /// Adapt a request hook that works on JSON values.
    pub fn request_json<F>(f: F) -> Self
    where
        F: Fn(HttpMethod, &str, Value) -> Value + Send + Sync + 'static,
    {
        Hook::request(move |method, url, options| json_round(&f, method, url, &options))
    }

    /// Adapt a response hook that works on JSON values.
    pub fn response_json<F>(f: F) -> Self
    where
        F: Fn(HttpMethod, &str, Value) -> Value + Send + Sync + 'static,
    {
        Hook::response(move |method, url, response| {
            let body = response.body.clone();
            match json_round(&f, method, url, &response) {
                HookOutcome::Continue(mut next) => {
                    next.body = body;
                    HookOutcome::Continue(next)
                }
                other => other,
            }
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Hook::Request(_) => "request",
            Hook::Response(_) => "response",
        }
    }
}

fn json_round<T, F>(f: &F, method: HttpMethod, url: &str, value: &T) -> HookOutcome<T>
where
    T: Serialize + DeserializeOwned,
    F: Fn(HttpMethod, &str, Value) -> Value,
{
    match serde_json::to_value(value) {
        Ok(input) => HookOutcome::from_json(f(method, url, input)),
        Err(e) => HookOutcome::Invalid(format!("input not representable as JSON: {e}")),
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook::{}", self.kind())
    }
}

/// Valid names for `HookChain::on`.
pub const HOOK_NAMES: [&str; 2] = ["request", "response"];

/// The two ordered hook lists.
#[derive(Default)]
pub struct HookChain {
    request: RwLock<Vec<RequestHook>>,
    response: RwLock<Vec<ResponseHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request<F>(&self, f: F)
    where
        F: Fn(HttpMethod, &str, RequestOptions) -> HookOutcome<RequestOptions> + Send + Sync + 'static,
    {
        self.request.write().push(Arc::new(f));
    }

    pub fn on_response<F>(&self, f: F)
    where
        F: Fn(HttpMethod, &str, DecodedResponse) -> HookOutcome<DecodedResponse> + Send + Sync + 'static,
    {
        self.response.write().push(Arc::new(f));
    }

    /// Register `hook` under `name`. Returns `false`, after logging a
    /// warning, when the name is unknown or does not match the hook's kind.
    pub fn on(&self, name: &str, hook: Hook) -> bool {
        match (name, hook) {
            ("request", Hook::Request(f)) => self.request.write().push(f),
            ("response", Hook::Response(f)) => self.response.write().push(f),
            (name, hook) => {
                warn!(
                    hook_name = name,
                    hook_kind = hook.kind(),
                    "invalid hook name, expected {}",
                    HOOK_NAMES.join("/")
                );
                return false;
            }
        }
        true
    }

    pub fn request_hook_count(&self) -> usize {
        self.request.read().len()
    }

    pub fn response_hook_count(&self) -> usize {
        self.response.read().len()
    }

    /// Fold `options` through the request hooks in registration order.
    /// `None` means a hook aborted the send.
    pub fn run_request_hooks(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> Option<RequestOptions> {
        let hooks = self.request.read().clone();
        fold("request", hooks.as_slice(), options, |hook, value| hook(method, url, value))
    }

    /// Fold `response` through the response hooks in registration order.
    /// `None` means a hook cancelled the delivery.
    pub fn run_response_hooks(
        &self,
        method: HttpMethod,
        url: &str,
        response: DecodedResponse,
    ) -> Option<DecodedResponse> {
        let hooks = self.response.read().clone();
        fold("response", hooks.as_slice(), response, |hook, value| hook(method, url, value))
    }
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("request", &self.request_hook_count())
            .field("response", &self.response_hook_count())
            .finish()
    }
}

fn fold<H, T: Clone>(
    stage: &'static str,
    hooks: &[H],
    mut value: T,
    run: impl Fn(&H, T) -> HookOutcome<T>,
) -> Option<T> {
    for (index, hook) in hooks.iter().enumerate() {
        match run(hook, value.clone()) {
            HookOutcome::Continue(next) => value = next,
            HookOutcome::Abort => {
                debug!(stage, index, "hook aborted");
                return None;
            }
            HookOutcome::Invalid(returned) => {
                warn!(stage, index, returned = %returned, "ignoring invalid hook return value, a structured value was expected");
            }
        }
    }
    Some(value)
}
