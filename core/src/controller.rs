//! Orchestrates one user-initiated send.
//!
//! # Design
//! A send moves through
//! `Building → AwaitingHooks(before) → Sending → AwaitingDecode →
//! AwaitingHooks(after) → Delivered`, with `Cancelled` reachable from
//! `Sending` and an abort reachable from either hook stage. Everything up to
//! `Sending` is synchronous and happens in `dispatch`; the returned
//! `InFlight` carries the handle a caller needs to cancel it. Once decoding
//! has started the send can no longer be cancelled.
//!
//! `PipelineContext` owns the shared state (registry and hooks) for one
//! console session and is passed to controllers by `Arc`.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::builder::RequestBuilder;
use crate::config::ConsoleConfig;
use crate::decoder::{self, DecodedResponse};
use crate::hooks::HookChain;
use crate::http::{HttpMethod, TransportRequest};
use crate::registry::{Completion, PendingResponse, RequestHandle, RequestRegistry};
use crate::route::{ArgumentSpec, FieldMap, RouteMeta};
use crate::transport::Transport;

/// Per-session state shared by every send.
#[derive(Debug, Default)]
pub struct PipelineContext {
    registry: RequestRegistry,
    hooks: HookChain,
    config: ConsoleConfig,
}

impl PipelineContext {
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            registry: RequestRegistry::new(),
            hooks: HookChain::new(),
            config,
        }
    }

    pub fn registry(&self) -> &RequestRegistry {
        &self.registry
    }

    pub fn hooks(&self) -> &HookChain {
        &self.hooks
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }
}

/// Stages of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Building,
    BeforeHooks,
    Sending,
    AwaitingDecode,
    AfterHooks,
    Delivered,
}

impl fmt::Display for SendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SendPhase::Building => "building",
            SendPhase::BeforeHooks => "before-hooks",
            SendPhase::Sending => "sending",
            SendPhase::AwaitingDecode => "awaiting-decode",
            SendPhase::AfterHooks => "after-hooks",
            SendPhase::Delivered => "delivered",
        };
        f.write_str(name)
    }
}

/// How a send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The presentation callback received the decoded response.
    Delivered { status: u16 },
    /// No response arrived; the callback received a status-0 response.
    TransportFailed,
    /// A hook returned abort during the given phase; the callback was not
    /// invoked.
    AbortedByHook { phase: SendPhase },
    /// The send was cancelled while in flight; the callback was not invoked.
    Cancelled,
}

/// Everything the user supplied for one send.
#[derive(Debug, Clone, Default)]
pub struct TestRequest {
    pub method: Option<HttpMethod>,
    pub url: String,
    pub arguments: Vec<ArgumentSpec>,
    pub fields: FieldMap,
    pub headers: Vec<(String, String)>,
}

impl TestRequest {
    /// A test of `route` at `url`, starting with the headers the catalogue
    /// asks for.
    pub fn for_route(route: &RouteMeta, url: impl Into<String>) -> Self {
        Self {
            method: Some(route.method),
            url: url.into(),
            arguments: route.arguments.clone(),
            fields: FieldMap::new(),
            headers: route.headers.clone(),
        }
    }

    pub fn fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Result of the synchronous part of a send.
#[derive(Debug)]
pub enum Dispatch {
    Sent(InFlight),
    /// A request hook aborted; nothing was sent.
    Aborted,
}

/// Runs sends for one console session over a transport.
pub struct TestExecutionController<T> {
    context: Arc<PipelineContext>,
    transport: Arc<T>,
}

impl<T> Clone for TestExecutionController<T> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: Transport> TestExecutionController<T> {
    pub fn new(context: Arc<PipelineContext>, transport: Arc<T>) -> Self {
        Self { context, transport }
    }

    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.context
    }

    /// Build the request, run the request hooks and hand the result to the
    /// registry. Must be called from within a Tokio runtime.
    pub fn dispatch(&self, request: TestRequest) -> Dispatch {
        let method = request.method.unwrap_or(HttpMethod::Get);
        let url = request.url;
        debug!(%method, %url, phase = %SendPhase::Building);

        let mut headers = self.context.config.default_headers.clone();
        headers.extend(request.headers);
        let built = RequestBuilder::new(&request.arguments).build(method, &url, &request.fields, headers);

        debug!(%method, %url, phase = %SendPhase::BeforeHooks);
        let Some(options) = self.context.hooks.run_request_hooks(method, &url, built.options) else {
            debug!(%method, %url, "request hook aborted the send");
            return Dispatch::Aborted;
        };

        let pending = self.context.registry.send(
            Arc::clone(&self.transport),
            TransportRequest::encode(method, &url, options),
        );
        debug!(%method, %url, handle = %pending.handle(), phase = %SendPhase::Sending);
        Dispatch::Sent(InFlight {
            context: Arc::clone(&self.context),
            method,
            url,
            pending,
        })
    }

    /// Run a whole send, invoking `present` at most once.
    pub async fn send<P>(&self, request: TestRequest, present: P) -> SendOutcome
    where
        P: FnOnce(DecodedResponse),
    {
        match self.dispatch(request) {
            Dispatch::Sent(in_flight) => in_flight.complete(present).await,
            Dispatch::Aborted => SendOutcome::AbortedByHook {
                phase: SendPhase::BeforeHooks,
            },
        }
    }

    /// Cancel one send. See `RequestRegistry::cancel`.
    pub fn cancel(&self, handle: RequestHandle) -> bool {
        self.context.registry.cancel(handle)
    }

    /// Cancel every send of this session, e.g. when the test panel closes.
    pub fn cancel_all(&self) -> usize {
        self.context.registry.cancel_all()
    }
}

/// A dispatched send awaiting its response.
pub struct InFlight {
    context: Arc<PipelineContext>,
    method: HttpMethod,
    url: String,
    pending: PendingResponse,
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("handle", &self.pending.handle())
            .finish()
    }
}

impl InFlight {
    pub fn handle(&self) -> RequestHandle {
        self.pending.handle()
    }

    /// Wait for the response, decode it, run the response hooks and hand the
    /// result to `present`.
    pub async fn complete<P>(self, present: P) -> SendOutcome
    where
        P: FnOnce(DecodedResponse),
    {
        let InFlight {
            context,
            method,
            url,
            pending,
        } = self;
        let handle = pending.handle();

        let raw = match pending.wait().await {
            Completion::Cancelled => {
                debug!(%handle, "send cancelled");
                return SendOutcome::Cancelled;
            }
            Completion::Response(raw) => raw,
        };
        if raw.status == 0 {
            debug!(%handle, "no response, skipping decode");
            present(DecodedResponse::unavailable(raw));
            return SendOutcome::TransportFailed;
        }

        debug!(%handle, status = raw.status, phase = %SendPhase::AwaitingDecode);
        let decoded = decoder::decode(raw).await;

        debug!(%handle, phase = %SendPhase::AfterHooks);
        let Some(response) = context.hooks.run_response_hooks(method, &url, decoded) else {
            debug!(%handle, "response hook cancelled the delivery");
            return SendOutcome::AbortedByHook {
                phase: SendPhase::AfterHooks,
            };
        };

        let status = response.status;
        present(response);
        debug!(%handle, status, phase = %SendPhase::Delivered);
        SendOutcome::Delivered { status }
    }
}
