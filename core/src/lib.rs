//! Test-request execution pipeline for an interactive route console.
//!
//! # Overview
//! Takes the argument values a user entered for a route, turns them into a
//! request, threads it through caller-registered hooks, executes it over a
//! cancellable transport and decodes whatever comes back into something a
//! presentation layer can preview or offer for download.
//!
//! # Design
//! - `RequestBuilder` → `HookChain` (request) → `RequestRegistry` +
//!   `Transport` → `decoder` → `HookChain` (response) → presentation
//!   callback, orchestrated by `TestExecutionController`.
//! - A send never returns an error: failures degrade to a status-0
//!   response, a raw-text fallback, or a skipped stage.
//! - The registry table is the only shared mutable state, and presence of
//!   an entry is the only cancellation guard.
//! - Rendering is left to the caller; `preview` only classifies what can be
//!   shown and builds download links.

pub mod builder;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod hooks;
pub mod http;
pub mod preview;
pub mod registry;
pub mod route;
pub mod transport;

pub use builder::{collect_headers, HeaderRow, RequestBuilder};
pub use config::ConsoleConfig;
pub use controller::{Dispatch, InFlight, PipelineContext, SendOutcome, SendPhase, TestExecutionController, TestRequest};
pub use decoder::{DecodedResponse, ResponseData};
pub use error::ConsoleError;
pub use hooks::{Hook, HookChain, HookOutcome};
pub use http::{FilePart, FormValue, HttpMethod, RawResponse, Request, RequestOptions, TransportRequest};
pub use preview::{Preview, SaveAs};
pub use registry::{Completion, PendingResponse, RequestHandle, RequestRegistry};
pub use route::{ArgumentSpec, FieldInput, FieldMap, FieldType, FieldValue, RouteMeta};
pub use transport::{Transport, TransportError, UreqTransport};
