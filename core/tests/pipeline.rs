//! End-to-end behaviour of a send, over a scripted in-memory transport.
//!
//! # Design
//! `Scripted` records every request it is handed and answers with a canned
//! response, optionally holding it back until a gate opens so tests can
//! cancel sends while they are in flight.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use console_core::{
    ConsoleConfig, Dispatch, FieldMap, FieldType, FieldValue, FilePart, Hook, HookOutcome, HttpMethod,
    PipelineContext, RawResponse, ResponseData, SendOutcome, SendPhase, TestExecutionController, TestRequest,
    Transport, TransportError, TransportRequest,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Semaphore;

struct Scripted {
    response: Option<RawResponse>,
    gate: Option<Arc<Semaphore>>,
    seen: Mutex<Vec<TransportRequest>>,
}

impl Scripted {
    fn answering(content_type: &str, body: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            response: Some(RawResponse::new(
                200,
                "OK",
                vec![("Content-Type".to_string(), content_type.to_string())],
                body.to_vec(),
            )),
            gate: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn gated(gate: &Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            response: Some(RawResponse::new(200, "OK", Vec::new(), "late")),
            gate: Some(Arc::clone(gate)),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn refusing() -> Arc<Self> {
        Arc::new(Self {
            response: None,
            gate: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<TransportRequest> {
        self.seen.lock().clone()
    }
}

impl Transport for Scripted {
    fn execute(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send {
        self.seen.lock().push(request);
        let response = self.response.clone();
        let gate = self.gate.clone();
        async move {
            if let Some(gate) = gate {
                let _permit = gate.acquire().await;
            }
            response.ok_or_else(|| TransportError::Request("connection refused".to_string()))
        }
    }
}

fn controller(transport: &Arc<Scripted>) -> TestExecutionController<Scripted> {
    controller_with(ConsoleConfig::default(), transport)
}

fn controller_with(config: ConsoleConfig, transport: &Arc<Scripted>) -> TestExecutionController<Scripted> {
    TestExecutionController::new(Arc::new(PipelineContext::new(config)), Arc::clone(transport))
}

fn get(url: &str) -> TestRequest {
    TestRequest {
        method: Some(HttpMethod::Get),
        url: url.to_string(),
        ..TestRequest::default()
    }
}

fn header<'a>(request: &'a TransportRequest, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

// --- building ---

#[tokio::test]
async fn query_method_sends_coerced_fields_in_the_url() {
    let transport = Scripted::answering("text/plain", b"ok");
    let fields = FieldMap::new()
        .with("id", FieldValue::typed(" 5 ", FieldType::Int))
        .with("page", FieldValue::typed("x", FieldType::Int))
        .with("q", FieldValue::text("a b"));

    let outcome = controller(&transport)
        .send(get("http://h/users").fields(fields), |_| {})
        .await;

    assert_eq!(outcome, SendOutcome::Delivered { status: 200 });
    let seen = transport.seen();
    assert_eq!(seen[0].url, "http://h/users?id=5&q=a+b");
    assert!(seen[0].body.is_none());
    assert_eq!(header(&seen[0], "x-requested-with"), Some("XMLHttpRequest"));
}

#[tokio::test]
async fn post_sends_a_multipart_body_with_the_file() {
    let transport = Scripted::answering("text/plain", b"ok");
    let fields = FieldMap::new()
        .with("name", FieldValue::text("a"))
        .with("avatar", FieldValue::file(FilePart::new("a.png", "image/png", vec![1u8, 2, 3])));
    let request = TestRequest {
        method: Some(HttpMethod::Post),
        url: "http://h/users".to_string(),
        fields,
        ..TestRequest::default()
    };

    controller(&transport).send(request, |_| {}).await;

    let seen = transport.seen();
    let content_type = header(&seen[0], "content-type").unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(seen[0].body.as_deref().unwrap()).into_owned();
    assert!(body.contains("name=\"name\"\r\n\r\na\r\n"));
    assert!(body.contains("filename=\"a.png\""));
    assert!(body.contains("Content-Type: image/png"));
}

#[tokio::test]
async fn configured_headers_come_before_user_headers() {
    let transport = Scripted::answering("text/plain", b"ok");
    let config = ConsoleConfig {
        default_headers: vec![("x-env".to_string(), "test".to_string())],
        ..ConsoleConfig::default()
    };

    controller_with(config, &transport)
        .send(get("http://h/").header("x-user", "1"), |_| {})
        .await;

    let names: Vec<String> = transport.seen()[0].headers.iter().map(|(n, _)| n.clone()).collect();
    let env = names.iter().position(|n| n == "x-env").unwrap();
    let user = names.iter().position(|n| n == "x-user").unwrap();
    assert!(env < user);
}

// --- request hooks ---

#[tokio::test]
async fn request_hooks_run_in_registration_order() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    let hooks = controller.context().hooks();
    hooks.on_request(|_, _, mut options| {
        options.headers.push(("x-a".to_string(), "1".to_string()));
        HookOutcome::Continue(options)
    });
    hooks.on_request(|_, _, mut options| {
        let seen_a = options.headers.iter().any(|(n, _)| n == "x-a");
        options.params.push(("b_saw_a".to_string(), seen_a.to_string()));
        HookOutcome::Continue(options)
    });

    controller.send(get("http://h/x"), |_| {}).await;

    let seen = transport.seen();
    assert_eq!(seen[0].url, "http://h/x?b_saw_a=true");
    assert_eq!(header(&seen[0], "x-a"), Some("1"));
}

#[tokio::test]
async fn aborting_request_hook_stops_the_send() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    controller.context().hooks().on_request(|_, _, _| HookOutcome::Abort);

    let mut presented = false;
    let outcome = controller.send(get("http://h/x"), |_| presented = true).await;

    assert_eq!(
        outcome,
        SendOutcome::AbortedByHook {
            phase: SendPhase::BeforeHooks
        }
    );
    assert!(!presented);
    assert!(transport.seen().is_empty());
    assert!(controller.context().registry().is_empty());
}

#[tokio::test]
async fn json_hook_returning_false_aborts() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    assert!(controller
        .context()
        .hooks()
        .on("request", Hook::request_json(|_, _, _| json!(false))));

    assert!(matches!(controller.dispatch(get("http://h/x")), Dispatch::Aborted));
}

#[tokio::test]
async fn invalid_hook_result_is_skipped() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    let hooks = controller.context().hooks();
    hooks.on("request", Hook::request_json(|_, _, _| json!(42)));
    hooks.on("request", Hook::request_json(|_, _, mut options| {
        options["headers"] = json!([["x-json", "yes"]]);
        options
    }));

    let outcome = controller.send(get("http://h/x"), |_| {}).await;

    assert_eq!(outcome, SendOutcome::Delivered { status: 200 });
    assert_eq!(header(&transport.seen()[0], "x-json"), Some("yes"));
}

#[tokio::test]
async fn unknown_hook_name_is_rejected() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    let hooks = controller.context().hooks();

    assert!(!hooks.on("before", Hook::request(|_, _, options| HookOutcome::Continue(options))));
    assert!(!hooks.on("response", Hook::request(|_, _, options| HookOutcome::Continue(options))));
    assert_eq!(hooks.request_hook_count(), 0);
    assert_eq!(hooks.response_hook_count(), 0);
}

// --- decoding and response hooks ---

#[tokio::test]
async fn json_body_is_delivered_parsed() {
    let transport = Scripted::answering("application/json; charset=utf-8", br#"{"name":"a"}"#);

    let mut delivered = None;
    controller(&transport)
        .send(get("http://h/users"), |response| delivered = Some(response))
        .await;

    let response = delivered.unwrap();
    assert!(response.is_text);
    assert!(response.is_success());
    assert_eq!(response.data, ResponseData::Json(json!({"name": "a"})));
}

#[tokio::test]
async fn image_body_is_delivered_as_data_uri() {
    let transport = Scripted::answering("image/png", &[0x89, b'P', b'N', b'G']);

    let mut delivered = None;
    controller(&transport)
        .send(get("http://h/logo.png"), |response| delivered = Some(response))
        .await;

    let response = delivered.unwrap();
    assert!(!response.is_text);
    assert_eq!(response.data.as_data_uri(), Some("data:image/png;base64,iVBORw=="));
}

#[tokio::test]
async fn response_hook_can_replace_the_response() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    controller.context().hooks().on(
        "response",
        Hook::response_json(|_, _, mut response| {
            response["status_text"] = json!("Patched");
            response
        }),
    );

    let mut delivered = None;
    controller
        .send(get("http://h/x"), |response| delivered = Some(response))
        .await;

    let response = delivered.unwrap();
    assert_eq!(response.status_text, "Patched");
    assert_eq!(response.data.as_text(), Some("ok"));
}

#[tokio::test]
async fn aborting_response_hook_suppresses_delivery() {
    let transport = Scripted::answering("text/plain", b"ok");
    let controller = controller(&transport);
    controller.context().hooks().on_response(|_, _, _| HookOutcome::Abort);

    let mut presented = false;
    let outcome = controller.send(get("http://h/x"), |_| presented = true).await;

    assert_eq!(
        outcome,
        SendOutcome::AbortedByHook {
            phase: SendPhase::AfterHooks
        }
    );
    assert!(!presented);
    assert_eq!(transport.seen().len(), 1);
}

#[tokio::test]
async fn transport_failure_delivers_status_zero_without_response_hooks() {
    let transport = Scripted::refusing();
    let controller = controller(&transport);
    let response_hooks_run = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&response_hooks_run);
    controller.context().hooks().on_response(move |_, _, response| {
        counter.fetch_add(1, Ordering::SeqCst);
        HookOutcome::Continue(response)
    });

    let mut delivered = None;
    let outcome = controller
        .send(get("http://h/x"), |response| delivered = Some(response))
        .await;

    assert_eq!(outcome, SendOutcome::TransportFailed);
    assert_eq!(delivered.unwrap().status, 0);
    assert_eq!(response_hooks_run.load(Ordering::SeqCst), 0);
    assert!(controller.context().registry().is_empty());
}

// --- cancellation ---

#[tokio::test]
async fn cancelling_one_send_leaves_the_other() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Scripted::gated(&gate);
    let controller = controller(&transport);

    let Dispatch::Sent(first) = controller.dispatch(get("http://h/7")) else {
        panic!("first send aborted");
    };
    let Dispatch::Sent(second) = controller.dispatch(get("http://h/8")) else {
        panic!("second send aborted");
    };
    assert_ne!(first.handle(), second.handle());

    assert!(controller.cancel(first.handle()));
    assert!(!controller.cancel(first.handle()));
    assert_eq!(controller.context().registry().len(), 1);

    gate.add_permits(8);
    let mut first_presented = false;
    assert_eq!(first.complete(|_| first_presented = true).await, SendOutcome::Cancelled);
    assert!(!first_presented);

    let mut second_status = None;
    let outcome = second.complete(|response| second_status = Some(response.status)).await;
    assert_eq!(outcome, SendOutcome::Delivered { status: 200 });
    assert_eq!(second_status, Some(200));
    assert!(controller.context().registry().is_empty());
}

#[tokio::test]
async fn cancel_all_stops_every_pending_send() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = Scripted::gated(&gate);
    let controller = controller(&transport);

    let sends: Vec<_> = ["http://h/a", "http://h/b", "http://h/c"]
        .into_iter()
        .filter_map(|url| match controller.dispatch(get(url)) {
            Dispatch::Sent(in_flight) => Some(in_flight),
            Dispatch::Aborted => None,
        })
        .collect();

    assert_eq!(controller.cancel_all(), 3);
    assert_eq!(controller.cancel_all(), 0);
    gate.add_permits(8);
    for in_flight in sends {
        assert_eq!(in_flight.complete(|_| {}).await, SendOutcome::Cancelled);
    }
}
