use std::{collections::BTreeMap, collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// The eight-byte PNG signature followed by a truncated IHDR chunk; enough
/// for content sniffing, not a viewable image.
pub const AVATAR_PNG: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, b'I', b'H', b'D', b'R',
];

pub const REPORT_CSV: &str = "id,name\n1,a\n";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub age: Option<i64>,
    pub avatar_size: Option<usize>,
}

#[derive(Default)]
pub struct Store {
    next_id: u64,
    users: BTreeMap<u64, User>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/api.json", get(catalogue))
        .route("/users", get(get_users).post(create_user).delete(delete_user))
        .route("/echo", get(echo_query).post(echo_form).put(echo_form))
        .route("/headers", get(echo_headers))
        .route("/avatar.png", get(avatar))
        .route("/report", get(report))
        .route("/plain", get(plain))
        .route("/broken", get(broken_json))
        .route("/slow", get(slow))
        .route("/status/{code}", get(status))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Route metadata in the shape the console loads it.
pub fn catalogue_json() -> Value {
    json!([
        {
            "module": "users",
            "name": "get",
            "method": "GET",
            "path": "/users",
            "arguments": [
                {"name": "id", "type": "int", "has_default": false, "default": null}
            ]
        },
        {
            "module": "users",
            "name": "create",
            "method": "POST",
            "path": "/users",
            "arguments": [
                {"name": "name", "type": "str", "has_default": false, "default": null},
                {"name": "age", "type": "int", "has_default": true, "default": 18},
                {"name": "avatar", "type": "HttpFile", "is_file": true, "has_default": true, "default": null}
            ]
        },
        {
            "module": "users",
            "name": "delete",
            "method": "DELETE",
            "path": "/users",
            "arguments": [
                {"name": "id", "type": "int", "has_default": false, "default": null}
            ]
        },
        {
            "module": "media",
            "name": "avatar",
            "method": "GET",
            "path": "/avatar.png",
            "arguments": []
        },
        {
            "module": "debug",
            "name": "echo",
            "method": "POST",
            "path": "/echo",
            "arguments": [
                {"name": "kwargs", "type": "dict", "is_variable": true}
            ],
            "headers": [["x-debug", "1"]]
        }
    ])
}

async fn catalogue() -> Json<Value> {
    Json(catalogue_json())
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "user not found"}))).into_response()
}

async fn get_users(State(db): State<Db>, Query(query): Query<HashMap<String, String>>) -> Response {
    let store = db.read().await;
    match query.get("id") {
        None => Json(store.users.values().cloned().collect::<Vec<_>>()).into_response(),
        Some(id) => match id.parse::<u64>().ok().and_then(|id| store.users.get(&id)) {
            Some(user) => Json(user.clone()).into_response(),
            None => not_found(),
        },
    }
}

async fn create_user(State(db): State<Db>, mut multipart: Multipart) -> Response {
    let mut name = None;
    let mut age = None;
    let mut avatar_size = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return e.into_response(),
        };
        let field_name = field.name().unwrap_or_default().to_string();
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return e.into_response(),
        };
        match field_name.as_str() {
            "name" => name = Some(String::from_utf8_lossy(&data).into_owned()),
            "age" => age = String::from_utf8_lossy(&data).parse().ok(),
            "avatar" => avatar_size = Some(data.len()),
            _ => {}
        }
    }

    let Some(name) = name else {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"error": "name is required"}))).into_response();
    };
    let mut store = db.write().await;
    store.next_id += 1;
    let user = User {
        id: store.next_id,
        name,
        age,
        avatar_size,
    };
    store.users.insert(user.id, user.clone());
    (StatusCode::CREATED, Json(user)).into_response()
}

async fn delete_user(State(db): State<Db>, Query(query): Query<HashMap<String, String>>) -> StatusCode {
    let id = query.get("id").and_then(|id| id.parse::<u64>().ok());
    let mut store = db.write().await;
    match id.and_then(|id| store.users.remove(&id)) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

async fn echo_query(Query(query): Query<BTreeMap<String, String>>) -> Json<Value> {
    Json(json!({ "query": query }))
}

/// Echo a multipart body: text fields by value, files by name, type and size.
async fn echo_form(mut multipart: Multipart) -> Response {
    let mut fields = serde_json::Map::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return e.into_response(),
        };
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => return e.into_response(),
        };
        let value = match file_name {
            Some(file_name) => json!({
                "filename": file_name,
                "content_type": content_type,
                "size": data.len(),
            }),
            None => Value::String(String::from_utf8_lossy(&data).into_owned()),
        };
        fields.insert(name, value);
    }
    Json(json!({ "form": fields })).into_response()
}

async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, String>> {
    Json(
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
    )
}

async fn avatar() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], AVATAR_PNG)
}

async fn report() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"users%20report.csv\""),
        ],
        REPORT_CSV,
    )
}

async fn plain() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], "hello, console")
}

async fn broken_json() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "{not json")
}

/// Answers after `ms` milliseconds, 30 seconds by default.
async fn slow(Query(query): Query<HashMap<String, String>>) -> &'static str {
    let ms = query.get("ms").and_then(|ms| ms.parse().ok()).unwrap_or(30_000);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "finally"
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(code) => (code, code.canonical_reason().unwrap_or("").to_string()).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
