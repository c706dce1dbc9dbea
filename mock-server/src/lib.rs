//! Local HTTP server used by the client's integration tests.
//!
//! Besides a small in-memory `users` resource it exposes routes that reflect
//! the request back (`/echo`, `/inspect`), answer with any status
//! (`/status/{code}`), serve non-JSON documents (`/feed.xml`, `/page`) and
//! stream arbitrarily large bodies (`/bytes/{len}`).

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Body of every non-2xx response.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// What `/inspect` saw of the request.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Inspection {
    pub method: String,
    /// Raw query string, still encoded.
    pub query: String,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Default)]
pub struct Store {
    next_id: u64,
    users: BTreeMap<u64, User>,
}

pub type Db = Arc<RwLock<Store>>;

pub const FEED_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Mock Feed</title>
    <link>http://localhost/</link>
    <item><title>First post</title></item>
    <item><title>Second post</title></item>
  </channel>
</rss>"#;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/echo", any(echo))
        .route("/inspect", any(inspect))
        .route("/status/{code}", any(status))
        .route("/feed.xml", get(feed))
        .route("/page", get(page))
        .route("/bytes/{len}", get(bytes))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: message.into() }))
}

fn user_not_found(id: u64) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("user {id} not found"))
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    let store = db.read().await;
    Json(store.users.values().cloned().collect())
}

async fn create_user(State(db): State<Db>, Json(input): Json<CreateUser>) -> (StatusCode, Json<User>) {
    let mut store = db.write().await;
    store.next_id += 1;
    let user = User {
        id: store.next_id,
        name: input.name,
        email: input.email,
    };
    store.users.insert(user.id, user.clone());
    debug!(id = user.id, "created user");
    (StatusCode::CREATED, Json(user))
}

async fn get_user(State(db): State<Db>, Path(id): Path<u64>) -> Result<Json<User>, ApiError> {
    let store = db.read().await;
    store.users.get(&id).cloned().map(Json).ok_or_else(|| user_not_found(id))
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>, ApiError> {
    let mut store = db.write().await;
    let user = store.users.get_mut(&id).ok_or_else(|| user_not_found(id))?;
    if let Some(name) = input.name {
        user.name = name;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    Ok(Json(user.clone()))
}

async fn delete_user(State(db): State<Db>, Path(id): Path<u64>) -> Result<StatusCode, ApiError> {
    let mut store = db.write().await;
    store
        .users
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| user_not_found(id))
}

/// Respond with the request body under the request's Content-Type.
async fn echo(headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("text/plain"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn inspect(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes) -> Json<Inspection> {
    let headers = headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string()))
        .collect();
    Json(Inspection {
        method: method.to_string(),
        query: query.unwrap_or_default(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> ApiError {
    match StatusCode::from_u16(code) {
        Ok(status) => api_error(status, status.canonical_reason().unwrap_or("unknown status")),
        Err(_) => api_error(StatusCode::BAD_REQUEST, format!("invalid status code {code}")),
    }
}

async fn feed() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/rss+xml")], FEED_XML)
}

async fn page() -> Html<&'static str> {
    Html("<html><body><h1>Mock Page</h1></body></html>")
}

/// Largest body `/bytes/{len}` will produce.
pub const MAX_BYTES: usize = 64 * 1024 * 1024;

/// `len` bytes of `x` as `application/octet-stream`.
async fn bytes(Path(len): Path<usize>) -> Result<impl IntoResponse, ApiError> {
    if len > MAX_BYTES {
        return Err(api_error(StatusCode::BAD_REQUEST, format!("at most {MAX_BYTES} bytes")));
    }
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], vec![b'x'; len]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_serializes_to_json() {
        let user = User {
            id: 7,
            name: "Leanne Graham".to_string(),
            email: "sincere@april.biz".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Leanne Graham");
        assert_eq!(json["email"], "sincere@april.biz");
    }

    #[test]
    fn create_user_defaults_email() {
        let input: CreateUser = serde_json::from_str(r#"{"name":"Ervin"}"#).unwrap();
        assert_eq!(input.name, "Ervin");
        assert!(input.email.is_empty());
    }

    #[test]
    fn create_user_rejects_missing_name() {
        let result: Result<CreateUser, _> = serde_json::from_str(r#"{"email":"x@y.z"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn update_user_all_fields_optional() {
        let input: UpdateUser = serde_json::from_str("{}").unwrap();
        assert!(input.name.is_none());
        assert!(input.email.is_none());
    }
}
