//! In-process photo server for client tests
//!
//! Serves the handful of endpoints the link client uses on an ephemeral
//! local port, backed by an in-memory pairing table.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use livelink::models::AssetId;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TEST_API_KEY: &str = "test-key-0123456789";

#[derive(Default)]
struct Library {
    /// photo id → linked video id
    photos: HashMap<AssetId, Option<AssetId>>,
    videos: HashSet<AssetId>,
    requests: usize,
}

type Shared = Arc<Mutex<Library>>;

/// Running mock server; aborted on drop
pub struct MockServer {
    pub base_url: String,
    library: Shared,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let library: Shared = Arc::default();
        let router = Router::new()
            .route("/api/server/ping", get(ping))
            .route("/api/users/me", get(current_user))
            .route("/api/assets/:id", get(get_asset).put(update_asset))
            .with_state(Arc::clone(&library));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            library,
            handle,
        }
    }

    pub fn add_photo(&self, pairing: Option<AssetId>) -> AssetId {
        let id = Uuid::new_v4();
        self.library.lock().unwrap().photos.insert(id, pairing);
        id
    }

    pub fn add_video(&self) -> AssetId {
        let id = Uuid::new_v4();
        self.library.lock().unwrap().videos.insert(id);
        id
    }

    pub fn pairing_of(&self, photo: AssetId) -> Option<AssetId> {
        self.library.lock().unwrap().photos.get(&photo).copied().flatten()
    }

    /// Authenticated requests served so far
    pub fn requests(&self) -> usize {
        self.library.lock().unwrap().requests
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(json!({ "error": error, "message": message, "statusCode": status.as_u16() })),
    )
        .into_response()
}

fn authorize(headers: &HeaderMap, library: &Shared) -> Result<(), Response> {
    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        Some(key) if key == TEST_API_KEY => {
            library.lock().unwrap().requests += 1;
            Ok(())
        }
        _ => Err(error_response(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "Invalid API key",
        )),
    }
}

async fn ping() -> Json<Value> {
    Json(json!({ "res": "pong" }))
}

async fn current_user(State(library): State<Shared>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&headers, &library) {
        return rejection;
    }
    Json(json!({ "id": Uuid::nil(), "name": "admin" })).into_response()
}

async fn get_asset(
    State(library): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<AssetId>,
) -> Response {
    if let Err(rejection) = authorize(&headers, &library) {
        return rejection;
    }
    let state = library.lock().unwrap();
    match state.photos.get(&id) {
        Some(pairing) => Json(json!({
            "id": id,
            "type": "IMAGE",
            "livePhotoVideoId": pairing,
        }))
        .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Not Found", "Asset not found"),
    }
}

async fn update_asset(
    State(library): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<AssetId>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejection) = authorize(&headers, &library) {
        return rejection;
    }
    let mut state = library.lock().unwrap();
    if !state.photos.contains_key(&id) {
        return error_response(StatusCode::NOT_FOUND, "Not Found", "Asset not found");
    }

    let video = match body.get("livePhotoVideoId") {
        Some(Value::Null) => None,
        Some(Value::String(raw)) => match Uuid::parse_str(raw) {
            Ok(video) if state.videos.contains(&video) => Some(video),
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Bad Request",
                    "Live photo video not found",
                )
            }
        },
        _ => return Json(json!({ "id": id })).into_response(),
    };

    state.photos.insert(id, video);
    Json(json!({ "id": id, "livePhotoVideoId": video })).into_response()
}
