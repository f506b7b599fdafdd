//! HTTP surface of the accelerator.
//!
//! - POST /accel/events — page events for the prefetch controller
//! - POST /accel/message — worker control messages (SKIP_WAITING)
//! - GET /accel/stats — cache partitions + prefetch snapshot
//! - GET /health — liveness
//! - everything else — proxied to the upstream through the cache worker

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::fetch::{Destination, FetchRequest};
use crate::prefetch::controller::{ClickOutcome, ControllerSnapshot, Prefetcher};
use crate::prefetch::events::PageEvent;
use crate::worker::lifecycle::{CacheWorker, WorkerMessage};
use crate::worker::store::PartitionStats;

/// Application state shared across handlers.
pub struct AppState {
    pub worker: Arc<CacheWorker>,
    pub prefetcher: Prefetcher,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/accel/events", post(page_event))
        .route("/accel/message", post(worker_message))
        .route("/accel/stats", get(stats))
        .route("/health", get(health))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        // The game page may be served straight from the upstream during
        // development; its event beacons then arrive cross-origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── Control Responses ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EventAck {
    /// Set for click events: whether the link's data was already prefetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click: Option<ClickOutcome>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub worker_state: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub worker_state: String,
    pub partitions: Vec<PartitionStats>,
    pub prefetch: ControllerSnapshot,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn page_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<PageEvent>,
) -> Json<EventAck> {
    let click = state.prefetcher.handle_event(event).await;
    Json(EventAck { click })
}

async fn worker_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<WorkerMessage>,
) -> StatusCode {
    state.worker.handle_message(message).await;
    StatusCode::NO_CONTENT
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        worker_state: state.worker.state().await.to_string(),
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        worker_state: state.worker.state().await.to_string(),
        partitions: state.worker.storage().stats().await,
        prefetch: state.prefetcher.snapshot().await,
    })
}

/// Request headers worth forwarding upstream.
const FORWARDED_HEADERS: &[&str] = &[
    "accept",
    "accept-language",
    "user-agent",
    "x-requested-with",
    "cookie",
    "referer",
];

/// Hop-by-hop headers stripped from proxied responses.
fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

/// Fallback: rebuild the request for the worker and answer with whatever the
/// caching policies produce.
async fn proxy(State(state): State<Arc<AppState>>, req: Request) -> axum::response::Response {
    let request_id = Uuid::new_v4();
    let (parts, _body) = req.into_parts();

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let destination = parts
        .headers
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .and_then(Destination::from_sec_fetch_dest)
        .unwrap_or_else(|| Destination::infer_from_path(parts.uri.path()));

    let mut fetch_request = FetchRequest::get(url).with_destination(destination);
    for name in FORWARDED_HEADERS {
        if let Some(value) = parts.headers.get(*name).and_then(|v| v.to_str().ok()) {
            fetch_request = fetch_request.with_header(*name, value);
        }
    }

    debug!(
        %request_id,
        url = fetch_request.url,
        destination = ?fetch_request.destination,
        "Proxying request"
    );

    match state.worker.handle_fetch(&fetch_request).await {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut builder = Response::builder().status(status);
            for (name, value) in &response.headers {
                if !is_hop_by_hop(name) {
                    builder = builder.header(name, value);
                }
            }
            match builder.body(Body::from(response.body)) {
                Ok(resp) => resp,
                Err(err) => {
                    warn!(%request_id, error = %err, "Failed to rebuild upstream response");
                    StatusCode::BAD_GATEWAY.into_response()
                }
            }
        }
        Err(err) => {
            warn!(%request_id, url = fetch_request.url, error = %err, "Upstream unreachable");
            (StatusCode::BAD_GATEWAY, "upstream unreachable").into_response()
        }
    }
}
