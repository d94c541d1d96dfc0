//! Geo HTTP surface
//!
//! Two endpoints on :6906. `GET /polygons` serves the cached topology
//! payload; `POST /polygon` computes one on demand for a JSON array of
//! event identifiers. CORS is permissive and the headers are part of the
//! external contract, so they are set explicitly rather than through a
//! middleware layer.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::geo::builder::{build_on_demand, TopologyCache};
use crate::geo::UgcStore;
use crate::store::EventStore;

/// Payload content type.
const MSGPACK: &str = "application/msgpack";

#[derive(Clone)]
pub struct GeoApiState {
    pub store: EventStore,
    pub ugc: Arc<UgcStore>,
    pub cache: Arc<TopologyCache>,
}

pub fn create_app(state: GeoApiState) -> Router {
    Router::new()
        .route("/polygons", get(get_polygons))
        .route("/polygon", post(post_polygon).options(polygon_preflight))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_headers() -> [(HeaderName, &'static str); 2] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    ]
}

/// Bulk snapshot: whatever the periodic builder cached last.
async fn get_polygons(State(state): State<GeoApiState>) -> Response {
    let bytes = state.cache.bytes().await;
    (
        StatusCode::OK,
        cors_headers(),
        [(header::CONTENT_TYPE, MSGPACK)],
        bytes.as_ref().clone(),
    )
        .into_response()
}

/// On-demand payload for an explicit identifier list.
async fn post_polygon(
    State(state): State<GeoApiState>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> Response {
    let Ok(Json(identifiers)) = payload else {
        return (StatusCode::BAD_REQUEST, cors_headers(), "Invalid request body").into_response();
    };
    if identifiers.is_empty() {
        return (StatusCode::BAD_REQUEST, cors_headers(), "No alert IDs provided").into_response();
    }

    match build_on_demand(&state.store, &state.ugc, &identifiers).await {
        Ok(bytes) => (
            StatusCode::OK,
            cors_headers(),
            [(header::CONTENT_TYPE, MSGPACK)],
            bytes,
        )
            .into_response(),
        Err(err) => {
            error!(%err, "on-demand geometry failed");
            (StatusCode::INTERNAL_SERVER_ERROR, cors_headers(), "Failed to create geometry")
                .into_response()
        }
    }
}

async fn polygon_preflight() -> Response {
    (
        StatusCode::NO_CONTENT,
        cors_headers(),
        [(header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS")],
    )
        .into_response()
}
