//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS,
//! and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) - adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/topic", post(http::http_start_topic))
        .route("/api/v1/clarify", post(http::http_clarify))
        .route("/api/v1/courses", get(http::http_list_courses))
        .route("/api/v1/courses/:id", get(http::http_get_course))
        .route("/api/v1/courses/:id", delete(http::http_delete_course))
        .route("/api/v1/courses/:id/activate", post(http::http_activate_course))
        .route("/api/v1/courses/:id/lesson", post(http::http_open_lesson))
        .route("/api/v1/courses/:id/advance", post(http::http_advance))
        .route("/api/v1/courses/:id/quiz/start", post(http::http_start_quiz))
        .route("/api/v1/courses/:id/quiz", post(http::http_submit_quiz))
        .route("/api/v1/courses/:id/code", post(http::http_submit_code))
        .route("/api/v1/courses/:id/expand", post(http::http_expand_course))
        .route("/api/v1/courses/:id/video", post(http::http_generate_video))
        .route("/api/v1/run_code", post(http::http_run_code))
        .route("/api/v1/media/edit", post(http::http_edit_image))
        .route("/api/v1/media/animate", post(http::http_animate_image))
        .route("/api/v1/preferences", get(http::http_get_preferences))
        .route("/api/v1/preferences", post(http::http_set_preferences))
        .route("/api/v1/reset", post(http::http_reset))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
