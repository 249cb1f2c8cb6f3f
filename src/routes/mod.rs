//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
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
/// - WebSocket at `/ws?token=...`
/// - JSON API under `/api/v1/...` (bearer-token auth for quiz endpoints)
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Identity
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/auth/signup", post(http::http_signup))
        .route("/api/v1/auth/login", post(http::http_login))
        .route("/api/v1/auth/guest", post(http::http_guest))
        .route("/api/v1/auth/logout", post(http::http_logout))
        .route("/api/v1/me", get(http::http_me))
        // Quiz
        .route("/api/v1/quiz", get(http::http_get_quiz))
        .route("/api/v1/quiz/start", post(http::http_start))
        .route("/api/v1/quiz/answer", post(http::http_answer))
        .route("/api/v1/quiz/next", post(http::http_next))
        .route("/api/v1/quiz/language", post(http::http_language))
        .route("/api/v1/quiz/abandon", post(http::http_abandon))
        .route("/api/v1/quiz/hint", get(http::http_hint))
        .route("/api/v1/leaderboard", get(http::http_leaderboard))
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
