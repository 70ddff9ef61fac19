//! HTTP control surface
//!
//! JSON endpoints for playback intents and session settings, plus an SSE
//! stream of controller events.

pub mod handlers;
pub mod sse;

use crate::playback::PlaybackController;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: PlaybackController,
}

/// Create the API router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Playback control
        .route("/playback/status", get(handlers::status))
        .route("/playback/load", post(handlers::load))
        .route("/playback/toggle", post(handlers::toggle))
        .route("/playback/play", post(handlers::play))
        .route("/playback/pause", post(handlers::pause))
        .route("/playback/seek", post(handlers::seek))
        // Session
        .route("/session/affirmations", put(handlers::set_affirmations))
        .route("/session/info", put(handlers::set_session_info))
        .route("/session/entitlement", put(handlers::set_entitlement))
        .route("/session/resume", post(handlers::resume))
        // Settings side channel
        .route("/settings/voice", put(handlers::set_voice))
        .route("/settings/mix", put(handlers::update_mix))
        // SSE event stream
        .route("/events", get(sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
