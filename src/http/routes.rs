use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Device
        .route("/properties", get(handlers::get_properties))
        // Sound models
        .route("/models", post(handlers::load_model))
        .route(
            "/models/:handle",
            get(handlers::get_model_state).delete(handlers::unload_model),
        )
        // Recognition control
        .route(
            "/models/:handle/recognition/start",
            post(handlers::start_recognition),
        )
        .route(
            "/models/:handle/recognition/stop",
            post(handlers::stop_recognition),
        )
        // Detection output
        .route("/models/:handle/events", get(handlers::get_events))
        .route("/models/:handle/audio", get(handlers::read_audio))
        .route(
            "/models/:handle/simulate/detect",
            post(handlers::simulate_detect),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
