//! HTTP API server for external control
//!
//! This module provides a REST API over the sound trigger device:
//! - GET /properties - Device properties
//! - POST /models - Load a sound model
//! - GET|DELETE /models/:handle - Query or unload a model
//! - POST /models/:handle/recognition/start|stop - Arm or disarm recognition
//! - GET /models/:handle/events - Recognition events delivered so far
//! - GET /models/:handle/audio - Read captured audio
//! - POST /models/:handle/simulate/detect - Inject a detection (simulated engine)
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
