use serde::Serialize;

use super::config::{Cookie, ModelHandle};
use super::state::SessionState;

/// Consistent point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session handle
    pub handle: ModelHandle,

    /// Current state
    pub state: SessionState,

    /// Whether a sound model is loaded
    pub model_loaded: bool,

    /// Capture handle from the active recognition config, if armed
    pub capture_handle: Option<i32>,

    /// Caller cookie, if armed
    pub cookie: Option<Cookie>,

    /// Whether captured audio was requested on detection
    pub capture_requested: bool,

    /// Number of detections delivered since load
    pub detections: u64,
}
