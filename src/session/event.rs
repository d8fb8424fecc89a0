use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::config::{Cookie, ModelHandle};

/// Outcome reported to the recognition callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionStatus {
    /// The model triggered
    Success,
    /// Recognition was stopped by the subsystem (e.g. concurrent capture)
    Abort,
    /// The engine reported an error
    Failure,
}

/// Per-phrase detection detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRecognitionExtra {
    pub id: u32,
    pub recognition_modes: u32,
    /// Confidence in percent (0-100)
    pub confidence_level: u32,
}

/// Detection payload reported by the audio subsystem
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub phrases: Vec<PhraseRecognitionExtra>,
    /// Milliseconds between the trigger and the start of the captured audio
    #[serde(default)]
    pub capture_delay_ms: u32,
    /// Milliseconds of audio preceding the trigger included in the capture
    #[serde(default)]
    pub capture_preamble_ms: u32,
    /// Whether the captured audio contains the trigger itself
    #[serde(default)]
    pub trigger_in_data: bool,
    /// Opaque engine-specific event data
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Event delivered to the caller's recognition callback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionEvent {
    pub status: RecognitionStatus,
    pub model: ModelHandle,
    /// Captured audio can be read from the session
    pub capture_available: bool,
    /// Capture handle from the recognition config
    pub capture_handle: i32,
    pub capture_delay_ms: u32,
    pub capture_preamble_ms: u32,
    pub trigger_in_data: bool,
    pub phrases: Vec<PhraseRecognitionExtra>,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl RecognitionEvent {
    /// Event carrying no detection detail, e.g. an abort
    pub fn bare(status: RecognitionStatus, model: ModelHandle, capture_handle: i32) -> Self {
        Self {
            status,
            model,
            capture_available: false,
            capture_handle,
            capture_delay_ms: 0,
            capture_preamble_ms: 0,
            trigger_in_data: false,
            phrases: Vec::new(),
            data: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Caller-supplied recognition callback.
///
/// May be invoked on a subsystem-owned thread. It must not unload its own
/// session; stopping or re-arming recognition from inside is allowed.
pub type RecognitionCallback = Arc<dyn Fn(&RecognitionEvent, Cookie) + Send + Sync>;
