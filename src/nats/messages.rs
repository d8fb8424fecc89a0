use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::session::{PhraseRecognitionExtra, RecognitionEvent, RecognitionStatus};

/// Recognition event message published to NATS
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionEventMessage {
    pub model_handle: i32,
    pub status: RecognitionStatus,
    pub capture_available: bool,
    pub capture_handle: i32,
    pub capture_delay_ms: u32,
    pub capture_preamble_ms: u32,
    pub trigger_in_data: bool,
    pub phrases: Vec<PhraseRecognitionExtra>,
    pub data: String,      // Base64-encoded event data
    pub timestamp: String, // RFC3339 timestamp
}

impl From<&RecognitionEvent> for RecognitionEventMessage {
    fn from(event: &RecognitionEvent) -> Self {
        Self {
            model_handle: event.model.0,
            status: event.status,
            capture_available: event.capture_available,
            capture_handle: event.capture_handle,
            capture_delay_ms: event.capture_delay_ms,
            capture_preamble_ms: event.capture_preamble_ms,
            trigger_in_data: event.trigger_in_data,
            phrases: event.phrases.clone(),
            data: base64::engine::general_purpose::STANDARD.encode(&event.data),
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Subject a recognition event for `model_handle` is published on
pub fn recognition_subject(prefix: &str, model_handle: i32) -> String {
    format!("{}.recognition.{}", prefix, model_handle)
}
