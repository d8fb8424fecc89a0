//! Detection session management
//!
//! This module provides the `Session` abstraction that manages:
//! - Sound model loading and its subsystem stream
//! - Arming and disarming recognition
//! - Delivery of detection and abort events to the caller's callback
//! - Streaming of captured audio after a detection
//!
//! Lifecycle: IDLE -> LOADED -> ACTIVE -> DETECTED -> BUFFERING -> STOPPING
//! -> STOPPED, with unload returning the session to IDLE.

mod config;
mod event;
mod session;
mod state;
mod stats;

pub use config::{
    ConfidenceLevel, Cookie, ModelHandle, Phrase, PhraseRecognitionConfig, RecognitionConfig,
    SoundModel, SoundModelKind, RECOGNITION_MODE_GENERIC_TRIGGER,
    RECOGNITION_MODE_USER_AUTHENTICATION, RECOGNITION_MODE_USER_IDENTIFICATION,
    RECOGNITION_MODE_VOICE_TRIGGER,
};
pub use event::{
    Detection, PhraseRecognitionExtra, RecognitionCallback, RecognitionEvent, RecognitionStatus,
};
pub use session::Session;
pub use state::SessionState;
pub use stats::SessionSnapshot;
