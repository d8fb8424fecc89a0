use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::device::ApiVersion;
use crate::error::TriggerError;
use crate::session::{Detection, ModelHandle, RecognitionConfig, SoundModel};

/// Subsystem-side stream bound to one sound model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub u64);

impl fmt::Display for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Asynchronous notification from the audio subsystem, keyed by model handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsystemEvent {
    /// The keyword engine matched the model
    Detected {
        model: ModelHandle,
        detection: Detection,
    },
    /// Recognition was dropped by the subsystem
    Aborted { model: ModelHandle },
    /// All captured audio has been handed out
    BufferingComplete { model: ModelHandle },
}

impl SubsystemEvent {
    pub fn model(&self) -> ModelHandle {
        match self {
            SubsystemEvent::Detected { model, .. }
            | SubsystemEvent::Aborted { model }
            | SubsystemEvent::BufferingComplete { model } => *model,
        }
    }
}

/// Inbound event channel handed to the subsystem at bind time
pub type EventSink = Arc<dyn Fn(SubsystemEvent) + Send + Sync>;

/// Session notifications forwarded to the audio HAL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureNotice {
    /// Recognition registered, the capture path is in use
    Registered,
    /// Recognition released
    Deregistered,
}

/// Audio subsystem capability set
///
/// The subsystem owns the microphone pipeline and the keyword engine. All
/// calls complete or fail within bounded time; events are delivered through
/// the [`EventSink`] passed to [`AudioSubsystem::bind`], possibly from a
/// subsystem-owned thread.
///
/// Implementations:
/// - Simulated: in-process engine driven by explicit detection injection
pub trait AudioSubsystem: Send + Sync {
    /// Establish the binding and install the event channel
    fn bind(&self, events: EventSink) -> Result<(), TriggerError>;

    /// Release the binding; open streams are discarded
    fn unbind(&self);

    /// Version symbol exported by the subsystem, if any
    fn api_version(&self) -> Option<ApiVersion>;

    /// Raw properties structure (may be longer than the decoded prefix)
    fn query_properties(&self) -> Result<Vec<u8>, TriggerError>;

    /// Open a detection stream for a sound model
    fn open_stream(
        &self,
        model: ModelHandle,
        sound_model: &SoundModel,
    ) -> Result<StreamHandle, TriggerError>;

    /// Close a stream opened by [`AudioSubsystem::open_stream`]
    fn close_stream(&self, stream: StreamHandle) -> Result<(), TriggerError>;

    /// Arm recognition on a stream
    fn register_recognition(
        &self,
        stream: StreamHandle,
        config: &RecognitionConfig,
    ) -> Result<(), TriggerError>;

    /// Disarm recognition on a stream
    fn deregister_recognition(&self, stream: StreamHandle) -> Result<(), TriggerError>;

    /// Stop streaming captured audio
    fn stop_buffering(&self, stream: StreamHandle) -> Result<(), TriggerError>;

    /// Copy captured audio into `buf`, returning the number of bytes written
    fn read_buffered_audio(
        &self,
        stream: StreamHandle,
        buf: &mut [u8],
    ) -> Result<usize, TriggerError>;

    /// Inform the audio HAL about a session's capture usage
    fn notify_capture(&self, _model: ModelHandle, _notice: CaptureNotice) {}

    /// Implementation name for logging
    fn name(&self) -> &str;
}

/// Subsystem implementation selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemKind {
    /// In-process simulated engine
    #[default]
    Simulated,
}
