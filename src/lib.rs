pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod nats;
pub mod registry;
pub mod session;
pub mod subsystem;

pub use audio::{CaptureClip, CaptureMetadata, CaptureWriter};
pub use config::Config;
pub use device::{
    hw_module, ApiVersion, DeviceCoordinator, DeviceHandle, Properties, SoundTriggerHw,
    CORE_API_VERSION, SOUND_TRIGGER_HARDWARE_INTERFACE,
};
pub use error::{status_code, TriggerError};
pub use http::{create_router, AppState};
pub use nats::{EventPublisher, NatsPublisher, RecognitionEventMessage};
pub use registry::SessionRegistry;
pub use session::{
    Cookie, Detection, ModelHandle, RecognitionCallback, RecognitionConfig, RecognitionEvent,
    RecognitionStatus, Session, SessionSnapshot, SessionState, SoundModel, SoundModelKind,
};
pub use subsystem::{
    AudioSubsystem, SimulatedConfig, SimulatedSubsystem, Subsystem, SubsystemFactory,
};
