pub mod client;
pub mod messages;

pub use client::{spawn_event_pump, EventPublisher, NatsPublisher};
pub use messages::{recognition_subject, RecognitionEventMessage};
