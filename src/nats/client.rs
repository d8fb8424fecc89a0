use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::messages::{recognition_subject, RecognitionEventMessage};
use crate::session::RecognitionEvent;

/// Sink for recognition events leaving the process
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &RecognitionEvent) -> Result<()>;

    /// Publisher name for logging
    fn name(&self) -> &str;
}

pub struct NatsPublisher {
    client: Client,
    subject_prefix: String,
}

impl NatsPublisher {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject_prefix: subject_prefix.into(),
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &RecognitionEvent) -> Result<()> {
        let subject = recognition_subject(&self.subject_prefix, event.model.0);
        let message = RecognitionEventMessage::from(event);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish recognition event")?;

        info!(
            "Published recognition event to {} (status={:?}, capture_available={})",
            subject, event.status, event.capture_available
        );

        Ok(())
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Forward events from subsystem threads to `publisher` until every sender
/// is dropped. Publish failures are logged and do not stop the pump.
pub fn spawn_event_pump(
    publisher: Box<dyn EventPublisher>,
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = publisher.publish(&event).await {
                warn!(
                    "Failed to publish event for model {} via {}: {:#}",
                    event.model,
                    publisher.name(),
                    e
                );
            }
        }
        info!("Event pump for {} stopped", publisher.name());
    })
}
