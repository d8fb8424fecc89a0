use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::device::{DeviceHandle, SoundTriggerHw};
use crate::session::{Cookie, ModelHandle, RecognitionCallback, RecognitionEvent};
use crate::subsystem::SimulatedSubsystem;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Control surface of the opened device
    pub hw: Arc<SoundTriggerHw>,

    /// Handle obtained from `open`, used for every call
    pub device: DeviceHandle,

    /// Recognition events delivered so far (model handle → events).
    /// Written from subsystem threads, hence a blocking lock.
    pub events: Arc<Mutex<HashMap<ModelHandle, Vec<RecognitionEvent>>>>,

    /// Forwarding channel to the event publisher, if one is running
    pub event_tx: Option<mpsc::UnboundedSender<RecognitionEvent>>,

    /// Detection injection for the simulated subsystem
    pub simulator: Option<Arc<SimulatedSubsystem>>,
}

impl AppState {
    pub fn new(hw: Arc<SoundTriggerHw>, device: DeviceHandle) -> Self {
        Self {
            hw,
            device,
            events: Arc::new(Mutex::new(HashMap::new())),
            event_tx: None,
            simulator: None,
        }
    }

    pub fn with_publisher(mut self, event_tx: mpsc::UnboundedSender<RecognitionEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn with_simulator(mut self, simulator: Arc<SimulatedSubsystem>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Callback registered for recognitions started over HTTP: records the
    /// event and forwards it to the publisher
    pub fn recognition_callback(&self) -> RecognitionCallback {
        let events = Arc::clone(&self.events);
        let event_tx = self.event_tx.clone();

        Arc::new(move |event: &RecognitionEvent, cookie: Cookie| {
            debug!(
                "Recognition event for model {} (status={:?}, cookie={:?})",
                event.model, event.status, cookie
            );

            events
                .lock()
                .entry(event.model)
                .or_default()
                .push(event.clone());

            if let Some(tx) = &event_tx {
                if tx.send(event.clone()).is_err() {
                    debug!(
                        "Event publisher is gone, event for model {} not forwarded",
                        event.model
                    );
                }
            }
        })
    }

    /// Events recorded for a model
    pub fn events_for(&self, handle: ModelHandle) -> Vec<RecognitionEvent> {
        self.events.lock().get(&handle).cloned().unwrap_or_default()
    }
}
