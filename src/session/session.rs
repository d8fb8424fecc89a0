use chrono::Utc;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::{Cookie, ModelHandle, RecognitionConfig, SoundModel};
use super::event::{Detection, RecognitionCallback, RecognitionEvent, RecognitionStatus};
use super::state::SessionState;
use super::stats::SessionSnapshot;
use crate::error::TriggerError;
use crate::subsystem::{AudioSubsystem, CaptureNotice, StreamHandle, SubsystemEvent};

/// Recognition registered by the caller
struct Armed {
    config: RecognitionConfig,
    callback: RecognitionCallback,
    cookie: Cookie,
}

/// Mutable session state; fields change together under one lock
struct Inner {
    state: SessionState,
    model: Option<SoundModel>,
    stream: Option<StreamHandle>,
    armed: Option<Armed>,
    detections: u64,
}

impl Inner {
    fn invalid(&self, operation: &'static str) -> TriggerError {
        TriggerError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.model = None;
        self.stream = None;
        self.armed = None;
        self.detections = 0;
    }
}

/// One detection-model instance and its state machine
///
/// Transitions are serialized by a per-session lock, so caller threads and
/// subsystem callback threads can target the same session concurrently.
/// Callback delivery additionally holds the dispatch gate, which unload
/// acquires first: once unload returns, the callback is never invoked again.
pub struct Session {
    /// Immutable for the session's lifetime
    handle: ModelHandle,

    /// Capture pipeline and keyword engine
    subsystem: Arc<dyn AudioSubsystem>,

    inner: Mutex<Inner>,

    /// Held while a recognition callback runs
    dispatch: Mutex<()>,
}

impl Session {
    /// Create an IDLE session
    pub fn new(handle: ModelHandle, subsystem: Arc<dyn AudioSubsystem>) -> Self {
        Self {
            handle,
            subsystem,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                model: None,
                stream: None,
                armed: None,
                detections: 0,
            }),
            dispatch: Mutex::new(()),
        }
    }

    pub fn handle(&self) -> ModelHandle {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// IDLE -> LOADED: validate the model and bind a subsystem stream
    pub fn load_sound_model(&self, model: SoundModel) -> Result<(), TriggerError> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Idle {
            return Err(inner.invalid("load sound model"));
        }

        model.validate()?;
        let stream = self.subsystem.open_stream(self.handle, &model)?;

        info!(
            "Sound model {} loaded ({:?}, {} bytes) on {}",
            self.handle,
            model.kind,
            model.data.len(),
            stream
        );

        inner.model = Some(model);
        inner.stream = Some(stream);
        inner.state = SessionState::Loaded;
        Ok(())
    }

    /// Release the stream and model; recognition still armed is stopped first.
    ///
    /// Fails with `Busy` while buffering or stopping and with `InvalidState`
    /// before a model is loaded. Must not be called from inside this
    /// session's recognition callback.
    pub fn unload_sound_model(&self) -> Result<(), TriggerError> {
        let _dispatch = self.dispatch.lock();
        let mut inner = self.inner.lock();

        if inner.state.blocks_unload() {
            return Err(TriggerError::Busy { state: inner.state });
        }
        if inner.state == SessionState::Idle {
            return Err(inner.invalid("unload sound model"));
        }

        if inner.state.has_recognition() {
            self.finish_recognition(&mut inner)?;
        }

        if let Some(stream) = inner.stream {
            self.subsystem.close_stream(stream)?;
        }

        info!("Sound model {} unloaded", self.handle);
        inner.reset();
        Ok(())
    }

    /// LOADED/STOPPED/DETECTED -> ACTIVE: register the recognition with the subsystem
    pub fn start_recognition(
        &self,
        config: RecognitionConfig,
        callback: RecognitionCallback,
        cookie: Cookie,
    ) -> Result<(), TriggerError> {
        let mut inner = self.inner.lock();
        if !inner.state.can_start() {
            return Err(inner.invalid("start recognition"));
        }
        let stream = inner.stream.ok_or_else(|| inner.invalid("start recognition"))?;
        config.validate()?;

        if inner.state == SessionState::Detected {
            // One-shot detection still holds the previous registration
            self.subsystem.deregister_recognition(stream)?;
            self.subsystem
                .notify_capture(self.handle, CaptureNotice::Deregistered);
            inner.armed = None;
            inner.state = SessionState::Stopped;
        }

        self.subsystem.register_recognition(stream, &config)?;
        self.subsystem
            .notify_capture(self.handle, CaptureNotice::Registered);

        info!(
            "Recognition started for model {} (capture_requested={})",
            self.handle, config.capture_requested
        );

        inner.armed = Some(Armed {
            config,
            callback,
            cookie,
        });
        inner.state = SessionState::Active;
        Ok(())
    }

    /// ACTIVE/DETECTED/BUFFERING -> STOPPING -> STOPPED.
    ///
    /// A stop that failed half-way leaves the session in STOPPING and may be
    /// retried.
    pub fn stop_recognition(&self) -> Result<(), TriggerError> {
        let mut inner = self.inner.lock();
        if !inner.state.can_stop() {
            return Err(inner.invalid("stop recognition"));
        }

        self.finish_recognition(&mut inner)?;
        info!("Recognition stopped for model {}", self.handle);
        Ok(())
    }

    /// Copy captured audio into `buf`; only legal while BUFFERING
    pub fn read_buffer(&self, buf: &mut [u8]) -> Result<usize, TriggerError> {
        if buf.is_empty() {
            return Err(TriggerError::InvalidArgument(
                "read buffer is empty".to_string(),
            ));
        }

        let inner = self.inner.lock();
        if inner.state != SessionState::Buffering {
            return Err(inner.invalid("read buffered audio"));
        }
        let stream = inner.stream.ok_or_else(|| inner.invalid("read buffered audio"))?;

        self.subsystem.read_buffered_audio(stream, buf)
    }

    /// Apply an asynchronous subsystem event. Events that do not fit the
    /// current state (late, duplicate) are dropped.
    pub fn handle_event(&self, event: SubsystemEvent) {
        match event {
            SubsystemEvent::Detected { detection, .. } => self.on_detected(detection),
            SubsystemEvent::Aborted { .. } => self.on_aborted(),
            SubsystemEvent::BufferingComplete { .. } => self.on_buffering_complete(),
        }
    }

    fn on_detected(&self, detection: Detection) {
        let _dispatch = self.dispatch.lock();

        let (callback, cookie, event) = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Active {
                debug!(
                    "Dropping detection for model {} in state {:?}",
                    self.handle, inner.state
                );
                return;
            }
            let Some(armed) = inner.armed.as_ref() else {
                return;
            };

            let capture = armed.config.capture_requested;
            let event = RecognitionEvent {
                status: RecognitionStatus::Success,
                model: self.handle,
                capture_available: capture,
                capture_handle: armed.config.capture_handle,
                capture_delay_ms: detection.capture_delay_ms,
                capture_preamble_ms: detection.capture_preamble_ms,
                trigger_in_data: detection.trigger_in_data,
                phrases: detection.phrases,
                data: detection.data,
                timestamp: Utc::now(),
            };
            let callback = Arc::clone(&armed.callback);
            let cookie = armed.cookie;

            inner.detections += 1;
            inner.state = SessionState::Detected;
            if capture {
                inner.state = SessionState::Buffering;
            }

            (callback, cookie, event)
        };

        info!(
            "Model {} detected (capture_available={})",
            self.handle, event.capture_available
        );
        callback(&event, cookie);
    }

    fn on_aborted(&self) {
        let _dispatch = self.dispatch.lock();

        let (callback, cookie, capture_handle) = {
            let mut inner = self.inner.lock();
            if !matches!(
                inner.state,
                SessionState::Active | SessionState::Detected | SessionState::Buffering
            ) {
                debug!(
                    "Dropping abort for model {} in state {:?}",
                    self.handle, inner.state
                );
                return;
            }
            let Some(armed) = inner.armed.as_ref() else {
                return;
            };
            let armed = (
                Arc::clone(&armed.callback),
                armed.cookie,
                armed.config.capture_handle,
            );

            if let Err(e) = self.finish_recognition(&mut inner) {
                warn!(
                    "Failed to release aborted recognition for model {}: {}",
                    self.handle, e
                );
            }
            armed
        };

        warn!("Recognition aborted for model {}", self.handle);
        let event = RecognitionEvent::bare(RecognitionStatus::Abort, self.handle, capture_handle);
        callback(&event, cookie);
    }

    fn on_buffering_complete(&self) {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Buffering {
            debug!(
                "Dropping buffering-complete for model {} in state {:?}",
                self.handle, inner.state
            );
            return;
        }

        match self.finish_recognition(&mut inner) {
            Ok(()) => info!("Buffering complete for model {}", self.handle),
            Err(e) => warn!(
                "Failed to finish buffering for model {}: {}",
                self.handle, e
            ),
        }
    }

    /// Common tail of stop, abort and buffering completion
    fn finish_recognition(&self, inner: &mut Inner) -> Result<(), TriggerError> {
        let stream = inner.stream.ok_or_else(|| inner.invalid("stop recognition"))?;

        if inner.state == SessionState::Buffering {
            inner.state = SessionState::Stopping;
            self.subsystem.stop_buffering(stream)?;
        }
        inner.state = SessionState::Stopping;

        self.subsystem.deregister_recognition(stream)?;
        self.subsystem
            .notify_capture(self.handle, CaptureNotice::Deregistered);

        inner.armed = None;
        inner.state = SessionState::Stopped;
        Ok(())
    }

    /// Tear the session down regardless of state. Subsystem failures are
    /// logged, the session always ends up IDLE.
    pub(crate) fn release(&self) {
        let _dispatch = self.dispatch.lock();
        let mut inner = self.inner.lock();

        if let Some(stream) = inner.stream {
            if inner.state == SessionState::Buffering {
                if let Err(e) = self.subsystem.stop_buffering(stream) {
                    warn!("Failed to stop buffering for model {}: {}", self.handle, e);
                }
            }
            if inner.state.has_recognition() {
                if let Err(e) = self.subsystem.deregister_recognition(stream) {
                    warn!(
                        "Failed to deregister recognition for model {}: {}",
                        self.handle, e
                    );
                }
                self.subsystem
                    .notify_capture(self.handle, CaptureNotice::Deregistered);
            }
            if let Err(e) = self.subsystem.close_stream(stream) {
                warn!("Failed to close {} for model {}: {}", stream, self.handle, e);
            }
        }

        info!("Session {} released", self.handle);
        inner.reset();
    }

    /// Capture handle of the armed recognition
    pub fn capture_handle(&self) -> Option<i32> {
        self.inner
            .lock()
            .armed
            .as_ref()
            .map(|a| a.config.capture_handle)
    }

    /// Cookie of the armed recognition
    pub fn cookie(&self) -> Option<Cookie> {
        self.inner.lock().armed.as_ref().map(|a| a.cookie)
    }

    /// Callback of the armed recognition
    pub fn recognition_callback(&self) -> Option<RecognitionCallback> {
        self.inner
            .lock()
            .armed
            .as_ref()
            .map(|a| Arc::clone(&a.callback))
    }

    /// Config of the armed recognition
    pub fn recognition_config(&self) -> Option<RecognitionConfig> {
        self.inner.lock().armed.as_ref().map(|a| a.config.clone())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock();
        SessionSnapshot {
            handle: self.handle,
            state: inner.state,
            model_loaded: inner.model.is_some(),
            capture_handle: inner.armed.as_ref().map(|a| a.config.capture_handle),
            cookie: inner.armed.as_ref().map(|a| a.cookie),
            capture_requested: inner
                .armed
                .as_ref()
                .map(|a| a.config.capture_requested)
                .unwrap_or(false),
            detections: inner.detections,
        }
    }
}

// Sessions dropped without unload (a drained registry, a load that lost its
// entry) still hold a subsystem stream.
impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let Some(stream) = inner.stream.take() else {
            return;
        };

        warn!(
            "Session {} dropped in state {:?} with {} open",
            self.handle, inner.state, stream
        );
        if inner.state.has_recognition() {
            if let Err(e) = self.subsystem.deregister_recognition(stream) {
                warn!(
                    "Failed to deregister recognition for model {}: {}",
                    self.handle, e
                );
            }
            self.subsystem
                .notify_capture(self.handle, CaptureNotice::Deregistered);
        }
        if let Err(e) = self.subsystem.close_stream(stream) {
            warn!("Failed to close {} for model {}: {}", stream, self.handle, e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("subsystem", &self.subsystem.name())
            .finish()
    }
}
