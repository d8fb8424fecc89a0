// In-process audio subsystem
//
// Stands in for the capture pipeline and keyword engine. Detections are
// injected explicitly (tests, the `simulate` command, the HTTP debug route)
// and delivered through the bound event sink, either on the calling thread
// or on a spawned "engine" thread.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use super::backend::{
    AudioSubsystem, CaptureNotice, EventSink, StreamHandle, SubsystemEvent,
};
use crate::device::{ApiVersion, Properties, CORE_API_VERSION};
use crate::error::TriggerError;
use crate::session::{Detection, ModelHandle, RecognitionConfig, SoundModel};

/// Configuration for the simulated subsystem
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// Exported version symbol (None = legacy build without one)
    pub api_version: Option<ApiVersion>,
    /// Properties served by `query_properties`
    pub properties: Properties,
    /// Captured audio (16-bit PCM) streamed after a detection
    pub capture: Vec<i16>,
    /// Sample rate of `capture`
    pub sample_rate: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            api_version: Some(CORE_API_VERSION),
            properties: Properties::default(),
            capture: Vec::new(),
            sample_rate: 16000,
        }
    }
}

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOp {
    Bind,
    OpenStream,
    RegisterRecognition,
    DeregisterRecognition,
}

#[derive(Debug)]
struct SimStream {
    model: ModelHandle,
    recognition: Option<RecognitionConfig>,
    buffering: bool,
    cursor: usize,
}

#[derive(Default)]
struct SimState {
    sink: Option<EventSink>,
    bind_count: u32,
    next_stream: u64,
    streams: HashMap<StreamHandle, SimStream>,
    notices: Vec<(ModelHandle, CaptureNotice)>,
    failing: Vec<FailOp>,
    properties_len: Option<usize>,
}

/// Simulated audio subsystem
pub struct SimulatedSubsystem {
    config: SimulatedConfig,
    state: Mutex<SimState>,
}

impl SimulatedSubsystem {
    pub fn new(config: SimulatedConfig) -> Self {
        info!(
            "Simulated subsystem initialized ({} capture samples at {}Hz)",
            config.capture.len(),
            config.sample_rate
        );

        Self {
            config,
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    /// Force `op` to fail (or succeed again)
    pub fn set_failure(&self, op: FailOp, fail: bool) {
        let mut state = self.state.lock();
        state.failing.retain(|f| *f != op);
        if fail {
            state.failing.push(op);
        }
    }

    /// Truncate (or pad) the properties structure to `len` bytes
    pub fn set_properties_len(&self, len: Option<usize>) {
        self.state.lock().properties_len = len;
    }

    pub fn is_bound(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// How many times a binding was established
    pub fn bind_count(&self) -> u32 {
        self.state.lock().bind_count
    }

    pub fn open_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    /// Whether recognition is armed for `model`
    pub fn is_armed(&self, model: ModelHandle) -> bool {
        self.state
            .lock()
            .streams
            .values()
            .any(|s| s.model == model && s.recognition.is_some())
    }

    /// Capture notices received so far
    pub fn notices(&self) -> Vec<(ModelHandle, CaptureNotice)> {
        self.state.lock().notices.clone()
    }

    /// Simulate a keyword match for `model`.
    ///
    /// Returns false when no recognition is armed for the model.
    pub fn detect(&self, model: ModelHandle, detection: Detection) -> bool {
        {
            let mut state = self.state.lock();
            let Some(stream) = state
                .streams
                .values_mut()
                .find(|s| s.model == model && s.recognition.is_some())
            else {
                debug!("No armed stream for model {}, detection ignored", model);
                return false;
            };

            let capture = stream
                .recognition
                .as_ref()
                .map(|r| r.capture_requested)
                .unwrap_or(false);
            if capture {
                stream.buffering = true;
                stream.cursor = 0;
            }
        }

        self.emit(SubsystemEvent::Detected { model, detection })
    }

    /// Simulate a detection raised on an engine-owned thread
    pub fn spawn_detect(
        self: &std::sync::Arc<Self>,
        model: ModelHandle,
        detection: Detection,
    ) -> JoinHandle<bool> {
        let subsystem = std::sync::Arc::clone(self);
        thread::spawn(move || subsystem.detect(model, detection))
    }

    /// Simulate the engine dropping recognition for `model`
    pub fn abort(&self, model: ModelHandle) -> bool {
        self.emit(SubsystemEvent::Aborted { model })
    }

    /// Signal that all captured audio for `model` was handed out
    pub fn complete_buffering(&self, model: ModelHandle) -> bool {
        self.emit(SubsystemEvent::BufferingComplete { model })
    }

    /// Deliver a raw event through the sink, even for unknown models.
    ///
    /// Returns false when no binding is established.
    pub fn emit(&self, event: SubsystemEvent) -> bool {
        // The sink may call back into the subsystem.
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    fn check(&self, state: &SimState, op: FailOp) -> Result<(), TriggerError> {
        if state.failing.contains(&op) {
            return Err(TriggerError::SubsystemFailure(format!(
                "simulated {:?} failure",
                op
            )));
        }
        Ok(())
    }
}

impl AudioSubsystem for SimulatedSubsystem {
    fn bind(&self, events: EventSink) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        if state.failing.contains(&FailOp::Bind) {
            return Err(TriggerError::SubsystemUnavailable(
                "simulated binding failure".to_string(),
            ));
        }

        state.sink = Some(events);
        state.bind_count += 1;
        info!("Simulated subsystem bound (binding #{})", state.bind_count);
        Ok(())
    }

    fn unbind(&self) {
        let mut state = self.state.lock();
        state.sink = None;
        state.streams.clear();
        info!("Simulated subsystem unbound");
    }

    fn api_version(&self) -> Option<ApiVersion> {
        self.config.api_version
    }

    fn query_properties(&self) -> Result<Vec<u8>, TriggerError> {
        let len = self.state.lock().properties_len;
        let mut raw = self.config.properties.encode();
        if let Some(len) = len {
            raw.resize(len, 0);
        }
        Ok(raw)
    }

    fn open_stream(
        &self,
        model: ModelHandle,
        sound_model: &SoundModel,
    ) -> Result<StreamHandle, TriggerError> {
        let mut state = self.state.lock();
        if state.sink.is_none() {
            return Err(TriggerError::SubsystemUnavailable(
                "subsystem is not bound".to_string(),
            ));
        }
        self.check(&state, FailOp::OpenStream)?;

        state.next_stream += 1;
        let stream = StreamHandle(state.next_stream);
        state.streams.insert(
            stream,
            SimStream {
                model,
                recognition: None,
                buffering: false,
                cursor: 0,
            },
        );

        debug!(
            "Opened {} for model {} ({:?}, {} bytes)",
            stream,
            model,
            sound_model.kind,
            sound_model.data.len()
        );
        Ok(stream)
    }

    fn close_stream(&self, stream: StreamHandle) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        state
            .streams
            .remove(&stream)
            .map(|_| ())
            .ok_or_else(|| TriggerError::SubsystemFailure(format!("unknown {}", stream)))
    }

    fn register_recognition(
        &self,
        stream: StreamHandle,
        config: &RecognitionConfig,
    ) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        self.check(&state, FailOp::RegisterRecognition)?;

        let entry = state
            .streams
            .get_mut(&stream)
            .ok_or_else(|| TriggerError::SubsystemFailure(format!("unknown {}", stream)))?;
        entry.recognition = Some(config.clone());
        entry.buffering = false;
        Ok(())
    }

    fn deregister_recognition(&self, stream: StreamHandle) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        self.check(&state, FailOp::DeregisterRecognition)?;

        let entry = state
            .streams
            .get_mut(&stream)
            .ok_or_else(|| TriggerError::SubsystemFailure(format!("unknown {}", stream)))?;
        entry.recognition = None;
        entry.buffering = false;
        Ok(())
    }

    fn stop_buffering(&self, stream: StreamHandle) -> Result<(), TriggerError> {
        let mut state = self.state.lock();
        if let Some(entry) = state.streams.get_mut(&stream) {
            entry.buffering = false;
        }
        Ok(())
    }

    fn read_buffered_audio(
        &self,
        stream: StreamHandle,
        buf: &mut [u8],
    ) -> Result<usize, TriggerError> {
        let mut state = self.state.lock();
        let entry = state
            .streams
            .get_mut(&stream)
            .ok_or_else(|| TriggerError::SubsystemFailure(format!("unknown {}", stream)))?;
        if !entry.buffering {
            return Err(TriggerError::SubsystemFailure(format!(
                "{} is not buffering",
                stream
            )));
        }

        // Whole samples only
        let remaining = &self.config.capture[entry.cursor.min(self.config.capture.len())..];
        let count = (buf.len() / 2).min(remaining.len());
        for (chunk, sample) in buf.chunks_exact_mut(2).zip(&remaining[..count]) {
            chunk.copy_from_slice(&sample.to_le_bytes());
        }
        entry.cursor += count;

        Ok(count * 2)
    }

    fn notify_capture(&self, model: ModelHandle, notice: CaptureNotice) {
        self.state.lock().notices.push((model, notice));
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
