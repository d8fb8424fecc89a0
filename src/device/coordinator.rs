use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use super::properties::Properties;
use super::version::{negotiate, ApiVersion, CORE_API_VERSION};
use crate::config::DeviceConfig;
use crate::error::TriggerError;
use crate::registry::SessionRegistry;
use crate::session::{
    Cookie, ModelHandle, RecognitionCallback, RecognitionConfig, Session, SessionSnapshot,
    SoundModel,
};
use crate::subsystem::{AudioSubsystem, EventSink, SubsystemEvent};

static NEXT_DEVICE: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned by [`DeviceCoordinator::open`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceHandle(u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

/// The sound trigger device
///
/// Owns the session registry, the audio subsystem binding and the
/// open/close reference count, and routes calls to sessions by handle.
pub struct DeviceCoordinator {
    device: DeviceHandle,
    config: DeviceConfig,
    subsystem: Arc<dyn AudioSubsystem>,
    registry: Arc<SessionRegistry>,
    /// Source of all model handles, starts at 1
    next_handle: AtomicI32,
    /// Only modified while `binding` is locked; read lock-free so that
    /// recognition callbacks never wait on open/close
    ref_count: AtomicU32,
    /// Negotiated version; Some while the subsystem binding is held
    binding: Mutex<Option<ApiVersion>>,
}

impl DeviceCoordinator {
    pub fn new(subsystem: Arc<dyn AudioSubsystem>, config: DeviceConfig) -> Self {
        Self {
            device: DeviceHandle(NEXT_DEVICE.fetch_add(1, Ordering::Relaxed)),
            config,
            subsystem,
            registry: Arc::new(SessionRegistry::new()),
            next_handle: AtomicI32::new(1),
            ref_count: AtomicU32::new(0),
            binding: Mutex::new(None),
        }
    }

    pub fn device_handle(&self) -> DeviceHandle {
        self.device
    }

    /// Take an open reference. The first open binds the subsystem and
    /// negotiates the API version; later opens only bump the count.
    pub fn open(&self) -> Result<DeviceHandle, TriggerError> {
        let mut binding = self.binding.lock();

        let refs = self.ref_count.load(Ordering::SeqCst);
        if refs > 0 {
            self.ref_count.store(refs + 1, Ordering::SeqCst);
            debug!("Returning existing {} (refs={})", self.device, refs + 1);
            return Ok(self.device);
        }

        if binding.is_none() {
            *binding = Some(self.bind()?);
        }
        self.ref_count.store(1, Ordering::SeqCst);

        info!(
            "Opened {} on {} subsystem",
            self.device,
            self.subsystem.name()
        );
        Ok(self.device)
    }

    fn bind(&self) -> Result<ApiVersion, TriggerError> {
        let registry = Arc::downgrade(&self.registry);
        let events: EventSink = Arc::new(move |event: SubsystemEvent| dispatch_event(&registry, event));

        self.subsystem.bind(events).map_err(|e| match e {
            TriggerError::SubsystemUnavailable(_) => e,
            other => TriggerError::SubsystemUnavailable(other.to_string()),
        })?;

        match negotiate(CORE_API_VERSION, self.subsystem.api_version()) {
            Ok(version) => {
                info!(
                    "Subsystem is using API version {} (core {})",
                    version, CORE_API_VERSION
                );
                Ok(version)
            }
            Err(e) => {
                error!("{}", e);
                self.subsystem.unbind();
                Err(e)
            }
        }
    }

    /// Drop an open reference; teardown happens only at zero
    pub fn close(&self, device: DeviceHandle) -> Result<(), TriggerError> {
        self.check_device(device)?;
        let mut binding = self.binding.lock();

        let refs = self.ref_count.load(Ordering::SeqCst);
        if refs == 0 {
            return Err(TriggerError::NotOpen);
        }
        self.ref_count.store(refs - 1, Ordering::SeqCst);
        if refs > 1 {
            debug!("Closed reference to {} (refs={})", self.device, refs - 1);
            return Ok(());
        }

        if self.config.release_on_last_close {
            let sessions = self.registry.drain();
            if !sessions.is_empty() {
                warn!("Releasing {} sessions left open at close", sessions.len());
            }
            for session in sessions {
                session.release();
            }
            self.subsystem.unbind();
            *binding = None;
            info!("Closed {}, subsystem binding released", self.device);
        } else {
            info!("Closed {}", self.device);
        }

        Ok(())
    }

    /// Reject handles that were not issued by this coordinator
    pub fn check_device(&self, device: DeviceHandle) -> Result<(), TriggerError> {
        if device != self.device {
            return Err(TriggerError::InvalidArgument(format!(
                "unknown device handle {}",
                device
            )));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), TriggerError> {
        if !self.is_open() {
            return Err(TriggerError::NotOpen);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.ref_count() > 0
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::SeqCst)
    }

    /// Version negotiated at first open
    pub fn api_version(&self) -> Option<ApiVersion> {
        *self.binding.lock()
    }

    /// Query and decode the subsystem's properties
    pub fn properties(&self) -> Result<Properties, TriggerError> {
        self.ensure_open()?;

        let raw = self
            .subsystem
            .query_properties()
            .map_err(|e| TriggerError::QueryFailed(e.to_string()))?;
        let properties = Properties::decode(&raw)?;

        debug!(
            "Properties: version=0x{:x} recognition_modes={} capture_transition={} concurrent_capture={}",
            properties.version,
            properties.recognition_modes,
            properties.capture_transition,
            properties.concurrent_capture
        );
        Ok(properties)
    }

    fn allocate_handle(&self) -> Result<ModelHandle, TriggerError> {
        self.next_handle
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| h.checked_add(1))
            .map(ModelHandle)
            .map_err(|_| TriggerError::HandlesExhausted)
    }

    /// Create and load a session, then register it.
    ///
    /// The session only becomes reachable by handle once its model is
    /// loaded; a failed load leaves nothing behind.
    pub fn load_model(&self, model: SoundModel) -> Result<ModelHandle, TriggerError> {
        self.ensure_open()?;

        let handle = self.allocate_handle()?;
        let session = Session::new(handle, Arc::clone(&self.subsystem));
        session.load_sound_model(model)?;
        self.registry.register(session)?;

        Ok(handle)
    }

    /// Unload the session's model, then deregister and drop it
    pub fn unload_model(&self, handle: ModelHandle) -> Result<(), TriggerError> {
        self.ensure_open()?;

        let session = self.lookup(handle)?;
        session.unload_sound_model()?;
        self.registry.deregister(handle)?;
        Ok(())
    }

    pub fn start_recognition(
        &self,
        handle: ModelHandle,
        config: RecognitionConfig,
        callback: RecognitionCallback,
        cookie: Cookie,
    ) -> Result<(), TriggerError> {
        self.ensure_open()?;
        self.lookup(handle)?
            .start_recognition(config, callback, cookie)
    }

    pub fn stop_recognition(&self, handle: ModelHandle) -> Result<(), TriggerError> {
        self.ensure_open()?;
        self.lookup(handle)?.stop_recognition()
    }

    /// Read captured audio from a buffering session
    pub fn read_buffer(&self, handle: ModelHandle, buf: &mut [u8]) -> Result<usize, TriggerError> {
        self.ensure_open()?;
        self.lookup(handle)?.read_buffer(buf)
    }

    pub fn model_state(&self, handle: ModelHandle) -> Result<SessionSnapshot, TriggerError> {
        self.ensure_open()?;
        Ok(self.lookup(handle)?.snapshot())
    }

    /// Session registered under `handle`
    pub fn session(&self, handle: ModelHandle) -> Option<Arc<Session>> {
        self.registry.lookup(handle)
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn lookup(&self, handle: ModelHandle) -> Result<Arc<Session>, TriggerError> {
        self.registry
            .lookup(handle)
            .ok_or(TriggerError::NotFound(handle))
    }
}

/// Route a subsystem event to its session. Events for handles that are no
/// longer registered are dropped.
fn dispatch_event(registry: &Weak<SessionRegistry>, event: SubsystemEvent) {
    let Some(registry) = registry.upgrade() else {
        return;
    };

    match registry.lookup(event.model()) {
        Some(session) => session.handle_event(event),
        None => debug!("Dropping event for unregistered model {}", event.model()),
    }
}
