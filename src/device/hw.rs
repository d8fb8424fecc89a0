// Control surface invoked by the host audio framework
//
// Thin adapter over DeviceCoordinator: validates the module name and the
// device handle, logs failures, and leaves status-code translation to
// `TriggerError::errno`.

use std::sync::Arc;
use tracing::{error, info};

use super::coordinator::{DeviceCoordinator, DeviceHandle};
use super::properties::Properties;
use crate::error::TriggerError;
use crate::session::{
    Cookie, ModelHandle, RecognitionCallback, RecognitionConfig, SessionSnapshot, SoundModel,
};

/// Interface name the host must request in `open`
pub const SOUND_TRIGGER_HARDWARE_INTERFACE: &str = "sound_trigger_hw_if";

/// Module name reported to the host
pub const MODULE_NAME: &str = "Sound trigger HAL";

/// Device control surface
pub struct SoundTriggerHw {
    coordinator: Arc<DeviceCoordinator>,
}

/// Module factory: the control surface for an explicitly constructed coordinator
pub fn hw_module(coordinator: Arc<DeviceCoordinator>) -> SoundTriggerHw {
    SoundTriggerHw { coordinator }
}

fn logged<T>(operation: &str, result: Result<T, TriggerError>) -> Result<T, TriggerError> {
    if let Err(e) = &result {
        error!("{} failed (status {}): {}", operation, e.errno(), e);
    }
    result
}

impl SoundTriggerHw {
    pub fn coordinator(&self) -> &Arc<DeviceCoordinator> {
        &self.coordinator
    }

    /// Open the device; `name` must be [`SOUND_TRIGGER_HARDWARE_INTERFACE`]
    pub fn open(&self, name: &str) -> Result<DeviceHandle, TriggerError> {
        if name != SOUND_TRIGGER_HARDWARE_INTERFACE {
            return logged(
                "open",
                Err(TriggerError::InvalidArgument(format!(
                    "wrong interface '{}'",
                    name
                ))),
            );
        }

        info!("Opening {} ({})", MODULE_NAME, name);
        logged("open", self.coordinator.open())
    }

    pub fn close(&self, device: DeviceHandle) -> Result<(), TriggerError> {
        logged("close", self.coordinator.close(device))
    }

    pub fn get_properties(&self, device: DeviceHandle) -> Result<Properties, TriggerError> {
        logged(
            "get_properties",
            self.coordinator
                .check_device(device)
                .and_then(|_| self.coordinator.properties()),
        )
    }

    pub fn load_sound_model(
        &self,
        device: DeviceHandle,
        model: SoundModel,
    ) -> Result<ModelHandle, TriggerError> {
        logged(
            "load_sound_model",
            self.coordinator
                .check_device(device)
                .and_then(|_| self.coordinator.load_model(model)),
        )
    }

    pub fn unload_sound_model(
        &self,
        device: DeviceHandle,
        handle: ModelHandle,
    ) -> Result<(), TriggerError> {
        logged(
            "unload_sound_model",
            self.coordinator
                .check_device(device)
                .and_then(|_| self.coordinator.unload_model(handle)),
        )
    }

    pub fn start_recognition(
        &self,
        device: DeviceHandle,
        handle: ModelHandle,
        config: RecognitionConfig,
        callback: RecognitionCallback,
        cookie: Cookie,
    ) -> Result<(), TriggerError> {
        logged(
            "start_recognition",
            self.coordinator.check_device(device).and_then(|_| {
                self.coordinator
                    .start_recognition(handle, config, callback, cookie)
            }),
        )
    }

    pub fn stop_recognition(
        &self,
        device: DeviceHandle,
        handle: ModelHandle,
    ) -> Result<(), TriggerError> {
        logged(
            "stop_recognition",
            self.coordinator
                .check_device(device)
                .and_then(|_| self.coordinator.stop_recognition(handle)),
        )
    }

    pub fn get_model_state(
        &self,
        device: DeviceHandle,
        handle: ModelHandle,
    ) -> Result<SessionSnapshot, TriggerError> {
        logged(
            "get_model_state",
            self.coordinator
                .check_device(device)
                .and_then(|_| self.coordinator.model_state(handle)),
        )
    }

    pub fn read_buffer(
        &self,
        device: DeviceHandle,
        handle: ModelHandle,
        buf: &mut [u8],
    ) -> Result<usize, TriggerError> {
        logged(
            "read_buffer",
            self.coordinator
                .check_device(device)
                .and_then(|_| self.coordinator.read_buffer(handle, buf)),
        )
    }
}
