//! Device-wide coordination
//!
//! - `coordinator`: open/close reference counting, subsystem binding,
//!   version negotiation and routing by handle
//! - `hw`: the control surface handed to the host framework
//! - `properties`: fixed-layout properties structure
//! - `version`: packed API versions and the compatibility check

mod coordinator;
mod hw;
mod properties;
mod version;

pub use coordinator::{DeviceCoordinator, DeviceHandle};
pub use hw::{hw_module, SoundTriggerHw, MODULE_NAME, SOUND_TRIGGER_HARDWARE_INTERFACE};
pub use properties::Properties;
pub use version::{negotiate, ApiVersion, CORE_API_VERSION, LEGACY_API_VERSION};
