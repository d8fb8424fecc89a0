//! Error taxonomy shared by the session core and the control surface.
//!
//! Every failure is classified where it happens and handed back to the
//! immediate caller. Hosts that speak the POSIX status-code convention use
//! [`TriggerError::errno`] or [`status_code`].

use crate::device::ApiVersion;
use crate::session::{ModelHandle, SessionState};

/// Errors returned by sessions, the registry and the device coordinator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    /// Null, empty or malformed input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not legal in the session's current state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// No session registered under this handle
    #[error("no session registered for handle {0}")]
    NotFound(ModelHandle),

    /// Registry already holds a session under this handle
    #[error("handle {0} is already registered")]
    DuplicateHandle(ModelHandle),

    /// Session is mid-transition (buffering or stopping)
    #[error("session busy in state {state:?}, stop recognition first")]
    Busy { state: SessionState },

    /// The audio subsystem binding could not be established
    #[error("audio subsystem unavailable: {0}")]
    SubsystemUnavailable(String),

    /// Major API version of the subsystem differs from ours
    #[error("incompatible API versions: core {core} != subsystem {subsystem}")]
    IncompatibleVersion {
        core: ApiVersion,
        subsystem: ApiVersion,
    },

    /// Properties response was malformed or too short
    #[error("properties query failed: {0}")]
    QueryFailed(String),

    /// Device is used while no open reference is held
    #[error("device is not open")]
    NotOpen,

    /// A stream-level subsystem call failed
    #[error("audio subsystem call failed: {0}")]
    SubsystemFailure(String),

    /// The handle counter cannot produce another unique handle
    #[error("sound model handles exhausted")]
    HandlesExhausted,
}

impl TriggerError {
    /// Negative POSIX errno for this error
    pub fn errno(&self) -> i32 {
        let code = match self {
            TriggerError::InvalidArgument(_) | TriggerError::IncompatibleVersion { .. } => {
                libc::EINVAL
            }
            TriggerError::InvalidState { .. } => libc::EPERM,
            TriggerError::NotFound(_) => libc::ENOENT,
            TriggerError::DuplicateHandle(_) => libc::EEXIST,
            TriggerError::Busy { .. } => libc::EBUSY,
            TriggerError::SubsystemUnavailable(_) | TriggerError::NotOpen => libc::ENODEV,
            TriggerError::QueryFailed(_) | TriggerError::SubsystemFailure(_) => libc::EIO,
            TriggerError::HandlesExhausted => libc::ENOSPC,
        };
        -code
    }
}

/// Status code for a control-surface result: 0 on success, negative errno otherwise
pub fn status_code<T>(result: &Result<T, TriggerError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.errno(),
    }
}
