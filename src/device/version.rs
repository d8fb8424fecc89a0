use std::fmt;
use std::str::FromStr;

use crate::error::TriggerError;

/// Packed `MAJOR.MINOR` API version (major in bits 8-15, minor in bits 0-7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApiVersion(pub u32);

/// API version implemented by this crate
pub const CORE_API_VERSION: ApiVersion = ApiVersion::new(1, 0);

/// Version assumed for subsystems that do not export one
pub const LEGACY_API_VERSION: ApiVersion = ApiVersion(0);

impl ApiVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self(((major as u32) << 8) | minor as u32)
    }

    pub fn major(self) -> u32 {
        (self.0 & 0xff00) >> 8
    }

    pub fn minor(self) -> u32 {
        self.0 & 0x00ff
    }

    /// Only the major component has to match
    pub fn is_compatible_with(self, other: ApiVersion) -> bool {
        self.major() == other.major()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} (0x{:04x})", self.major(), self.minor(), self.0)
    }
}

impl FromStr for ApiVersion {
    type Err = TriggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TriggerError::InvalidArgument(format!("invalid API version '{}'", s));

        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        let major: u8 = major.parse().map_err(|_| invalid())?;
        let minor: u8 = minor.parse().map_err(|_| invalid())?;

        Ok(Self::new(major, minor))
    }
}

/// Check the subsystem's version against ours.
///
/// An absent version symbol is a legacy subsystem and passes through as
/// version 0.
pub fn negotiate(
    core: ApiVersion,
    subsystem: Option<ApiVersion>,
) -> Result<ApiVersion, TriggerError> {
    match subsystem {
        None => Ok(LEGACY_API_VERSION),
        Some(version) if version.is_compatible_with(core) => Ok(version),
        Some(version) => Err(TriggerError::IncompatibleVersion {
            core,
            subsystem: version,
        }),
    }
}
