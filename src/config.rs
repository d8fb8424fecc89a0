use anyhow::Result;
use serde::Deserialize;

use crate::device::Properties;
use crate::subsystem::SubsystemKind;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub device: DeviceConfig,
    pub subsystem: SubsystemConfig,
    pub nats: NatsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "sound-trigger-hal".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8470,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Release sessions and the subsystem binding when the last open
    /// reference is closed. Off by default: the binding and the negotiated
    /// version then live as long as the coordinator.
    pub release_on_last_close: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubsystemConfig {
    pub kind: SubsystemKind,
    /// Version the subsystem exports as "MAJOR.MINOR"; unset models a
    /// legacy build without a version symbol
    pub api_version: Option<String>,
    /// WAV file served as captured audio after a detection
    pub capture_file: Option<String>,
    /// Sample rate reported when no capture file is configured
    pub sample_rate: u32,
    pub properties: Properties,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        Self {
            kind: SubsystemKind::Simulated,
            api_version: None,
            capture_file: None,
            sample_rate: 16000,
            properties: Properties::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL; recognition events are not published when unset
    pub url: Option<String>,
    pub subject_prefix: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: None,
            subject_prefix: "soundtrigger".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
