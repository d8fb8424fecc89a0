//! Audio subsystem binding
//!
//! The session core talks to the capture pipeline and keyword engine only
//! through the [`AudioSubsystem`] capability set. The concrete
//! implementation is chosen from configuration by [`SubsystemFactory`].

pub mod backend;
pub mod simulated;

use anyhow::{Context, Result};
use std::sync::Arc;

pub use backend::{
    AudioSubsystem, CaptureNotice, EventSink, StreamHandle, SubsystemEvent, SubsystemKind,
};
pub use simulated::{FailOp, SimulatedConfig, SimulatedSubsystem};

use crate::audio::CaptureClip;
use crate::config::SubsystemConfig;
use crate::device::ApiVersion;

/// A configured subsystem instance
#[derive(Clone)]
pub enum Subsystem {
    Simulated(Arc<SimulatedSubsystem>),
}

impl Subsystem {
    /// Capability set handed to the device coordinator
    pub fn binding(&self) -> Arc<dyn AudioSubsystem> {
        match self {
            Subsystem::Simulated(sim) => Arc::clone(sim) as Arc<dyn AudioSubsystem>,
        }
    }

    /// Detection injection, available for the simulated engine only
    pub fn simulator(&self) -> Option<Arc<SimulatedSubsystem>> {
        match self {
            Subsystem::Simulated(sim) => Some(Arc::clone(sim)),
        }
    }
}

/// Subsystem factory
pub struct SubsystemFactory;

impl SubsystemFactory {
    /// Create the subsystem selected by configuration
    pub fn create(config: &SubsystemConfig) -> Result<Subsystem> {
        match config.kind {
            SubsystemKind::Simulated => {
                let api_version: Option<ApiVersion> = config
                    .api_version
                    .as_deref()
                    .map(str::parse::<ApiVersion>)
                    .transpose()
                    .context("Invalid subsystem api_version")?;

                let (capture, sample_rate) = match &config.capture_file {
                    Some(path) => {
                        let clip = CaptureClip::open(path)
                            .with_context(|| format!("Failed to load capture file {}", path))?;
                        (clip.to_mono(), clip.sample_rate)
                    }
                    None => (Vec::new(), config.sample_rate),
                };

                let sim = SimulatedSubsystem::new(SimulatedConfig {
                    api_version,
                    properties: config.properties.clone(),
                    capture,
                    sample_rate,
                });
                Ok(Subsystem::Simulated(Arc::new(sim)))
            }
        }
    }
}
