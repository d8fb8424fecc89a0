use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::error::TriggerError;

/// Opaque identifier of a loaded sound model (one per session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelHandle(pub i32);

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied value handed back with every recognition callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cookie(pub u64);

/// Recognition mode bits, as advertised in the device properties
pub const RECOGNITION_MODE_VOICE_TRIGGER: u32 = 0x1;
pub const RECOGNITION_MODE_USER_IDENTIFICATION: u32 = 0x2;
pub const RECOGNITION_MODE_USER_AUTHENTICATION: u32 = 0x4;
pub const RECOGNITION_MODE_GENERIC_TRIGGER: u32 = 0x8;

/// Kind of sound model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundModelKind {
    /// Key phrase detection ("hey device")
    Keyphrase,
    /// Vendor-defined generic sound detection
    Generic,
    Unknown,
}

/// One key phrase inside a keyphrase sound model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    /// Phrase identifier, unique within the model
    pub id: u32,
    /// Bitmask of `RECOGNITION_MODE_*`
    pub recognition_mode: u32,
    /// Users enrolled for this phrase
    #[serde(default)]
    pub users: Vec<u32>,
    /// BCP-47 locale, e.g. "en-US"
    #[serde(default)]
    pub locale: String,
    /// Human readable phrase text
    #[serde(default)]
    pub text: String,
}

/// Sound model payload supplied at load time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundModel {
    pub kind: SoundModelKind,
    /// Unique identifier of this model
    pub uuid: Uuid,
    /// Identifier of the engine vendor that produced the model data
    pub vendor_uuid: Uuid,
    /// Opaque engine-specific model data
    pub data: Vec<u8>,
    /// Key phrases (keyphrase models only)
    #[serde(default)]
    pub phrases: Vec<Phrase>,
}

impl SoundModel {
    /// Build a keyphrase model with a single phrase
    pub fn keyphrase(data: Vec<u8>, phrase: Phrase) -> Self {
        Self {
            kind: SoundModelKind::Keyphrase,
            uuid: Uuid::new_v4(),
            vendor_uuid: Uuid::nil(),
            data,
            phrases: vec![phrase],
        }
    }

    /// Build a generic model
    pub fn generic(data: Vec<u8>) -> Self {
        Self {
            kind: SoundModelKind::Generic,
            uuid: Uuid::new_v4(),
            vendor_uuid: Uuid::nil(),
            data,
            phrases: Vec::new(),
        }
    }

    /// Check that the payload is well-formed
    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.data.is_empty() {
            return Err(TriggerError::InvalidArgument(
                "sound model data is empty".to_string(),
            ));
        }

        if self.kind == SoundModelKind::Keyphrase {
            if self.phrases.is_empty() {
                return Err(TriggerError::InvalidArgument(
                    "keyphrase sound model has no phrases".to_string(),
                ));
            }

            let mut seen = HashSet::new();
            for phrase in &self.phrases {
                if !seen.insert(phrase.id) {
                    return Err(TriggerError::InvalidArgument(format!(
                        "duplicate phrase id {}",
                        phrase.id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Per-user confidence threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceLevel {
    pub user_id: u32,
    /// Threshold in percent (0-100)
    pub level: u32,
}

/// Trigger conditions for one key phrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseRecognitionConfig {
    pub id: u32,
    /// Bitmask of `RECOGNITION_MODE_*`
    pub recognition_modes: u32,
    /// Threshold in percent (0-100)
    pub confidence_level: u32,
    #[serde(default)]
    pub levels: Vec<ConfidenceLevel>,
}

/// Parameters supplied when arming recognition
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Audio session the captured audio is attached to
    #[serde(default)]
    pub capture_handle: i32,
    /// Input device used for capture
    #[serde(default)]
    pub capture_device: u32,
    /// Stream captured audio to the caller after a detection
    #[serde(default)]
    pub capture_requested: bool,
    #[serde(default)]
    pub phrases: Vec<PhraseRecognitionConfig>,
    /// Opaque engine-specific parameters
    #[serde(default)]
    pub data: Vec<u8>,
}

impl RecognitionConfig {
    pub fn validate(&self) -> Result<(), TriggerError> {
        for phrase in &self.phrases {
            if phrase.confidence_level > 100 {
                return Err(TriggerError::InvalidArgument(format!(
                    "phrase {} confidence level {} exceeds 100",
                    phrase.id, phrase.confidence_level
                )));
            }
            if let Some(level) = phrase.levels.iter().find(|l| l.level > 100) {
                return Err(TriggerError::InvalidArgument(format!(
                    "user {} confidence level {} exceeds 100",
                    level.user_id, level.level
                )));
            }
        }

        Ok(())
    }
}
