use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TriggerError;
use crate::session::{RECOGNITION_MODE_USER_IDENTIFICATION, RECOGNITION_MODE_VOICE_TRIGGER};

const NAME_LEN: usize = 128;

/// Device capabilities reported to the host framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Properties {
    /// Implementor name
    pub implementor: String,
    /// Implementation description
    pub description: String,
    /// Implementation version
    pub version: u32,
    /// Unique implementation identifier
    pub uuid: Uuid,
    /// Maximum number of concurrently loaded sound models
    pub max_sound_models: u32,
    /// Maximum number of key phrases across all models
    pub max_key_phrases: u32,
    /// Maximum number of users per key phrase
    pub max_users: u32,
    /// Bitmask of supported `RECOGNITION_MODE_*`
    pub recognition_modes: u32,
    /// Captured audio can be streamed after a detection
    pub capture_transition: bool,
    /// Maximum buffered audio length in milliseconds
    pub max_buffer_ms: u32,
    /// Recognition continues while other clients capture
    pub concurrent_capture: bool,
    /// Trigger audio is included in the event payload
    pub trigger_in_event: bool,
    /// Power consumption while recognition is armed
    pub power_consumption_mw: u32,
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            implementor: "sound-trigger-hal".to_string(),
            description: "Simulated sound trigger engine".to_string(),
            version: 0x0100,
            uuid: Uuid::nil(),
            max_sound_models: 8,
            max_key_phrases: 8,
            max_users: 1,
            recognition_modes: RECOGNITION_MODE_VOICE_TRIGGER
                | RECOGNITION_MODE_USER_IDENTIFICATION,
            capture_transition: true,
            max_buffer_ms: 2000,
            concurrent_capture: false,
            trigger_in_event: false,
            power_consumption_mw: 0,
        }
    }
}

impl Properties {
    /// Size of the fixed little-endian layout
    pub const WIRE_SIZE: usize = 2 * NAME_LEN + 4 + 16 + 4 * 9;

    /// Encode into the fixed layout
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        put_name(&mut buf, &self.implementor);
        put_name(&mut buf, &self.description);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(self.uuid.as_bytes());
        for value in [
            self.max_sound_models,
            self.max_key_phrases,
            self.max_users,
            self.recognition_modes,
            self.capture_transition as u32,
            self.max_buffer_ms,
            self.concurrent_capture as u32,
            self.trigger_in_event as u32,
            self.power_consumption_mw,
        ] {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Decode the fixed-size prefix of a subsystem properties structure.
    ///
    /// Vendor extensions past [`Properties::WIRE_SIZE`] are ignored.
    pub fn decode(raw: &[u8]) -> Result<Self, TriggerError> {
        if raw.len() < Self::WIRE_SIZE {
            return Err(TriggerError::QueryFailed(format!(
                "properties structure is {} bytes, expected at least {}",
                raw.len(),
                Self::WIRE_SIZE
            )));
        }

        let mut reader = Reader { buf: raw, pos: 0 };
        let implementor = reader.name();
        let description = reader.name();
        let version = reader.u32();
        let uuid = reader.uuid();

        Ok(Self {
            implementor,
            description,
            version,
            uuid,
            max_sound_models: reader.u32(),
            max_key_phrases: reader.u32(),
            max_users: reader.u32(),
            recognition_modes: reader.u32(),
            capture_transition: reader.u32() != 0,
            max_buffer_ms: reader.u32(),
            concurrent_capture: reader.u32() != 0,
            trigger_in_event: reader.u32() != 0,
            power_consumption_mw: reader.u32(),
        })
    }
}

/// NUL-padded, always NUL-terminated
fn put_name(buf: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; NAME_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(NAME_LEN - 1);
    field[..len].copy_from_slice(&bytes[..len]);
    buf.extend_from_slice(&field);
}

// Callers check the total length before reading.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take::<4>())
    }

    fn uuid(&mut self) -> Uuid {
        Uuid::from_bytes(self.take::<16>())
    }

    fn name(&mut self) -> String {
        let field = self.take::<NAME_LEN>();
        let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}
