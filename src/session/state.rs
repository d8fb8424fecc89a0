use serde::Serialize;

/// Lifecycle state of a detection session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Created, no sound model loaded
    #[default]
    Idle,
    /// Model loaded and bound to a subsystem stream
    Loaded,
    /// Recognition armed, waiting for a detection
    Active,
    /// Detection delivered to the caller
    Detected,
    /// Captured audio is being streamed to the caller
    Buffering,
    /// Stop requested, waiting for the subsystem to release recognition
    Stopping,
    /// Recognition released, model still loaded
    Stopped,
}

impl SessionState {
    /// States in which the caller's recognition callback and cookie are valid
    pub fn has_recognition(self) -> bool {
        matches!(
            self,
            SessionState::Active
                | SessionState::Detected
                | SessionState::Buffering
                | SessionState::Stopping
        )
    }

    /// Whether recognition may be (re-)armed from this state
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SessionState::Loaded | SessionState::Stopped | SessionState::Detected
        )
    }

    /// Whether a stop request is meaningful in this state
    pub fn can_stop(self) -> bool {
        self.has_recognition()
    }

    /// Unload must wait for buffering and stopping to finish
    pub fn blocks_unload(self) -> bool {
        matches!(self, SessionState::Buffering | SessionState::Stopping)
    }
}
