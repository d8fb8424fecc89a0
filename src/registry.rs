//! Concurrent registry of live sessions
//!
//! One lock covers the whole collection, so registration, deregistration
//! and lookup are serialized against each other. Entries are reference
//! counted: a session resolved by [`SessionRegistry::lookup`] stays alive
//! for the duration of the caller's use even if a concurrent unload removes
//! it from the registry meanwhile.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::TriggerError;
use crate::session::{ModelHandle, Session};

/// Handle -> session mapping owned by the device coordinator
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ModelHandle, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` under its handle, taking ownership of it
    pub fn register(&self, session: Session) -> Result<Arc<Session>, TriggerError> {
        let handle = session.handle();
        let mut sessions = self.sessions.lock();

        let session = match sessions.entry(handle) {
            Entry::Occupied(_) => return Err(TriggerError::DuplicateHandle(handle)),
            Entry::Vacant(slot) => Arc::clone(slot.insert(Arc::new(session))),
        };

        debug!("Registered session {} ({} live)", handle, sessions.len());
        Ok(session)
    }

    /// Remove the session and hand ownership back to the caller
    pub fn deregister(&self, handle: ModelHandle) -> Result<Arc<Session>, TriggerError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .remove(&handle)
            .ok_or(TriggerError::NotFound(handle))?;
        debug!("Deregistered session {} ({} live)", handle, sessions.len());
        Ok(session)
    }

    /// Resolve a handle; never yields a session registered under another handle
    pub fn lookup(&self, handle: ModelHandle) -> Option<Arc<Session>> {
        self.sessions.lock().get(&handle).cloned()
    }

    pub fn contains(&self, handle: ModelHandle) -> bool {
        self.sessions.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Registered handles in ascending order
    pub fn handles(&self) -> Vec<ModelHandle> {
        let mut handles: Vec<_> = self.sessions.lock().keys().copied().collect();
        handles.sort();
        handles
    }

    /// Remove every session at once
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().drain().map(|(_, s)| s).collect()
    }
}
