use std::collections::HashMap;

use url::Url;

use crate::device::{DeviceId, SetupError};
use crate::plugins::coap_client::core_link::CoreLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the `/.well-known/core` response.
    Discovering,
    Ready,
}

#[derive(Debug)]
pub struct Session {
    pub device: DeviceId,
    pub base_url: Url,
    pub state: SessionState,
    pub links: Vec<CoreLink>,
}

/// Configured CoAP client devices.  The plugin talks to exactly one remote server, so at most
/// [`SessionRegistry::CAPACITY`] sessions may exist at a time.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<DeviceId, Session>,
}

impl SessionRegistry {
    pub const CAPACITY: usize = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, device: DeviceId, base_url: Url) -> Result<&mut Session, SetupError> {
        if self.sessions.len() >= Self::CAPACITY {
            let existing = self.sessions.keys().next().copied().unwrap_or(device);
            return Err(SetupError::SessionExists(existing));
        }
        let session = Session {
            device,
            base_url,
            state: SessionState::Discovering,
            links: Vec::new(),
        };
        Ok(self.sessions.entry(device).or_insert(session))
    }

    pub fn get(&self, device: DeviceId) -> Option<&Session> {
        self.sessions.get(&device)
    }

    pub fn get_mut(&mut self, device: DeviceId) -> Option<&mut Session> {
        self.sessions.get_mut(&device)
    }

    pub fn remove(&mut self, device: DeviceId) -> Option<Session> {
        self.sessions.remove(&device)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
