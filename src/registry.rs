use crate::config::ControllerIdPolicy;
use crate::error::{RelayError, Result};
use crate::protocol;
use crate::session::ControllerSession;
use crate::virtual_controller::VirtualControllerBackend;
use std::collections::HashMap;
use std::fmt;

/// Opaque identity of one upgraded transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection to session mapping. Every live connection has exactly one session and every
/// session its own virtual device.
pub struct SessionRegistry {
    backend: Box<dyn VirtualControllerBackend>,
    policy: ControllerIdPolicy,
    capacity: u8,
    sessions: HashMap<ConnectionId, ControllerSession>,
}

impl SessionRegistry {
    pub fn new(
        backend: Box<dyn VirtualControllerBackend>,
        policy: ControllerIdPolicy,
        capacity: u8,
    ) -> Self {
        Self {
            backend,
            policy,
            capacity,
            sessions: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session(&self, conn: ConnectionId) -> Option<&ControllerSession> {
        self.sessions.get(&conn)
    }

    /// Create, start and register a session for a freshly opened connection
    pub fn on_open(&mut self, conn: ConnectionId) -> Result<u8> {
        if self.sessions.contains_key(&conn) {
            return Err(RelayError::DuplicateConnection(conn));
        }
        let controller_id = self.next_controller_id()?;

        let mut session = ControllerSession::new(controller_id);
        if let Err(e) = session.start(self.backend.as_mut()) {
            // Releases nothing here, but keeps start/stop paired
            session.stop()?;
            return Err(e);
        }

        self.sessions.insert(conn, session);
        Ok(controller_id)
    }

    /// Decode a payload and apply it to the connection's session.
    ///
    /// A malformed payload leaves the session untouched.
    pub fn on_message(&mut self, conn: ConnectionId, payload: &[u8]) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&conn)
            .ok_or(RelayError::UnknownConnection(conn))?;

        let state = protocol::decode(payload)?;
        session.apply(state)
    }

    /// Tear down the connection's session, if it ever got one
    pub fn on_close(&mut self, conn: ConnectionId) -> Result<Option<u8>> {
        let Some(mut session) = self.sessions.remove(&conn) else {
            return Ok(None);
        };
        session.stop()?;
        Ok(Some(session.controller_id()))
    }

    fn next_controller_id(&self) -> Result<u8> {
        let full = RelayError::RegistryFull {
            capacity: self.capacity,
        };
        if self.sessions.len() >= self.capacity as usize {
            return Err(full);
        }

        match self.policy {
            ControllerIdPolicy::Fixed(id) => Ok(id),
            ControllerIdPolicy::LowestFree => (0..self.capacity)
                .find(|id| !self.sessions.values().any(|s| s.controller_id() == *id))
                .ok_or(full),
        }
    }
}
