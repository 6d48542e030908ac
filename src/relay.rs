use crate::error::RelayError;
use crate::protocol::{PacketError, PACKET_LEN};
use crate::registry::{ConnectionId, SessionRegistry};
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::thread::JoinHandle;
use tokio::sync::mpsc::UnboundedSender;

pub const WRONG_OPCODE_ADVISORY: &str = "Please send data in the specified binary format.";
pub const WRONG_LENGTH_ADVISORY: &str = "Your payload must conform to exactly 12 bytes.";

/// Data frame received on the relay endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
}

/// What the transport should do for the sender of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(&'static str),
    /// Close this connection only
    Close(String),
}

/// Turns transport events into registry calls and registry outcomes into replies
pub struct RelayService {
    registry: SessionRegistry,
    /// Connections told to close whose transport Close event has not arrived yet
    rejected: HashSet<ConnectionId>,
}

impl RelayService {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            rejected: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn is_rejected(&self, conn: ConnectionId) -> bool {
        self.rejected.contains(&conn)
    }

    pub fn open(&mut self, conn: ConnectionId) -> Option<Reply> {
        match self.registry.on_open(conn) {
            Ok(controller_id) => {
                log::info!("Connection {} is controller {}", conn, controller_id);
                None
            }
            Err(e) => {
                log::error!("Rejecting connection {}: {}", conn, e);
                self.rejected.insert(conn);
                Some(Reply::Close(e.to_string()))
            }
        }
    }

    pub fn message(&mut self, conn: ConnectionId, frame: Frame) -> Option<Reply> {
        if self.rejected.contains(&conn) {
            log::debug!("Connection {} is closing, frame dropped", conn);
            return None;
        }

        let result = match frame {
            Frame::Text(_) => Err(RelayError::WrongOpcode),
            Frame::Binary(payload) if payload.len() != PACKET_LEN => {
                Err(PacketError::Malformed { len: payload.len() }.into())
            }
            Frame::Binary(payload) => self.registry.on_message(conn, &payload),
        };

        let err = result.err()?;
        match err {
            RelayError::WrongOpcode => {
                log::debug!("Connection {}: {}", conn, err);
                Some(Reply::Text(WRONG_OPCODE_ADVISORY))
            }
            RelayError::MalformedPacket(_) => {
                log::debug!("Connection {}: {}", conn, err);
                Some(Reply::Text(WRONG_LENGTH_ADVISORY))
            }
            RelayError::DeviceUpdateFailed { .. } => {
                log::warn!("Dropping connection {}: {}", conn, err);
                self.release(conn);
                self.rejected.insert(conn);
                Some(Reply::Close(err.to_string()))
            }
            _ => {
                log::error!("Connection {}: {}, message dropped", conn, err);
                None
            }
        }
    }

    pub fn close(&mut self, conn: ConnectionId) {
        self.rejected.remove(&conn);
        self.release(conn);
    }

    fn release(&mut self, conn: ConnectionId) {
        match self.registry.on_close(conn) {
            Ok(Some(controller_id)) => {
                log::info!("Connection {} closed, controller {} released", conn, controller_id)
            }
            Ok(None) => log::debug!("Connection {} closed without a session", conn),
            Err(e) => log::error!("Connection {} closed: {}", conn, e),
        }
    }
}

pub enum RelayEvent {
    Open {
        conn: ConnectionId,
        replies: UnboundedSender<Reply>,
    },
    Frame {
        conn: ConnectionId,
        frame: Frame,
    },
    Close {
        conn: ConnectionId,
    },
}

/// Run the relay on its own thread.
///
/// Every session operation happens on that thread, in the order events were sent. The thread
/// exits and unplugs every remaining controller once all senders are gone.
pub fn spawn(service: RelayService) -> std::io::Result<(Sender<RelayEvent>, JoinHandle<()>)> {
    let (sender, receiver) = crossbeam_channel::unbounded();

    let handle = std::thread::Builder::new()
        .name("relay".into())
        .spawn(move || run(service, receiver))?;

    Ok((sender, handle))
}

fn run(mut service: RelayService, events: Receiver<RelayEvent>) {
    log::info!("Relay thread started");
    let mut outbound: HashMap<ConnectionId, UnboundedSender<Reply>> = HashMap::new();

    for event in events.iter() {
        let (conn, reply) = match event {
            RelayEvent::Open { conn, replies } => {
                outbound.insert(conn, replies);
                (conn, service.open(conn))
            }
            RelayEvent::Frame { conn, frame } => (conn, service.message(conn, frame)),
            RelayEvent::Close { conn } => {
                outbound.remove(&conn);
                service.close(conn);
                continue;
            }
        };

        if let Some(reply) = reply {
            // Connection task already gone, its Close event is queued behind this one
            if let Some(tx) = outbound.get(&conn) {
                let _ = tx.send(reply);
            }
        }
    }

    log::info!("Relay thread stopped with {} live sessions", service.registry().len());
}
