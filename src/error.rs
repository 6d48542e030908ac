use crate::protocol::PacketError;
use crate::registry::ConnectionId;
use crate::session::SessionPhase;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    MalformedPacket(#[from] PacketError),

    #[error("expected a binary frame")]
    WrongOpcode,

    #[error("failed to allocate virtual controller {controller_id}: {reason:#}")]
    DeviceAllocationFailed {
        controller_id: u8,
        reason: anyhow::Error,
    },

    #[error("failed to update virtual controller {controller_id}: {reason:#}")]
    DeviceUpdateFailed {
        controller_id: u8,
        reason: anyhow::Error,
    },

    #[error("no session for connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("connection {0} already has a session")]
    DuplicateConnection(ConnectionId),

    #[error("all {capacity} controller slots are taken")]
    RegistryFull { capacity: u8 },

    #[error("controller {controller_id} is not ready ({phase:?})")]
    SessionNotReady {
        controller_id: u8,
        phase: SessionPhase,
    },
}

pub type Result<T, E = RelayError> = std::result::Result<T, E>;
