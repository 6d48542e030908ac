pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod virtual_controller;

pub use config::RelayConfig;
pub use error::RelayError;
pub use protocol::{decode, GamepadState, PACKET_LEN};
pub use server::{start_server, ServerHandle};
