use crate::error::{RelayError, Result};
use crate::protocol::GamepadState;
use crate::virtual_controller::{VirtualController, VirtualControllerBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unstarted,
    Ready,
    Stopped,
}

enum Lifecycle {
    Unstarted,
    Ready(Box<dyn VirtualController>),
    Stopped,
}

/// One logical controller bound to one connection.
///
/// Owns its virtual device exclusively: the device is plugged in by [`start`](Self::start) and
/// unplugged by [`stop`](Self::stop). There is no way back to `Unstarted`.
pub struct ControllerSession {
    controller_id: u8,
    state: GamepadState,
    lifecycle: Lifecycle,
}

impl ControllerSession {
    pub fn new(controller_id: u8) -> Self {
        Self {
            controller_id,
            state: GamepadState::default(),
            lifecycle: Lifecycle::Unstarted,
        }
    }

    pub fn controller_id(&self) -> u8 {
        self.controller_id
    }

    pub fn state(&self) -> &GamepadState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        match self.lifecycle {
            Lifecycle::Unstarted => SessionPhase::Unstarted,
            Lifecycle::Ready(_) => SessionPhase::Ready,
            Lifecycle::Stopped => SessionPhase::Stopped,
        }
    }

    /// Plug in a fresh virtual device. The backend error is passed through untouched.
    pub fn start(&mut self, backend: &mut dyn VirtualControllerBackend) -> Result<()> {
        if !matches!(self.lifecycle, Lifecycle::Unstarted) {
            return Err(self.not_ready());
        }

        let device = backend
            .plug_in(self.controller_id)
            .map_err(|reason| RelayError::DeviceAllocationFailed {
                controller_id: self.controller_id,
                reason,
            })?;

        self.state = GamepadState::default();
        self.lifecycle = Lifecycle::Ready(device);
        Ok(())
    }

    /// Replace the whole state and forward it to the device
    pub fn apply(&mut self, state: GamepadState) -> Result<()> {
        let Lifecycle::Ready(device) = &mut self.lifecycle else {
            return Err(self.not_ready());
        };

        self.state = state;
        log::trace!("Controller {} <- {:?}", self.controller_id, self.state);

        device
            .update(&self.state)
            .map_err(|reason| RelayError::DeviceUpdateFailed {
                controller_id: self.controller_id,
                reason,
            })
    }

    /// Release whatever device was allocated. Only valid once.
    pub fn stop(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Ready(device) => {
                drop(device);
                Ok(())
            }
            Lifecycle::Unstarted => Ok(()),
            Lifecycle::Stopped => Err(self.not_ready()),
        }
    }

    fn not_ready(&self) -> RelayError {
        RelayError::SessionNotReady {
            controller_id: self.controller_id,
            phase: self.phase(),
        }
    }
}
