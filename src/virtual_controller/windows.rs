use super::{VirtualController, VirtualControllerBackend};
use crate::protocol::GamepadState;
use vigem_client::{Client, TargetId, XButtons, XGamepad, Xbox360Wired};

/// ViGEmBus backend. Each controller gets its own bus client and X360 target.
pub struct VigemBackend;

impl VigemBackend {
    /// Make sure the bus driver answers before any connection is accepted
    pub fn connect() -> anyhow::Result<Self> {
        Client::connect().map_err(|e| anyhow::anyhow!(
            "Failed to connect to ViGEmBus: {:?}. Make sure ViGEmBus driver is installed from https://github.com/ViGEm/ViGEmBus/releases",
            e
        ))?;
        log::info!("ViGEmBus is reachable");
        Ok(Self)
    }
}

impl VirtualControllerBackend for VigemBackend {
    fn plug_in(&mut self, controller_id: u8) -> anyhow::Result<Box<dyn VirtualController>> {
        let client = Client::connect()
            .map_err(|e| anyhow::anyhow!("ViGEm Bus connection failed: {:?}", e))?;

        let mut target = Xbox360Wired::new(client, TargetId::XBOX360_WIRED);

        target.plugin()
            .map_err(|e| anyhow::anyhow!("Target plugin failed: {:?}", e))?;

        target.wait_ready()
            .map_err(|e| anyhow::anyhow!("Controller not ready: {:?}", e))?;

        log::info!("Virtual Xbox 360 controller {} created via ViGEmBus", controller_id);

        Ok(Box::new(VigemController { target, controller_id }))
    }
}

struct VigemController {
    target: Xbox360Wired<Client>,
    controller_id: u8,
}

impl VirtualController for VigemController {
    fn update(&mut self, state: &GamepadState) -> anyhow::Result<()> {
        // Wire layout and XUSB_REPORT are the same shape, nothing to translate
        let gamepad = XGamepad {
            buttons: XButtons { raw: state.buttons },
            left_trigger: state.left_trigger,
            right_trigger: state.right_trigger,
            thumb_lx: state.left_stick_x,
            thumb_ly: state.left_stick_y,
            thumb_rx: state.right_stick_x,
            thumb_ry: state.right_stick_y,
        };

        self.target.update(&gamepad)
            .map_err(|e| anyhow::anyhow!("Failed to update controller: {:?}", e))
    }
}

impl Drop for VigemController {
    fn drop(&mut self) {
        if let Err(e) = self.target.unplug() {
            log::warn!("Failed to unplug controller {}: {:?}", self.controller_id, e);
        }
        log::info!("Virtual Xbox 360 controller {} removed", self.controller_id);
    }
}
