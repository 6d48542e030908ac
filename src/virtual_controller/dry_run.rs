use super::{VirtualController, VirtualControllerBackend};
use crate::protocol::GamepadState;

/// Backend without a driver: every report is only logged
pub struct DryRunBackend;

struct DryRunController {
    controller_id: u8,
}

impl VirtualControllerBackend for DryRunBackend {
    fn plug_in(&mut self, controller_id: u8) -> anyhow::Result<Box<dyn VirtualController>> {
        log::info!("Dry-run controller {} plugged in", controller_id);
        Ok(Box::new(DryRunController { controller_id }))
    }
}

impl VirtualController for DryRunController {
    fn update(&mut self, state: &GamepadState) -> anyhow::Result<()> {
        log::debug!("Controller {} report: {:?}", self.controller_id, state);
        Ok(())
    }
}

impl Drop for DryRunController {
    fn drop(&mut self) {
        log::info!("Dry-run controller {} unplugged", self.controller_id);
    }
}
