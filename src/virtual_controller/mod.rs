mod dry_run;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
mod uinput_ffi;
#[cfg(windows)]
mod windows;

pub use dry_run::DryRunBackend;
#[cfg(target_os = "linux")]
pub use linux::UinputBackend;
#[cfg(windows)]
pub use windows::VigemBackend;

use crate::config::BackendKind;
use crate::protocol::GamepadState;

/// One plugged-in virtual Xbox 360 controller.
///
/// Dropping the value unplugs the device and frees every resource behind it.
pub trait VirtualController: Send {
    /// Push a full report to the device in a single call
    fn update(&mut self, state: &GamepadState) -> anyhow::Result<()>;
}

/// Source of virtual controllers, one per session
pub trait VirtualControllerBackend: Send {
    fn plug_in(&mut self, controller_id: u8) -> anyhow::Result<Box<dyn VirtualController>>;
}

/// Connect to the backend selected in the config.
///
/// Fails when the platform driver is missing or unreachable, which is fatal at startup.
pub fn connect(kind: BackendKind) -> anyhow::Result<Box<dyn VirtualControllerBackend>> {
    match kind {
        BackendKind::DryRun => Ok(Box::new(DryRunBackend)),
        BackendKind::Native => native(),
    }
}

#[cfg(windows)]
fn native() -> anyhow::Result<Box<dyn VirtualControllerBackend>> {
    Ok(Box::new(VigemBackend::connect()?))
}

#[cfg(target_os = "linux")]
fn native() -> anyhow::Result<Box<dyn VirtualControllerBackend>> {
    Ok(Box::new(UinputBackend::open()?))
}

#[cfg(not(any(windows, target_os = "linux")))]
fn native() -> anyhow::Result<Box<dyn VirtualControllerBackend>> {
    Err(anyhow::anyhow!(
        "No virtual controller driver on this platform, set \"backend\": \"dry_run\" in the config"
    ))
}
