use super::uinput_ffi::*;
use super::{VirtualController, VirtualControllerBackend};
use crate::protocol::{Buttons, GamepadState};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;

const KEY_MAP: [(u16, u16); 11] = [
    (Buttons::A, BTN_A),
    (Buttons::B, BTN_B),
    (Buttons::X, BTN_X),
    (Buttons::Y, BTN_Y),
    (Buttons::LEFT_SHOULDER, BTN_TL),
    (Buttons::RIGHT_SHOULDER, BTN_TR),
    (Buttons::BACK, BTN_SELECT),
    (Buttons::START, BTN_START),
    (Buttons::GUIDE, BTN_MODE),
    (Buttons::LEFT_THUMB, BTN_THUMBL),
    (Buttons::RIGHT_THUMB, BTN_THUMBR),
];

/// uinput backend. Each controller is its own `/dev/uinput` device.
pub struct UinputBackend;

impl UinputBackend {
    /// Make sure uinput is writable before any connection is accepted
    pub fn open() -> anyhow::Result<Self> {
        open_uinput()?;
        log::info!("{} is writable", UINPUT_PATH);
        Ok(Self)
    }
}

impl VirtualControllerBackend for UinputBackend {
    fn plug_in(&mut self, controller_id: u8) -> anyhow::Result<Box<dyn VirtualController>> {
        let file = open_uinput()?;
        create_device(&file, controller_id)?;

        log::info!("Uinput gamepad {} created", controller_id);

        Ok(Box::new(UinputController { file, controller_id }))
    }
}

fn open_uinput() -> anyhow::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(UINPUT_PATH)
        .map_err(|e| anyhow::anyhow!(
            "Failed to open {}: {}. Try: sudo chmod 666 /dev/uinput",
            UINPUT_PATH, e
        ))
}

fn create_device(file: &File, controller_id: u8) -> anyhow::Result<()> {
    let uinput_fd = file.as_raw_fd();

    unsafe {
        for ev in [EV_KEY, EV_ABS, EV_SYN] {
            if libc::ioctl(uinput_fd, UI_SET_EVBIT, ev as libc::c_int) < 0 {
                return Err(anyhow::anyhow!("Failed to set event type {}: {}", ev, std::io::Error::last_os_error()));
            }
        }

        for (_, btn) in KEY_MAP {
            if libc::ioctl(uinput_fd, UI_SET_KEYBIT, btn as libc::c_int) < 0 {
                return Err(anyhow::anyhow!("Failed to set button {}", btn));
            }
        }

        for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY, ABS_Z, ABS_RZ, ABS_HAT0X, ABS_HAT0Y] {
            if libc::ioctl(uinput_fd, UI_SET_ABSBIT, axis as libc::c_int) < 0 {
                return Err(anyhow::anyhow!("Failed to set axis {}", axis));
            }
        }

        let mut dev: UinputUserDev = std::mem::zeroed();
        let name = format!("Padrelay Virtual Xbox Controller {}", controller_id);
        let len = name.len().min(dev.name.len() - 1);
        dev.name[..len].copy_from_slice(&name.as_bytes()[..len]);
        dev.id.bustype = BUS_USB;
        dev.id.vendor = 0x045e; // Microsoft
        dev.id.product = 0x028e; // Xbox 360 Controller
        dev.id.version = 0x0110;

        for axis in [ABS_X, ABS_Y, ABS_RX, ABS_RY] {
            dev.absmin[axis as usize] = AXIS_MIN;
            dev.absmax[axis as usize] = AXIS_MAX;
        }
        for axis in [ABS_Z, ABS_RZ] {
            dev.absmin[axis as usize] = TRIGGER_MIN;
            dev.absmax[axis as usize] = TRIGGER_MAX;
        }
        for axis in [ABS_HAT0X, ABS_HAT0Y] {
            dev.absmin[axis as usize] = -1;
            dev.absmax[axis as usize] = 1;
        }

        let dev_bytes = std::slice::from_raw_parts(
            &dev as *const _ as *const u8,
            std::mem::size_of::<UinputUserDev>()
        );

        if libc::write(uinput_fd, dev_bytes.as_ptr() as *const libc::c_void, dev_bytes.len()) < 0 {
            return Err(anyhow::anyhow!("Failed to write device struct: {}", std::io::Error::last_os_error()));
        }

        if libc::ioctl(uinput_fd, UI_DEV_CREATE) < 0 {
            return Err(anyhow::anyhow!("Failed to create device: {}", std::io::Error::last_os_error()));
        }
    }

    Ok(())
}

struct UinputController {
    file: File,
    controller_id: u8,
}

fn hat(negative: bool, positive: bool) -> i32 {
    match (negative, positive) {
        (true, false) => -1,
        (false, true) => 1,
        _ => 0,
    }
}

impl VirtualController for UinputController {
    fn update(&mut self, state: &GamepadState) -> anyhow::Result<()> {
        // evdev Y axes grow downwards, XInput ones upwards; flip like xpad does
        let mut events = vec![
            InputEvent::new(EV_ABS, ABS_X, state.left_stick_x as i32),
            InputEvent::new(EV_ABS, ABS_Y, !(state.left_stick_y as i32)),
            InputEvent::new(EV_ABS, ABS_RX, state.right_stick_x as i32),
            InputEvent::new(EV_ABS, ABS_RY, !(state.right_stick_y as i32)),
            InputEvent::new(EV_ABS, ABS_Z, state.left_trigger as i32),
            InputEvent::new(EV_ABS, ABS_RZ, state.right_trigger as i32),
        ];

        for (flag, btn) in KEY_MAP {
            events.push(InputEvent::new(EV_KEY, btn, state.is_pressed(flag) as i32));
        }

        let hat_x = hat(state.is_pressed(Buttons::DPAD_LEFT), state.is_pressed(Buttons::DPAD_RIGHT));
        let hat_y = hat(state.is_pressed(Buttons::DPAD_UP), state.is_pressed(Buttons::DPAD_DOWN));
        events.push(InputEvent::new(EV_ABS, ABS_HAT0X, hat_x));
        events.push(InputEvent::new(EV_ABS, ABS_HAT0Y, hat_y));
        events.push(InputEvent::new(EV_SYN, SYN_REPORT, 0));

        // One write so the kernel sees the whole report at once
        let bytes = unsafe {
            std::slice::from_raw_parts(
                events.as_ptr() as *const u8,
                events.len() * std::mem::size_of::<InputEvent>()
            )
        };
        self.file.write_all(bytes)?;
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for UinputController {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::ioctl(self.file.as_raw_fd(), UI_DEV_DESTROY);
        }
        log::info!("Uinput gamepad {} destroyed", self.controller_id);
    }
}
