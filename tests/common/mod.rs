#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use padrelay::protocol::GamepadState;
use padrelay::virtual_controller::{VirtualController, VirtualControllerBackend};

pub const BUS_ERROR: &str = "bus error 0xE0000001";

#[derive(Debug, Default)]
pub struct Recording {
    pub plugged: Vec<u8>,
    pub live: usize,
    pub updates: Vec<(u8, GamepadState)>,
    pub fail_plug_in: bool,
    pub fail_update: bool,
}

/// Backend double that counts live devices and records every report
#[derive(Clone, Default)]
pub struct FakeBackend {
    recording: Arc<Mutex<Recording>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recording(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().unwrap()
    }

    pub fn live(&self) -> usize {
        self.recording().live
    }

    pub fn updates(&self) -> Vec<(u8, GamepadState)> {
        self.recording().updates.clone()
    }

    pub fn fail_plug_in(&self, fail: bool) {
        self.recording().fail_plug_in = fail;
    }

    pub fn fail_update(&self, fail: bool) {
        self.recording().fail_update = fail;
    }
}

struct FakeController {
    controller_id: u8,
    recording: Arc<Mutex<Recording>>,
}

impl VirtualControllerBackend for FakeBackend {
    fn plug_in(&mut self, controller_id: u8) -> anyhow::Result<Box<dyn VirtualController>> {
        let mut recording = self.recording();
        if recording.fail_plug_in {
            anyhow::bail!(BUS_ERROR);
        }
        recording.plugged.push(controller_id);
        recording.live += 1;
        drop(recording);

        Ok(Box::new(FakeController {
            controller_id,
            recording: Arc::clone(&self.recording),
        }))
    }
}

impl VirtualController for FakeController {
    fn update(&mut self, state: &GamepadState) -> anyhow::Result<()> {
        let mut recording = self.recording.lock().unwrap();
        if recording.fail_update {
            anyhow::bail!("update rejected by driver");
        }
        recording.updates.push((self.controller_id, *state));
        Ok(())
    }
}

impl Drop for FakeController {
    fn drop(&mut self) {
        if let Ok(mut recording) = self.recording.lock() {
            recording.live -= 1;
        }
    }
}

pub fn sample_state(seed: u8) -> GamepadState {
    GamepadState {
        buttons: u16::from(seed) << 8 | u16::from(seed),
        left_trigger: seed,
        right_trigger: 255 - seed,
        left_stick_x: i16::from(seed) * 100,
        left_stick_y: -(i16::from(seed) * 100),
        right_stick_x: i16::MIN + i16::from(seed),
        right_stick_y: i16::MAX - i16::from(seed),
    }
}
