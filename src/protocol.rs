/// Size of one input packet on the `/controller` endpoint.
///
/// ```text
/// buttons [00 00] left_trigger [00] right_trigger [00]
/// left_stick_x [00 00] left_stick_y [00 00] right_stick_x [00 00] right_stick_y [00 00]
/// ```
///
/// Every multi-byte field is little-endian.
pub const PACKET_LEN: usize = 12;

/// Button bit flags, laid out like the XUSB report the virtual controller consumes
pub struct Buttons;

impl Buttons {
    pub const DPAD_UP: u16 = 0x0001;
    pub const DPAD_DOWN: u16 = 0x0002;
    pub const DPAD_LEFT: u16 = 0x0004;
    pub const DPAD_RIGHT: u16 = 0x0008;
    pub const START: u16 = 0x0010;
    pub const BACK: u16 = 0x0020;
    pub const LEFT_THUMB: u16 = 0x0040;
    pub const RIGHT_THUMB: u16 = 0x0080;
    pub const LEFT_SHOULDER: u16 = 0x0100;
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    pub const GUIDE: u16 = 0x0400;
    pub const A: u16 = 0x1000;
    pub const B: u16 = 0x2000;
    pub const X: u16 = 0x4000;
    pub const Y: u16 = 0x8000;
}

/// Gamepad state forwarded to a virtual controller on every accepted packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GamepadState {
    /// Digital buttons, see [`Buttons`]
    pub buttons: u16,
    /// Left trigger (0 to 255)
    pub left_trigger: u8,
    /// Right trigger (0 to 255)
    pub right_trigger: u8,
    /// Left stick X axis (-32768 to 32767)
    pub left_stick_x: i16,
    /// Left stick Y axis (-32768 to 32767)
    pub left_stick_y: i16,
    /// Right stick X axis (-32768 to 32767)
    pub right_stick_x: i16,
    /// Right stick Y axis (-32768 to 32767)
    pub right_stick_y: i16,
}

impl GamepadState {
    pub fn is_pressed(&self, button: u16) -> bool {
        self.buttons & button == button
    }

    /// Encode into the wire layout accepted by [`decode`]
    pub fn to_bytes(&self) -> [u8; PACKET_LEN] {
        let mut out = [0u8; PACKET_LEN];
        out[0..2].copy_from_slice(&self.buttons.to_le_bytes());
        out[2] = self.left_trigger;
        out[3] = self.right_trigger;
        out[4..6].copy_from_slice(&self.left_stick_x.to_le_bytes());
        out[6..8].copy_from_slice(&self.left_stick_y.to_le_bytes());
        out[8..10].copy_from_slice(&self.right_stick_x.to_le_bytes());
        out[10..12].copy_from_slice(&self.right_stick_y.to_le_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("malformed packet: expected exactly {expected} bytes, got {len}", expected = PACKET_LEN)]
    Malformed { len: usize },
}

/// Decode one input packet.
///
/// Fails without producing any partial state unless the payload is exactly [`PACKET_LEN`]
/// bytes long. Values are taken as-is, the field widths already bound every range.
pub fn decode(payload: &[u8]) -> Result<GamepadState, PacketError> {
    let bytes: &[u8; PACKET_LEN] = payload
        .try_into()
        .map_err(|_| PacketError::Malformed { len: payload.len() })?;

    let word = |at: usize| u16::from(bytes[at]) | (u16::from(bytes[at + 1]) << 8);

    Ok(GamepadState {
        buttons: word(0),
        left_trigger: bytes[2],
        right_trigger: bytes[3],
        left_stick_x: word(4) as i16,
        left_stick_y: word(6) as i16,
        right_stick_x: word(8) as i16,
        right_stick_y: word(10) as i16,
    })
}
