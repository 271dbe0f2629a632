/*!
 # Command encoding

 Payloads for the control characteristic. Every command is an integer made of
 a fixed base constant with the parameter bytes placed at fixed bit offsets,
 sent as its minimal big-endian byte rendering.
*/

use std::fmt;

/// GATT handle of the control characteristic on every supported controller
pub const CONTROL_HANDLE: u16 = 0x0007;

/// Power on command
pub const POWER_ON: u64 = 0xcc2333;
/// Power off command
pub const POWER_OFF: u64 = 0xcc2433;

/// Base value for RGB commands
pub const RGB_BASE: u64 = 0x56_00_00_00_00_f0_aa;
/// Bit offsets of the red, green and blue bytes within an RGB command
pub const RGB_OFFSETS: [u32; 3] = [5 * 8, 4 * 8, 3 * 8];

/// Base value for white commands
pub const WHITE_BASE: u64 = 0x56_00_00_00_00_0f_aa;
/// Bit offset of the white byte within a white command
pub const WHITE_OFFSET: u32 = 2 * 8;

/// An encoded command, ready to be written to [`CONTROL_HANDLE`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Renders `value` as a payload with no leading zero bytes
    pub fn from_value(value: u64) -> Self {
        Payload(pack_minimal(value))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex, two digits per byte, as `gatttool --value` expects
    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Lowercase hex of `bytes`, two digits per byte
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Big-endian bytes of `value` without leading zero bytes.
///
/// Zero renders to an empty sequence.
pub fn pack_minimal(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let significant = (u64::BITS - value.leading_zeros()).div_ceil(8) as usize;
    bytes[bytes.len() - significant..].to_vec()
}

/// Encodes a power command
pub fn encode_power(on: bool) -> Payload {
    Payload::from_value(if on { POWER_ON } else { POWER_OFF })
}

/// Encodes an RGB color command
///
/// # Arguments
///
/// * `red` - Red component (0-255)
/// * `green` - Green component (0-255)
/// * `blue` - Blue component (0-255)
pub fn encode_color(red: u8, green: u8, blue: u8) -> Payload {
    let value = [red, green, blue]
        .iter()
        .zip(RGB_OFFSETS)
        .fold(RGB_BASE, |acc, (&v, offset)| acc | (u64::from(v) << offset));
    Payload::from_value(value)
}

/// Encodes a white channel command
///
/// # Arguments
///
/// * `level` - White level (0-255)
pub fn encode_white(level: u8) -> Payload {
    Payload::from_value(WHITE_BASE | (u64::from(level) << WHITE_OFFSET))
}
