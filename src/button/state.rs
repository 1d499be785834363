//! Button trigger payload decoding
//!
//! The button characteristic notifies at least 4 bytes; the first 4 are a
//! little-endian u32 state code and anything after that is reserved.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Minimum payload length carrying a state code
pub const STATE_CODE_LEN: usize = 4;

/// Button states reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonState {
    /// No press in progress
    Idle,
    /// Button held past the firmware's minimum hold duration
    LongPressStart,
    /// Button released after a long press
    LongPressRelease,
}

impl ButtonState {
    /// Wire code reported by the firmware
    pub fn code(self) -> u32 {
        match self {
            ButtonState::Idle => 0,
            ButtonState::LongPressStart => 3,
            ButtonState::LongPressRelease => 5,
        }
    }

    /// Map a wire code to a state, rejecting anything undeclared
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ButtonState::Idle),
            3 => Some(ButtonState::LongPressStart),
            5 => Some(ButtonState::LongPressRelease),
            _ => None,
        }
    }
}

impl std::fmt::Display for ButtonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonState::Idle => write!(f, "IDLE"),
            ButtonState::LongPressStart => write!(f, "LONG_PRESS_START"),
            ButtonState::LongPressRelease => write!(f, "LONG_PRESS_RELEASE"),
        }
    }
}

/// A recognized button notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    state: ButtonState,
    observed_at: Instant,
}

impl ButtonEvent {
    pub fn new(state: ButtonState, observed_at: Instant) -> Self {
        Self { state, observed_at }
    }

    pub fn state(&self) -> ButtonState {
        self.state
    }

    pub fn observed_at(&self) -> Instant {
        self.observed_at
    }
}

/// Read the leading state code of a raw payload
///
/// Returns `None` when fewer than 4 bytes are present.
pub fn read_code(raw: &[u8]) -> Option<u32> {
    let head: [u8; STATE_CODE_LEN] = raw.get(..STATE_CODE_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(head))
}

/// Decode a raw payload into a typed state
pub fn decode_state(raw: &[u8]) -> Option<ButtonState> {
    read_code(raw).and_then(ButtonState::from_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_payloads_rejected() {
        assert_eq!(decode_state(&[]), None);
        assert_eq!(decode_state(&[3]), None);
        assert_eq!(decode_state(&[3, 0, 0]), None);
    }

    #[test]
    fn test_declared_codes_decode() {
        assert_eq!(decode_state(&[0, 0, 0, 0]), Some(ButtonState::Idle));
        assert_eq!(decode_state(&[3, 0, 0, 0]), Some(ButtonState::LongPressStart));
        assert_eq!(decode_state(&[5, 0, 0, 0]), Some(ButtonState::LongPressRelease));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        assert_eq!(
            decode_state(&[3, 0, 0, 0, 0xde, 0xad, 0xbe, 0xef]),
            Some(ButtonState::LongPressStart)
        );
    }

    #[test]
    fn test_undeclared_codes_rejected() {
        for code in [1u32, 2, 4, 6, 0x0300, 0x0003_0000, u32::MAX] {
            assert_eq!(decode_state(&code.to_le_bytes()), None, "code {code:#x}");
        }
    }

    #[test]
    fn test_code_is_little_endian() {
        // big-endian 3 must not be read as LongPressStart
        assert_eq!(read_code(&[0, 0, 0, 3]), Some(0x0300_0000));
        assert_eq!(decode_state(&[0, 0, 0, 3]), None);
    }

    #[test]
    fn test_code_round_trip() {
        for state in [
            ButtonState::Idle,
            ButtonState::LongPressStart,
            ButtonState::LongPressRelease,
        ] {
            assert_eq!(ButtonState::from_code(state.code()), Some(state));
        }
    }
}
