//! Button module for the device's trigger characteristic
//!
//! Decodes raw button notifications and drives the recording toggle:
//! - `LongPressStart` flips Idle <-> Recording
//! - `LongPressRelease` and `Idle` are informational only

mod machine;
mod state;

pub use machine::{ButtonListener, ButtonStateMachine, DebouncePolicy, RecordingState};
pub use state::{decode_state, ButtonEvent, ButtonState};
