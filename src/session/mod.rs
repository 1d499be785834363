//! Session module tying the button, streams and feedback together
//!
//! `RecordingSession` is the reactor that owns every piece of mutable
//! session state. Decoded audio leaves through a channel, by default into
//! a `WavRecorder`.

mod decoder;
mod recorder;
mod recording;

pub use decoder::{AudioDecoder, PcmPacketDecoder, PACKET_HEADER_LEN};
pub use recorder::{RecorderError, WavRecorder};
pub use recording::{RecordingSession, SessionError, SessionOptions, SessionStats, SessionSummary};
