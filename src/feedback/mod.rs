//! Feedback module for recording transitions
//!
//! Two best-effort channels back to the wearer:
//! - haptic cues written to the device's speaker characteristic
//! - spoken phrases synthesized on a background thread

mod haptic;
mod speech;
mod worker;

pub use haptic::{
    HapticHandle, HapticPattern, HapticSequencer, PatternKind, PulseLevel, DEFAULT_START_CUE_GAP,
};
pub use speech::{CommandSpeechEngine, SpeechCapability, SpeechEngine, SpeechError};
pub use worker::{
    FeedbackError, SpeechFeedbackWorker, RECORDING_STARTED_PHRASE, RECORDING_STOPPED_PHRASE,
};
