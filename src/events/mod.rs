//! Events module for recording session transitions
//!
//! Provides structured event types published by the session reactor for
//! the application layer: button observations, recording start/stop and
//! audio detection windows.

use serde::{Deserialize, Serialize};

use crate::button::ButtonState;

/// Events emitted by the recording session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A recognized button notification (any state)
    ButtonObserved {
        state: ButtonState,
    },

    /// Idle -> Recording
    RecordingStarted {
        /// Toggle counter after the transition
        toggle_count: u64,
    },

    /// Recording -> Idle
    RecordingStopped {
        /// Toggle counter after the transition
        toggle_count: u64,
        /// How long the recording lasted
        duration_ms: u64,
        /// Decoded PCM bytes forwarded during the recording
        bytes: u64,
    },

    /// Audio notifications dropped for a detection window
    AudioPaused,

    /// Audio notifications restored after a detection window
    AudioResumed,
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::ButtonObserved { state } => write!(f, "BUTTON_OBSERVED ({})", state),
            SessionEvent::RecordingStarted { toggle_count } => {
                write!(f, "RECORDING_STARTED (#{})", toggle_count)
            }
            SessionEvent::RecordingStopped {
                toggle_count,
                duration_ms,
                bytes,
            } => write!(
                f,
                "RECORDING_STOPPED (#{}, {}ms, {} bytes)",
                toggle_count, duration_ms, bytes
            ),
            SessionEvent::AudioPaused => write!(f, "AUDIO_PAUSED"),
            SessionEvent::AudioResumed => write!(f, "AUDIO_RESUMED"),
        }
    }
}
