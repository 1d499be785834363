//! Recording toggle state machine
//!
//! Turns decoded button notifications into Idle <-> Recording transitions.
//! Only `LongPressStart` toggles; release and idle notifications are
//! reported to the listener and otherwise ignored.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::state::{decode_state, read_code, ButtonEvent, ButtonState};
use crate::feedback::{HapticPattern, PatternKind};

/// Recording state owned by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    /// Not recording
    #[default]
    Idle,
    /// Audio is being forwarded downstream
    Recording,
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "Idle"),
            RecordingState::Recording => write!(f, "Recording"),
        }
    }
}

/// Hooks invoked synchronously while a notification is processed
///
/// On a toggle the machine mutates its state first, then calls
/// `on_haptic`, then exactly one of `on_recording_start` /
/// `on_recording_stop`.
pub trait ButtonListener {
    /// Every recognized notification, including `Idle`
    fn on_button_event(&mut self, _event: &ButtonEvent) {}

    /// Haptic cue selected for a transition
    fn on_haptic(&mut self, _pattern: HapticPattern) {}

    /// Idle -> Recording
    fn on_recording_start(&mut self, _toggle_count: u64) {}

    /// Recording -> Idle
    fn on_recording_stop(&mut self, _toggle_count: u64) {}
}

/// Optional duplicate suppression for `LongPressStart`
///
/// Disabled by default: the firmware enforces a one second hold and does
/// not repeat starts, so every recognized start toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Starts closer than this to the previous toggle are ignored
    pub min_toggle_interval: Option<Duration>,
}

impl DebouncePolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_min_interval(interval: Duration) -> Self {
        Self {
            min_toggle_interval: Some(interval),
        }
    }

    fn accepts(&self, last_toggle_at: Option<Instant>, now: Instant) -> bool {
        match (self.min_toggle_interval, last_toggle_at) {
            (Some(min), Some(last)) => now.saturating_duration_since(last) >= min,
            _ => true,
        }
    }
}

/// Button-driven recording toggle
#[derive(Debug)]
pub struct ButtonStateMachine {
    state: RecordingState,
    toggle_count: u64,
    debounce: DebouncePolicy,
    last_toggle_at: Option<Instant>,
}

impl Default for ButtonStateMachine {
    fn default() -> Self {
        Self::new(DebouncePolicy::disabled())
    }
}

impl ButtonStateMachine {
    /// Create a machine in the Idle state
    pub fn new(debounce: DebouncePolicy) -> Self {
        Self {
            state: RecordingState::Idle,
            toggle_count: 0,
            debounce,
            last_toggle_at: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Number of transitions since creation or the last reset
    pub fn toggle_count(&self) -> u64 {
        self.toggle_count
    }

    /// Process a raw notification observed now
    pub fn process<L: ButtonListener>(&mut self, raw: &[u8], listener: &mut L) -> Option<ButtonEvent> {
        self.process_at(raw, Instant::now(), listener)
    }

    /// Process a raw notification observed at `observed_at`
    ///
    /// Payloads shorter than 4 bytes or carrying an undeclared state code
    /// produce no event and leave the machine untouched.
    pub fn process_at<L: ButtonListener>(
        &mut self,
        raw: &[u8],
        observed_at: Instant,
        listener: &mut L,
    ) -> Option<ButtonEvent> {
        let Some(state) = decode_state(raw) else {
            debug!(len = raw.len(), code = ?read_code(raw), "ignoring malformed button payload");
            return None;
        };

        let event = ButtonEvent::new(state, observed_at);
        debug!(state = %state, recording = %self.state, "button event");
        listener.on_button_event(&event);

        match state {
            ButtonState::LongPressStart => {
                if self.debounce.accepts(self.last_toggle_at, observed_at) {
                    self.toggle_at(observed_at, listener);
                } else {
                    debug!("long press start suppressed by debounce window");
                }
            }
            ButtonState::LongPressRelease | ButtonState::Idle => {}
        }

        Some(event)
    }

    /// Flip the recording state and fire the transition hooks
    pub fn toggle<L: ButtonListener>(&mut self, listener: &mut L) -> RecordingState {
        self.toggle_at(Instant::now(), listener)
    }

    fn toggle_at<L: ButtonListener>(&mut self, now: Instant, listener: &mut L) -> RecordingState {
        let from = self.state;
        let (to, kind) = match from {
            RecordingState::Idle => (RecordingState::Recording, PatternKind::Start),
            RecordingState::Recording => (RecordingState::Idle, PatternKind::Stop),
        };

        self.state = to;
        self.toggle_count += 1;
        self.last_toggle_at = Some(now);

        info!(
            from = %from,
            to = %to,
            toggle_count = self.toggle_count,
            "recording toggled"
        );

        listener.on_haptic(HapticPattern::Sequence(kind));
        match to {
            RecordingState::Recording => listener.on_recording_start(self.toggle_count),
            RecordingState::Idle => listener.on_recording_stop(self.toggle_count),
        }

        to
    }

    /// Return to Idle and clear the counter
    pub fn reset(&mut self) {
        self.state = RecordingState::Idle;
        self.toggle_count = 0;
        self.last_toggle_at = None;
    }
}
