//! Haptic cues on the speaker characteristic
//!
//! The motor takes a single byte selecting the pulse length. Cues are
//! queued to a dedicated task so the start cue's gap between pulses never
//! holds up notification handling, and cues never interleave.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ble::{BleTransport, Characteristic};

/// Default pause between the two pulses of the start cue
pub const DEFAULT_START_CUE_GAP: Duration = Duration::from_millis(100);

/// Pulse length tier understood by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseLevel {
    /// ~20 ms
    Short,
    /// ~100 ms
    Medium,
    /// ~500 ms
    Long,
}

impl PulseLevel {
    pub fn byte(self) -> u8 {
        match self {
            PulseLevel::Short => 1,
            PulseLevel::Medium => 2,
            PulseLevel::Long => 3,
        }
    }
}

/// Which recording transition a sequence announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Two ascending pulses
    Start,
    /// One long pulse
    Stop,
}

/// A haptic cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HapticPattern {
    /// Single pulse of the given length
    Level(PulseLevel),
    /// Transition cue
    Sequence(PatternKind),
}

impl HapticPattern {
    /// Bytes written in order, separated by the start cue gap
    pub fn pulses(&self) -> Vec<u8> {
        match self {
            HapticPattern::Level(level) => vec![level.byte()],
            HapticPattern::Sequence(PatternKind::Start) => {
                vec![PulseLevel::Short.byte(), PulseLevel::Medium.byte()]
            }
            HapticPattern::Sequence(PatternKind::Stop) => vec![PulseLevel::Long.byte()],
        }
    }
}

/// Writes haptic cues to the speaker characteristic
///
/// Every failure is logged and swallowed; the recording state never
/// depends on a cue being felt.
pub struct HapticSequencer<T> {
    transport: Arc<T>,
    pulse_gap: Duration,
    /// Speaker lookup, cached once it succeeds
    speaker: Option<bool>,
}

impl<T: BleTransport> HapticSequencer<T> {
    pub fn new(transport: Arc<T>, pulse_gap: Duration) -> Self {
        Self {
            transport,
            pulse_gap,
            speaker: None,
        }
    }

    async fn speaker_available(&mut self) -> bool {
        if let Some(available) = self.speaker {
            return available;
        }

        match self.transport.discover(Characteristic::SPEAKER).await {
            Ok(available) => {
                if !available {
                    warn!("speaker characteristic not found, haptic cues disabled");
                }
                self.speaker = Some(available);
                available
            }
            Err(e) => {
                warn!(?e, "speaker lookup failed");
                false
            }
        }
    }

    /// Play one pattern, best-effort
    pub async fn send(&mut self, pattern: HapticPattern) {
        if !self.speaker_available().await {
            return;
        }

        for (i, byte) in pattern.pulses().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pulse_gap).await;
            }
            if let Err(e) = self.transport.write(Characteristic::SPEAKER, vec![byte]).await {
                warn!(?e, ?pattern, "haptic write failed");
                return;
            }
        }

        debug!(?pattern, "haptic cue played");
    }

    /// Move the sequencer onto its own task
    pub fn spawn(mut self) -> HapticHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<HapticPattern>();

        let task = tokio::spawn(async move {
            while let Some(pattern) = rx.recv().await {
                self.send(pattern).await;
            }
            debug!("haptic sequencer stopped");
        });

        HapticHandle { tx, task }
    }
}

/// Non-blocking front of a spawned `HapticSequencer`
pub struct HapticHandle {
    tx: mpsc::UnboundedSender<HapticPattern>,
    task: JoinHandle<()>,
}

impl HapticHandle {
    /// Queue a pattern; never waits
    pub fn dispatch(&self, pattern: HapticPattern) {
        if self.tx.send(pattern).is_err() {
            debug!(?pattern, "haptic sequencer gone, cue dropped");
        }
    }

    /// Let queued cues finish, aborting after `timeout`
    ///
    /// Returns `false` if the task had to be aborted.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let HapticHandle { tx, mut task } = self;
        drop(tx);

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                info!("haptic sequencer did not drain in time, aborting");
                task.abort();
                false
            }
        }
    }
}
