//! Recording session reactor
//!
//! Owns the button state machine, the stream arbiter and the audio decoder,
//! and is the only place any of them is mutated. Notifications from both
//! characteristics arrive on one ordered channel; pause cycles report back
//! on the arbiter's channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::decoder::AudioDecoder;
use crate::ble::{BleTransport, Characteristic, Notification, TransportError};
use crate::button::{ButtonEvent, ButtonListener, ButtonStateMachine, DebouncePolicy, RecordingState};
use crate::config::Config;
use crate::events::SessionEvent;
use crate::feedback::{
    FeedbackError, HapticHandle, HapticPattern, HapticSequencer, SpeechFeedbackWorker,
    DEFAULT_START_CUE_GAP, RECORDING_STARTED_PHRASE, RECORDING_STOPPED_PHRASE,
};
use crate::stream::{ArbiterError, PauseOutcome, StreamArbiter, DEFAULT_DETECTION_WINDOW};

/// Notifications buffered between the transport and the reactor
const NOTIFICATION_BUFFER: usize = 256;

/// Tunables for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub detection_window: Duration,
    pub start_cue_gap: Duration,
    pub debounce: DebouncePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            detection_window: DEFAULT_DETECTION_WINDOW,
            start_cue_gap: DEFAULT_START_CUE_GAP,
            debounce: DebouncePolicy::disabled(),
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            detection_window: config.detection_window,
            start_cue_gap: config.start_cue_gap,
            debounce: config
                .min_toggle_interval
                .map(DebouncePolicy::with_min_interval)
                .unwrap_or_default(),
        }
    }
}

/// Audio counters for the lifetime of the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Audio notifications received
    pub packets_received: u64,
    /// Audio notifications discarded undecoded while idle
    pub packets_dropped_idle: u64,
    /// Decoded chunks the sink had no room for
    pub chunks_dropped_full: u64,
    /// Packets missing from the device's index sequence
    pub packets_lost: u64,
}

/// A completed recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub duration: Duration,
    pub bytes: u64,
}

/// Errors surfaced by `RecordingSession::stop`
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Streams(#[from] ArbiterError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),

    #[error("haptic sequencer did not stop within {0:?}")]
    HapticTimeout(Duration),
}

/// Transition side effects, kept apart from the machine so both can be
/// borrowed at once
struct SessionHooks {
    is_recording: bool,
    recording_started_at: Option<Instant>,
    bytes_received: u64,
    last_summary: Option<SessionSummary>,
    haptics: Option<HapticHandle>,
    speech: SpeechFeedbackWorker,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHooks {
    fn emit(&self, event: SessionEvent) {
        debug!(%event, "emitting session event");
        let _ = self.event_tx.send(event);
    }
}

impl ButtonListener for SessionHooks {
    fn on_button_event(&mut self, event: &ButtonEvent) {
        debug!(state = %event.state(), observed_at = ?event.observed_at(), "button event");
        self.emit(SessionEvent::ButtonObserved { state: event.state() });
    }

    fn on_haptic(&mut self, pattern: HapticPattern) {
        match &self.haptics {
            Some(haptics) => haptics.dispatch(pattern),
            None => debug!(?pattern, "no haptic sequencer, cue skipped"),
        }
    }

    fn on_recording_start(&mut self, toggle_count: u64) {
        self.is_recording = true;
        self.recording_started_at = Some(Instant::now());
        self.bytes_received = 0;

        info!(toggle_count, "recording started");
        self.speech.enqueue(RECORDING_STARTED_PHRASE);
        self.emit(SessionEvent::RecordingStarted { toggle_count });
    }

    fn on_recording_stop(&mut self, toggle_count: u64) {
        self.is_recording = false;
        let duration = self
            .recording_started_at
            .take()
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let summary = SessionSummary {
            duration,
            bytes: self.bytes_received,
        };
        self.last_summary = Some(summary);

        info!(
            toggle_count,
            duration_ms = duration.as_millis() as u64,
            bytes = summary.bytes,
            "recording stopped"
        );
        self.speech.enqueue(RECORDING_STOPPED_PHRASE);
        self.emit(SessionEvent::RecordingStopped {
            toggle_count,
            duration_ms: duration.as_millis() as u64,
            bytes: summary.bytes,
        });
    }
}

/// Button-controlled recording over one device connection
pub struct RecordingSession<T, D> {
    transport: Arc<T>,
    machine: ButtonStateMachine,
    arbiter: StreamArbiter<T>,
    hooks: SessionHooks,
    decoder: D,
    audio_tx: mpsc::Sender<Vec<u8>>,
    notifications: mpsc::Receiver<Notification>,
    start_cue_gap: Duration,
    stats: SessionStats,
}

impl<T: BleTransport, D: AudioDecoder> RecordingSession<T, D> {
    /// Decoded PCM goes to `audio_tx` only while recording
    pub fn new(
        transport: Arc<T>,
        decoder: D,
        speech: SpeechFeedbackWorker,
        audio_tx: mpsc::Sender<Vec<u8>>,
        event_tx: broadcast::Sender<SessionEvent>,
        options: SessionOptions,
    ) -> Self {
        let (notification_tx, notifications) = mpsc::channel(NOTIFICATION_BUFFER);
        let arbiter = StreamArbiter::new(Arc::clone(&transport), notification_tx, options.detection_window);

        Self {
            transport,
            machine: ButtonStateMachine::new(options.debounce),
            arbiter,
            hooks: SessionHooks {
                is_recording: false,
                recording_started_at: None,
                bytes_received: 0,
                last_summary: None,
                haptics: None,
                speech,
                event_tx,
            },
            decoder,
            audio_tx,
            notifications,
            start_cue_gap: options.start_cue_gap,
            stats: SessionStats::default(),
        }
    }

    pub fn recording_state(&self) -> RecordingState {
        self.machine.state()
    }

    pub fn is_recording(&self) -> bool {
        self.hooks.is_recording
    }

    pub fn toggle_count(&self) -> u64 {
        self.machine.toggle_count()
    }

    /// When the current recording began
    pub fn recording_started_at(&self) -> Option<Instant> {
        self.hooks.recording_started_at
    }

    /// Decoded bytes forwarded during the current (or last) recording
    pub fn bytes_received(&self) -> u64 {
        self.hooks.bytes_received
    }

    pub fn last_summary(&self) -> Option<SessionSummary> {
        self.hooks.last_summary
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            packets_lost: self.decoder.lost_packets(),
            ..self.stats
        }
    }

    pub fn speech_enabled(&self) -> bool {
        self.hooks.speech.is_enabled()
    }

    /// Start haptics and subscribe to audio, then the button
    ///
    /// A new connection always begins Idle with the toggle counter at zero.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        self.machine.reset();
        self.hooks.is_recording = false;
        self.hooks.recording_started_at = None;

        if self.hooks.haptics.is_none() {
            let sequencer = HapticSequencer::new(Arc::clone(&self.transport), self.start_cue_gap);
            self.hooks.haptics = Some(sequencer.spawn());
        }

        self.arbiter.start().await?;
        info!("recording session started");
        Ok(())
    }

    /// Run the reactor until cancelled
    pub async fn run(&mut self) {
        loop {
            tokio::select! {
                Some(notification) = self.notifications.recv() => {
                    self.handle_notification(notification);
                }
                Some(outcome) = self.arbiter.next_outcome() => {
                    self.handle_pause_outcome(outcome);
                }
                else => break,
            }
        }

        info!("recording session reactor exited");
    }

    fn handle_notification(&mut self, notification: Notification) {
        if notification.characteristic == Characteristic::BUTTON {
            self.handle_button(&notification.data);
        } else if notification.characteristic == Characteristic::AUDIO {
            self.handle_audio(&notification.data);
        } else {
            debug!(characteristic = %notification.characteristic, "unexpected notification");
        }
    }

    fn handle_button(&mut self, raw: &[u8]) {
        self.machine.process(raw, &mut self.hooks);

        if self.arbiter.on_button_raw(raw) {
            self.hooks.emit(SessionEvent::AudioPaused);
        }
    }

    fn handle_audio(&mut self, packet: &[u8]) {
        self.stats.packets_received += 1;

        if !self.hooks.is_recording {
            self.stats.packets_dropped_idle += 1;
            return;
        }

        let pcm = self.decoder.decode(packet);
        if pcm.is_empty() {
            return;
        }

        let len = pcm.len() as u64;
        match self.audio_tx.try_send(pcm) {
            Ok(()) => self.hooks.bytes_received += len,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.chunks_dropped_full += 1;
                warn!(bytes = len, "audio sink full, chunk dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("audio sink closed, chunk dropped");
            }
        }
    }

    fn handle_pause_outcome(&mut self, outcome: PauseOutcome) {
        self.arbiter.on_pause_finished(outcome);
        if outcome.resubscribed {
            self.hooks.emit(SessionEvent::AudioResumed);
        }
    }

    /// Tear everything down within `timeout`
    ///
    /// Every step shares one deadline. The speech worker is joined on the
    /// blocking pool alongside the stream and haptic teardown. Both
    /// subscriptions end up removed and the worker joined even if an
    /// earlier step fails; the first failure is returned.
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;
        if self.hooks.is_recording {
            warn!("session stopped while recording");
        }
        if self.arbiter.is_audio_paused() {
            debug!("detection window open at stop, cancelling it");
        }

        let mut speech = std::mem::replace(&mut self.hooks.speech, SpeechFeedbackWorker::disabled());
        let speech_join = tokio::task::spawn_blocking(move || speech.shutdown(timeout));

        let streams = self.arbiter.stop(deadline.saturating_duration_since(Instant::now())).await;
        debug!(
            audio = ?self.arbiter.audio_state(),
            button = ?self.arbiter.button_state(),
            "subscriptions after stop"
        );

        let haptics = match self.hooks.haptics.take() {
            Some(haptics) => {
                if haptics.shutdown(deadline.saturating_duration_since(Instant::now())).await {
                    Ok(())
                } else {
                    Err(SessionError::HapticTimeout(timeout))
                }
            }
            None => Ok(()),
        };

        let speech = speech_join.await.unwrap_or(Err(FeedbackError::WorkerPanicked));

        info!(stats = ?self.stats(), "recording session stopped");

        streams?;
        haptics?;
        speech?;
        Ok(())
    }
}
