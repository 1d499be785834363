//! Audio/button stream arbitration
//!
//! Audio and button notifications share one radio link. When a long press
//! starts, the audio subscription is dropped for a fixed detection window
//! so the button's follow-up notifications are not starved, then restored.
//!
//! The pause cycle runs on its own task and reports back through a channel;
//! all subscription bookkeeping stays with the owner of the arbiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::{BleTransport, Characteristic, NotificationSender, TransportError};
use crate::button::{decode_state, ButtonState};

/// Default length of the detection window
pub const DEFAULT_DETECTION_WINDOW: Duration = Duration::from_millis(1500);

/// Local view of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribed,
    /// Deliberately dropped for a detection window
    Paused,
}

/// Result of a pause cycle, reported to the arbiter's owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseOutcome {
    /// The audio unsubscribe succeeded
    pub unsubscribed: bool,
    /// Audio notifications were restored
    pub resubscribed: bool,
}

/// Errors surfaced when tearing the streams down
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("stream teardown did not finish within {0:?}")]
    StopTimeout(Duration),
}

/// Owns the audio and button subscriptions
pub struct StreamArbiter<T> {
    transport: Arc<T>,
    handler: NotificationSender,
    detection_window: Duration,
    audio: SubscriptionState,
    button: SubscriptionState,
    running: bool,
    audio_paused: bool,
    pause_task: Option<JoinHandle<()>>,
    outcome_tx: mpsc::UnboundedSender<PauseOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<PauseOutcome>,
}

impl<T: BleTransport> StreamArbiter<T> {
    /// `handler` receives notifications from both characteristics
    pub fn new(transport: Arc<T>, handler: NotificationSender, detection_window: Duration) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            handler,
            detection_window,
            audio: SubscriptionState::Unsubscribed,
            button: SubscriptionState::Unsubscribed,
            running: false,
            audio_paused: false,
            pause_task: None,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn audio_state(&self) -> SubscriptionState {
        self.audio
    }

    pub fn button_state(&self) -> SubscriptionState {
        self.button
    }

    pub fn is_audio_paused(&self) -> bool {
        self.audio_paused
    }

    /// Subscribe audio, then the button
    ///
    /// Audio must be live before button detection begins so nothing is lost
    /// during setup. A device without the button service is tolerated.
    pub async fn start(&mut self) -> Result<(), TransportError> {
        self.transport
            .subscribe(Characteristic::AUDIO, self.handler.clone())
            .await?;
        self.audio = SubscriptionState::Subscribed;
        self.running = true;
        info!("audio notifications started");

        if !self.transport.discover(Characteristic::BUTTON).await? {
            warn!("button characteristic not found, continuing with audio only");
            return Ok(());
        }

        self.transport
            .subscribe(Characteristic::BUTTON, self.handler.clone())
            .await?;
        self.button = SubscriptionState::Subscribed;
        info!("button notifications started");

        Ok(())
    }

    /// Inspect a raw button payload and open a detection window on a start
    ///
    /// Never waits: the pause cycle runs in the background. A start arriving
    /// while a window is open is ignored here. Returns whether a window opened.
    pub fn on_button_raw(&mut self, raw: &[u8]) -> bool {
        if decode_state(raw) != Some(ButtonState::LongPressStart) {
            return false;
        }

        if !self.running {
            debug!("streams stopped, not pausing audio");
            return false;
        }

        if self.audio_paused {
            debug!("detection window already open");
            return false;
        }

        self.audio_paused = true;
        self.audio = SubscriptionState::Paused;

        let transport = Arc::clone(&self.transport);
        let handler = self.handler.clone();
        let window = self.detection_window;
        let outcome_tx = self.outcome_tx.clone();

        self.pause_task = Some(tokio::spawn(async move {
            let outcome = pause_cycle(transport, handler, window).await;
            let _ = outcome_tx.send(outcome);
        }));
        true
    }

    /// Next completed pause cycle
    pub async fn next_outcome(&mut self) -> Option<PauseOutcome> {
        self.outcome_rx.recv().await
    }

    /// Apply a completed pause cycle
    ///
    /// The pause flag is cleared whatever happened, so a failed cycle never
    /// disables later detection windows.
    pub fn on_pause_finished(&mut self, outcome: PauseOutcome) {
        if !self.running {
            debug!(?outcome, "pause outcome after stop ignored");
            return;
        }

        self.audio_paused = false;
        self.pause_task = None;

        if outcome.resubscribed {
            self.audio = SubscriptionState::Subscribed;
        } else {
            self.audio = SubscriptionState::Unsubscribed;
            warn!("audio notifications not restored, next long press will retry");
        }
    }

    /// Tear down both subscriptions
    ///
    /// An in-flight pause cycle is cancelled first; since it may have been
    /// anywhere between unsubscribe and resubscribe, audio is unsubscribed
    /// unconditionally afterwards.
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), ArbiterError> {
        let deadline = Instant::now() + timeout;
        let pause_in_flight = self.pause_task.is_some();
        self.running = false;

        if let Some(task) = self.pause_task.take() {
            task.abort();
            let _ = tokio::time::timeout_at(deadline, task).await;
            debug!("pause cycle cancelled");
        }
        self.audio_paused = false;

        let mut timed_out = false;

        if pause_in_flight || self.audio != SubscriptionState::Unsubscribed {
            timed_out |= !self.teardown(Characteristic::AUDIO, deadline).await;
        }
        self.audio = SubscriptionState::Unsubscribed;

        if self.button != SubscriptionState::Unsubscribed {
            timed_out |= !self.teardown(Characteristic::BUTTON, deadline).await;
        }
        self.button = SubscriptionState::Unsubscribed;

        info!("streams stopped");

        if timed_out {
            Err(ArbiterError::StopTimeout(timeout))
        } else {
            Ok(())
        }
    }

    /// Returns `false` only if the deadline passed
    async fn teardown(&self, characteristic: Characteristic, deadline: Instant) -> bool {
        match tokio::time::timeout_at(deadline, self.transport.unsubscribe(characteristic)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(?e, %characteristic, "unsubscribe failed during stop");
                true
            }
            Err(_) => {
                warn!(%characteristic, "unsubscribe timed out during stop");
                false
            }
        }
    }
}

impl<T> Drop for StreamArbiter<T> {
    fn drop(&mut self) {
        if let Some(task) = self.pause_task.take() {
            task.abort();
        }
    }
}

async fn pause_cycle<T: BleTransport>(
    transport: Arc<T>,
    handler: NotificationSender,
    window: Duration,
) -> PauseOutcome {
    let unsubscribed = match transport.unsubscribe(Characteristic::AUDIO).await {
        Ok(()) => {
            info!(window_ms = window.as_millis() as u64, "audio paused for button detection");
            true
        }
        Err(e) => {
            warn!(?e, "failed to pause audio");
            false
        }
    };

    tokio::time::sleep(window).await;

    // Attempted even if the unsubscribe failed; subscribing twice is harmless
    let resubscribed = match transport.subscribe(Characteristic::AUDIO, handler).await {
        Ok(()) => {
            info!("audio resumed");
            true
        }
        Err(e) => {
            warn!(?e, "failed to resume audio");
            false
        }
    };

    PauseOutcome {
        unsubscribed,
        resubscribed,
    }
}
