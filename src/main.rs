//! omi-buttond: Background daemon for the Omi wearable's recording button
//!
//! The daemon talks to the device through a platform BLE helper and provides:
//! - Long press detection on the button characteristic
//! - Recording toggles with haptic and spoken feedback
//! - Audio pausing while a press is being detected
//! - WAV files for every recording
//!
//! Scanning, pairing and reconnection belong to the helper.

mod ble;
mod button;
mod config;
mod events;
mod feedback;
mod lifecycle;
mod session;
mod stream;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::ble::BridgeListener;
use crate::config::Config;
use crate::events::SessionEvent;
use crate::feedback::{SpeechCapability, SpeechFeedbackWorker};
use crate::lifecycle::ShutdownSignal;
use crate::session::{AudioDecoder, PcmPacketDecoder, RecordingSession, SessionOptions, WavRecorder};

/// Decoded chunks buffered ahead of the recorder
const AUDIO_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "omi-buttond starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.recordings_dir, "configuration loaded");

    // Registered early so a signal during setup is not lost
    let mut shutdown = ShutdownSignal::new()?;

    // Speech runs on its own thread; a missing engine leaves a no-op worker
    let speech = SpeechFeedbackWorker::start(SpeechCapability::detect(config.speech_feedback))?;

    let listener = BridgeListener::bind(&config.socket_path)?;
    info!("waiting for BLE helper");

    let transport = tokio::select! {
        result = listener.accept(config.request_timeout) => Arc::new(result?),
        _ = shutdown.wait() => {
            info!("shutdown signal received before helper connected");
            return Ok(());
        }
    };

    // Session -> recorder
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    let (audio_tx, audio_rx) = mpsc::channel(AUDIO_BUFFER);

    let recorder = WavRecorder::new(&config.recordings_dir, config.sample_rate);
    let recorder_task = tokio::spawn(recorder.run(event_tx.subscribe(), audio_rx));

    // The helper forwards raw PCM frames; Opus packets are not decoded
    let decoder = PcmPacketDecoder::new();
    info!(decoder = decoder.name(), sample_rate = config.sample_rate, "audio decoder selected");

    let mut session = RecordingSession::new(
        Arc::clone(&transport),
        decoder,
        speech,
        audio_tx,
        event_tx.clone(),
        SessionOptions::from(&config),
    );

    info!(speech = session.speech_enabled(), "spoken feedback");

    let started = session.start().await;
    match &started {
        Ok(()) => {
            info!("daemon initialized, entering main loop");

            tokio::select! {
                _ = session.run() => {
                    info!("session reactor exited");
                }

                _ = transport.closed() => {
                    warn!("BLE helper disconnected");
                }

                _ = shutdown.wait() => {
                    info!("shutdown signal received");
                }
            }
        }
        Err(e) => {
            error!(?e, "failed to subscribe to device notifications");
        }
    }

    // Cleanup
    info!("shutting down...");

    if session.is_recording() {
        warn!(
            started_at = ?session.recording_started_at(),
            bytes = session.bytes_received(),
            "daemon stopping mid-recording, file will be finalized as is"
        );
    }
    if let Err(e) = session.stop(config.shutdown_timeout).await {
        error!(?e, "session did not stop cleanly");
    }
    info!(
        toggles = session.toggle_count(),
        state = ?session.recording_state(),
        last = ?session.last_summary(),
        "session summary"
    );

    // Closing the event channel lets the recorder finalize its file
    drop(session);
    drop(event_tx);
    if tokio::time::timeout(config.shutdown_timeout, recorder_task).await.is_err() {
        warn!("recorder did not finish in time");
    }

    drop(listener);
    info!("omi-buttond stopped");

    started.map_err(Into::into)
}
