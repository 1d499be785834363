//! Spoken feedback worker
//!
//! Speech synthesis blocks for as long as playback lasts, so it runs on a
//! dedicated thread fed by a FIFO queue. Notification handling only ever
//! enqueues.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::speech::{SpeechCapability, SpeechEngine};

/// Spoken when recording starts
pub const RECORDING_STARTED_PHRASE: &str = "Recording started";

/// Spoken when recording stops
pub const RECORDING_STOPPED_PHRASE: &str = "Recording stopped";

enum WorkerCommand {
    Speak(String),
    Shutdown,
}

struct Running {
    tx: mpsc::Sender<WorkerCommand>,
    /// Never sent on; disconnects when the thread exits
    done_rx: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

/// Serializes spoken feedback off the notification path
pub struct SpeechFeedbackWorker {
    running: Option<Running>,
    enabled: bool,
}

impl SpeechFeedbackWorker {
    /// Start the worker thread, or a no-op sink if speech is unavailable
    pub fn start(capability: SpeechCapability) -> Result<Self, FeedbackError> {
        let engine = match capability {
            SpeechCapability::Available(engine) => engine,
            SpeechCapability::Disabled { reason } => {
                info!(%reason, "spoken feedback unavailable");
                return Ok(Self::disabled());
            }
        };

        let (tx, rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("speech-feedback".to_string())
            .spawn(move || {
                let _done = done_tx;
                run_worker(engine, rx);
            })
            .map_err(|e| FeedbackError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            running: Some(Running { tx, done_rx, thread }),
            enabled: true,
        })
    }

    /// A worker that accepts messages and never speaks
    pub fn disabled() -> Self {
        Self {
            running: None,
            enabled: false,
        }
    }

    /// Whether enqueued text is actually spoken
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queue text for speaking; never blocks
    pub fn enqueue(&self, text: impl Into<String>) {
        let Some(running) = &self.running else {
            return;
        };

        if running.tx.send(WorkerCommand::Speak(text.into())).is_err() {
            debug!("speech worker gone, message dropped");
        }
    }

    /// Drain queued messages and stop the thread, waiting at most `timeout`
    ///
    /// Safe to call more than once.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), FeedbackError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.tx.send(WorkerCommand::Shutdown);

        match running.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "speech worker did not stop in time");
                return Err(FeedbackError::ShutdownTimeout(timeout));
            }
        }

        running.thread.join().map_err(|_| FeedbackError::WorkerPanicked)?;
        info!("speech worker stopped");
        Ok(())
    }
}

impl Drop for SpeechFeedbackWorker {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            let _ = running.tx.send(WorkerCommand::Shutdown);
        }
    }
}

fn run_worker(mut engine: Box<dyn SpeechEngine>, rx: mpsc::Receiver<WorkerCommand>) {
    info!(engine = engine.name(), "speech worker started");

    while let Ok(command) = rx.recv() {
        match command {
            WorkerCommand::Speak(text) => {
                debug!(%text, "speaking");
                if let Err(e) = engine.synthesize_and_play(&text) {
                    warn!(?e, "speech synthesis failed");
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }
}

/// Errors surfaced by the feedback worker
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("failed to spawn speech worker thread: {0}")]
    ThreadSpawn(String),

    #[error("speech worker did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("speech worker panicked")]
    WorkerPanicked,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::SpeechError;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeEngine {
        spoken: Arc<Mutex<Vec<String>>>,
        delay: Duration,
        fail_on: Option<String>,
        panic_on: Option<String>,
    }

    impl SpeechEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        fn synthesize_and_play(&mut self, text: &str) -> Result<(), SpeechError> {
            if self.panic_on.as_deref() == Some(text) {
                panic!("engine crashed");
            }
            thread::sleep(self.delay);
            if self.fail_on.as_deref() == Some(text) {
                return Err(SpeechError::Spawn {
                    program: "fake".to_string(),
                    source: std::io::Error::other("boom"),
                });
            }
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn start(engine: FakeEngine) -> SpeechFeedbackWorker {
        SpeechFeedbackWorker::start(SpeechCapability::Available(Box::new(engine))).unwrap()
    }

    #[test]
    fn test_messages_spoken_in_order_before_shutdown() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut worker = start(FakeEngine {
            spoken: Arc::clone(&spoken),
            delay: Duration::from_millis(5),
            ..Default::default()
        });

        assert!(worker.is_enabled());
        worker.enqueue(RECORDING_STARTED_PHRASE);
        worker.enqueue(RECORDING_STOPPED_PHRASE);
        worker.enqueue("third");
        worker.shutdown(Duration::from_secs(5)).unwrap();

        assert_eq!(
            *spoken.lock().unwrap(),
            vec![RECORDING_STARTED_PHRASE, RECORDING_STOPPED_PHRASE, "third"]
        );
    }

    #[test]
    fn test_disabled_worker_is_noop() {
        let mut worker = SpeechFeedbackWorker::start(SpeechCapability::Disabled {
            reason: "test".to_string(),
        })
        .unwrap();

        assert!(!worker.is_enabled());
        worker.enqueue("ignored");
        worker.shutdown(Duration::from_millis(10)).unwrap();
    }

    #[test]
    fn test_engine_failure_does_not_stop_worker() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut worker = start(FakeEngine {
            spoken: Arc::clone(&spoken),
            fail_on: Some("bad".to_string()),
            ..Default::default()
        });

        worker.enqueue("bad");
        worker.enqueue("good");
        worker.shutdown(Duration::from_secs(5)).unwrap();

        assert_eq!(*spoken.lock().unwrap(), vec!["good"]);
    }

    #[test]
    fn test_shutdown_timeout_is_reported() {
        let mut worker = start(FakeEngine {
            delay: Duration::from_millis(500),
            ..Default::default()
        });

        worker.enqueue("slow");
        let err = worker.shutdown(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, FeedbackError::ShutdownTimeout(_)));
    }

    #[test]
    fn test_panicking_engine_is_reported() {
        let mut worker = start(FakeEngine {
            panic_on: Some("crash".to_string()),
            ..Default::default()
        });

        worker.enqueue("crash");
        let err = worker.shutdown(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, FeedbackError::WorkerPanicked));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_later_messages_dropped() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut worker = start(FakeEngine {
            spoken: Arc::clone(&spoken),
            ..Default::default()
        });

        worker.shutdown(Duration::from_secs(5)).unwrap();
        worker.enqueue("late");
        worker.shutdown(Duration::from_secs(5)).unwrap();

        assert!(spoken.lock().unwrap().is_empty());
    }
}
