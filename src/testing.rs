//! Test doubles shared by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::ble::{BleTransport, Characteristic, Notification, NotificationSender, TransportError};
use crate::button::{ButtonEvent, ButtonListener, ButtonState};
use crate::feedback::{HapticPattern, SpeechEngine, SpeechError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Discover,
    Subscribe,
    Unsubscribe,
    Write,
}

/// A transport call, recorded when it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Discover(Characteristic),
    Subscribe(Characteristic),
    Unsubscribe(Characteristic),
    Write(Characteristic, Vec<u8>),
}

impl Op {
    pub fn characteristic(&self) -> Characteristic {
        match self {
            Op::Discover(c) | Op::Subscribe(c) | Op::Unsubscribe(c) | Op::Write(c, _) => *c,
        }
    }
}

/// In-memory transport recording every call
pub struct MockTransport {
    ops: Mutex<Vec<(Instant, Op)>>,
    handlers: Mutex<HashMap<Characteristic, NotificationSender>>,
    missing: Mutex<HashSet<Characteristic>>,
    failing: Mutex<HashSet<(OpKind, Characteristic)>>,
    delays: Mutex<HashMap<OpKind, Duration>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            ops: Mutex::default(),
            handlers: Mutex::default(),
            missing: Mutex::default(),
            failing: Mutex::default(),
            delays: Mutex::default(),
        }
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().iter().map(|(_, op)| op.clone()).collect()
    }

    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    pub fn write_times(&self, characteristic: Characteristic) -> Vec<Instant> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, op)| matches!(op, Op::Write(c, _) if *c == characteristic))
            .map(|(at, _)| *at)
            .collect()
    }

    pub fn is_subscribed(&self, characteristic: Characteristic) -> bool {
        self.handlers.lock().unwrap().contains_key(&characteristic)
    }

    pub fn remove_characteristic(&self, characteristic: Characteristic) {
        self.missing.lock().unwrap().insert(characteristic);
    }

    pub fn set_failing(&self, kind: OpKind, characteristic: Characteristic, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert((kind, characteristic));
        } else {
            set.remove(&(kind, characteristic));
        }
    }

    pub fn set_delay(&self, kind: OpKind, delay: Duration) {
        self.delays.lock().unwrap().insert(kind, delay);
    }

    /// Push a notification as the device would
    pub async fn notify(&self, characteristic: Characteristic, data: &[u8]) -> bool {
        let handler = self.handlers.lock().unwrap().get(&characteristic).cloned();
        match handler {
            Some(handler) => handler.send(Notification::new(characteristic, data)).await.is_ok(),
            None => false,
        }
    }

    async fn begin(&self, kind: OpKind, op: Op) -> Result<(), TransportError> {
        let characteristic = op.characteristic();
        self.ops.lock().unwrap().push((Instant::now(), op));

        let delay = self.delays.lock().unwrap().get(&kind).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(&(kind, characteristic)) {
            return Err(TransportError::Rejected {
                op: "mock",
                characteristic,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl BleTransport for MockTransport {
    async fn discover(&self, characteristic: Characteristic) -> Result<bool, TransportError> {
        self.begin(OpKind::Discover, Op::Discover(characteristic)).await?;
        Ok(!self.missing.lock().unwrap().contains(&characteristic))
    }

    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationSender,
    ) -> Result<(), TransportError> {
        self.begin(OpKind::Subscribe, Op::Subscribe(characteristic)).await?;
        self.handlers.lock().unwrap().insert(characteristic, handler);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Characteristic) -> Result<(), TransportError> {
        self.begin(OpKind::Unsubscribe, Op::Unsubscribe(characteristic)).await?;
        self.handlers.lock().unwrap().remove(&characteristic);
        Ok(())
    }

    async fn write(&self, characteristic: Characteristic, data: Vec<u8>) -> Result<(), TransportError> {
        self.begin(OpKind::Write, Op::Write(characteristic, data)).await
    }
}

/// A listener hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    Button(ButtonState),
    Haptic(HapticPattern),
    Start(u64),
    Stop(u64),
}

/// Listener that records hooks in call order
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub hooks: Vec<Hook>,
}

impl RecordingListener {
    pub fn starts(&self) -> usize {
        self.hooks.iter().filter(|h| matches!(h, Hook::Start(_))).count()
    }

    pub fn stops(&self) -> usize {
        self.hooks.iter().filter(|h| matches!(h, Hook::Stop(_))).count()
    }
}

impl ButtonListener for RecordingListener {
    fn on_button_event(&mut self, event: &ButtonEvent) {
        self.hooks.push(Hook::Button(event.state()));
    }

    fn on_haptic(&mut self, pattern: HapticPattern) {
        self.hooks.push(Hook::Haptic(pattern));
    }

    fn on_recording_start(&mut self, toggle_count: u64) {
        self.hooks.push(Hook::Start(toggle_count));
    }

    fn on_recording_stop(&mut self, toggle_count: u64) {
        self.hooks.push(Hook::Stop(toggle_count));
    }
}

/// Speech engine that remembers what it was asked to say
pub struct RecordingSpeechEngine {
    spoken: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl RecordingSpeechEngine {
    pub fn with_log() -> (Self, Arc<Mutex<Vec<String>>>) {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                spoken: Arc::clone(&spoken),
                delay: Duration::ZERO,
            },
            spoken,
        )
    }

    /// Block for `delay` before each phrase is recorded
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl SpeechEngine for RecordingSpeechEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn synthesize_and_play(&mut self, text: &str) -> Result<(), SpeechError> {
        std::thread::sleep(self.delay);
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
