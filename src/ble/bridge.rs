//! Unix domain socket bridge to the platform BLE helper
//!
//! The helper owns scanning, connecting and the OS Bluetooth stack. The
//! daemon drives it with correlated requests and receives notifications
//! on the same connection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::characteristic::{Characteristic, Notification};
use super::protocol::{read_frame, write_frame, BridgeMessage, Operation, Request};
use super::transport::{BleTransport, NotificationSender, TransportError};

type Pending = Arc<StdMutex<HashMap<u64, oneshot::Sender<Reply>>>>;
type Handlers = Arc<StdMutex<HashMap<Characteristic, NotificationSender>>>;

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Reply {
    ok: bool,
    discovered: bool,
    message: Option<String>,
}

/// Listening socket the helper connects to
pub struct BridgeListener {
    socket_path: PathBuf,
    listener: UnixListener,
}

impl BridgeListener {
    /// Bind the bridge socket, replacing a stale one
    pub fn bind(socket_path: &Path) -> Result<Self, TransportError> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)?;

        // Owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(?socket_path, "bridge socket listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
        })
    }

    /// Wait for the helper to connect
    pub async fn accept(&self, request_timeout: Duration) -> Result<BridgeTransport, TransportError> {
        let (stream, _addr) = self.listener.accept().await?;
        info!("BLE helper connected");
        Ok(BridgeTransport::from_stream(stream, request_timeout))
    }
}

impl Drop for BridgeListener {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove bridge socket");
            }
        }
    }
}

/// `BleTransport` backed by a helper connection
pub struct BridgeTransport {
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    handlers: Handlers,
    next_id: AtomicU64,
    request_timeout: Duration,
    closed: watch::Receiver<bool>,
    reader: JoinHandle<()>,
}

impl BridgeTransport {
    /// Wrap an established helper connection
    pub fn from_stream(stream: UnixStream, request_timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::default();
        let handlers: Handlers = Arc::default();
        let (closed_tx, closed) = watch::channel(false);

        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&pending),
            Arc::clone(&handlers),
            closed_tx,
        ));

        Self {
            writer: Mutex::new(write_half),
            pending,
            handlers,
            next_id: AtomicU64::new(1),
            request_timeout,
            closed,
            reader,
        }
    }

    /// Resolves once the helper connection or the device link is gone
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|c| *c).await;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn request(&self, characteristic: Characteristic, op: Operation) -> Result<Reply, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }

        let op_name = op.name();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending).insert(id, reply_tx);
        if self.is_closed() {
            lock(&self.pending).remove(&id);
            return Err(TransportError::Disconnected);
        }

        let frame = serde_json::to_vec(&Request { id, characteristic, op })?;
        let written = {
            let mut writer = self.writer.lock().await;
            write_frame(&mut *writer, &frame).await
        };
        if let Err(e) = written {
            lock(&self.pending).remove(&id);
            return Err(e.into());
        }

        debug!(id, op = op_name, %characteristic, "bridge request sent");

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(TransportError::Timeout {
                    op: op_name,
                    characteristic,
                })
            }
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Ok(Ok(reply)) if reply.ok => Ok(reply),
            Ok(Ok(reply)) => Err(TransportError::Rejected {
                op: op_name,
                characteristic,
                message: reply.message.unwrap_or_else(|| "no reason given".to_string()),
            }),
        }
    }
}

impl BleTransport for BridgeTransport {
    async fn discover(&self, characteristic: Characteristic) -> Result<bool, TransportError> {
        let reply = self.request(characteristic, Operation::Discover).await?;
        Ok(reply.discovered)
    }

    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationSender,
    ) -> Result<(), TransportError> {
        // Registered first so notifications racing the response are kept
        lock(&self.handlers).insert(characteristic, handler);

        let result = self.request(characteristic, Operation::Subscribe).await;
        if result.is_err() {
            lock(&self.handlers).remove(&characteristic);
        }
        result.map(|_| ())
    }

    async fn unsubscribe(&self, characteristic: Characteristic) -> Result<(), TransportError> {
        // Dropped first so nothing is delivered once unsubscribe begins
        lock(&self.handlers).remove(&characteristic);
        self.request(characteristic, Operation::Unsubscribe).await.map(|_| ())
    }

    async fn write(&self, characteristic: Characteristic, data: Vec<u8>) -> Result<(), TransportError> {
        self.request(characteristic, Operation::Write { data }).await.map(|_| ())
    }
}

impl Drop for BridgeTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: Pending,
    handlers: Handlers,
    closed_tx: watch::Sender<bool>,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("BLE helper disconnected");
                break;
            }
            Err(e) => {
                warn!(?e, "bridge read error");
                break;
            }
        };

        let message: BridgeMessage = match serde_json::from_slice(&frame) {
            Ok(message) => message,
            Err(e) => {
                warn!(?e, "ignoring malformed bridge frame");
                continue;
            }
        };

        match message {
            BridgeMessage::Response {
                id,
                ok,
                discovered,
                message,
            } => {
                let reply_tx = lock(&pending).remove(&id);
                match reply_tx {
                    Some(reply_tx) => {
                        let _ = reply_tx.send(Reply { ok, discovered, message });
                    }
                    None => debug!(id, "response for unknown or expired request"),
                }
            }
            BridgeMessage::Notification { characteristic, data } => {
                let handler = lock(&handlers).get(&characteristic).cloned();
                let Some(handler) = handler else {
                    debug!(%characteristic, "notification without subscriber dropped");
                    continue;
                };
                if handler.send(Notification::new(characteristic, data)).await.is_err() {
                    debug!(%characteristic, "notification receiver gone, dropping handler");
                    lock(&handlers).remove(&characteristic);
                }
            }
            BridgeMessage::Disconnected { reason } => {
                warn!(?reason, "device disconnected");
                break;
            }
        }
    }

    let _ = closed_tx.send(true);
    // Waiters see a closed reply channel and report Disconnected
    lock(&pending).clear();
    lock(&handlers).clear();
}
