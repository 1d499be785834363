//! Transport seam for the BLE link
//!
//! Connecting and service discovery belong to the platform; the daemon
//! only needs to subscribe, unsubscribe and write on an open connection.

use std::future::Future;

use tokio::sync::mpsc;

use super::characteristic::{Characteristic, Notification};

/// Where notifications for a subscription are delivered, in arrival order
pub type NotificationSender = mpsc::Sender<Notification>;

/// Operations on a connected device
pub trait BleTransport: Send + Sync + 'static {
    /// Whether the connected device exposes `characteristic`
    fn discover(
        &self,
        characteristic: Characteristic,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Start notifications, delivering them to `handler`
    fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationSender,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop notifications
    fn unsubscribe(
        &self,
        characteristic: Characteristic,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Write a value (with response)
    fn write(
        &self,
        characteristic: Characteristic,
        data: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Errors raised by a transport
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bridge frame: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{op} on {characteristic} timed out")]
    Timeout {
        op: &'static str,
        characteristic: Characteristic,
    },

    #[error("{op} on {characteristic} rejected: {message}")]
    Rejected {
        op: &'static str,
        characteristic: Characteristic,
        message: String,
    },

    #[error("device disconnected")]
    Disconnected,
}
