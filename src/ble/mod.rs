//! BLE module for the device link
//!
//! Defines the fixed GATT characteristics, the transport seam the rest of
//! the daemon talks to, and a transport that bridges to a platform BLE
//! helper over a Unix socket.

mod bridge;
mod characteristic;
mod protocol;
mod transport;

pub use bridge::{BridgeListener, BridgeTransport};
pub use characteristic::{Characteristic, Notification};
pub use transport::{BleTransport, NotificationSender, TransportError};
