//! Bridge message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::characteristic::Characteristic;

/// Largest frame either side will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// GATT operation requested from the helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Does the connected device expose the characteristic?
    Discover,
    /// Start notifications
    Subscribe,
    /// Stop notifications
    Unsubscribe,
    /// Write with response
    Write { data: Vec<u8> },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Discover => "discover",
            Operation::Subscribe => "subscribe",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Write { .. } => "write",
        }
    }
}

/// Request from daemon to helper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlates the helper's response
    pub id: u64,

    pub characteristic: Characteristic,

    #[serde(flatten)]
    pub op: Operation,
}

/// Messages from helper to daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Outcome of a request
    Response {
        id: u64,
        ok: bool,
        /// Only meaningful for `discover`
        #[serde(default)]
        discovered: bool,
        #[serde(default)]
        message: Option<String>,
    },

    /// Characteristic value pushed by the device
    Notification {
        characteristic: Characteristic,
        data: Vec<u8>,
    },

    /// The device link dropped
    Disconnected {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Read one length-prefixed frame
///
/// Returns `Ok(None)` on a clean EOF before the length prefix.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Write one length-prefixed frame
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds limit", payload.len()),
        ));
    }

    let msg_len = (payload.len() as u32).to_le_bytes();
    writer.write_all(&msg_len).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}
