//! Audio packet decoding
//!
//! The codec sits outside the daemon; this is the seam it plugs into, plus
//! the decoder for the device's uncompressed 16-bit PCM mode.

/// Bytes of per-packet header: packet index (u16 LE) and sub-frame index
pub const PACKET_HEADER_LEN: usize = 3;

/// Turns one audio notification into PCM
pub trait AudioDecoder: Send {
    /// Codec name for logs
    fn name(&self) -> &str;

    /// Decoded PCM, or empty when there is nothing to forward
    fn decode(&mut self, packet: &[u8]) -> Vec<u8>;

    /// Packets known to be missing so far
    fn lost_packets(&self) -> u64 {
        0
    }
}

/// Strips the packet header from 16-bit PCM notifications
#[derive(Debug, Default)]
pub struct PcmPacketDecoder {
    last_index: Option<u16>,
    gaps: u64,
}

impl PcmPacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioDecoder for PcmPacketDecoder {
    fn name(&self) -> &str {
        "pcm16"
    }

    fn decode(&mut self, packet: &[u8]) -> Vec<u8> {
        let Some(payload) = packet.get(PACKET_HEADER_LEN..) else {
            return Vec::new();
        };

        if payload.is_empty() || payload.len() % 2 != 0 {
            return Vec::new();
        }

        let index = u16::from_le_bytes([packet[0], packet[1]]);
        if let Some(last) = self.last_index {
            let missed = index.wrapping_sub(last).wrapping_sub(1);
            // A restarted sequence after a detection window reads as a huge jump
            if missed > 0 && missed < u16::MAX / 2 {
                self.gaps += u64::from(missed);
            }
        }
        self.last_index = Some(index);

        payload.to_vec()
    }

    fn lost_packets(&self) -> u64 {
        self.gaps
    }
}
