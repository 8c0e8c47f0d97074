use super::frame;
use super::window::ReceiveRecord;
use super::Error;
use super::Result;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const DATAGRAM_SIZE_MAX: usize = 65_507;

/// Upper bound on the memory a session's receive record may need: one slot per packet plus every
/// payload, `packet_count * (ReceiveRecord::SLOT_SIZE + payload_size)`.
pub const SESSION_BYTES_MAX: usize = 1 << 30;

/// Parameters both endpoints agree on before a transfer begins.
///
/// Negotiating these is not part of the protocol; the sender and receiver must be constructed
/// with identical values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionParams {
    /// Total number of packets `N`, numbered `0..N`.
    ///
    /// Minimum value: 1 \
    /// Maximum value: `i32::MAX`
    pub packet_count: u32,

    /// Sliding window size `W`, in packets.
    ///
    /// Minimum value: 1
    pub window_size: u32,

    /// Fixed payload size `B` of every packet, in bytes.
    ///
    /// Minimum value: 1 \
    /// Maximum value: 65,503
    pub payload_size: usize,
}

impl SessionParams {
    pub fn new(packet_count: u32, window_size: u32, payload_size: usize) -> Self {
        Self {
            packet_count,
            window_size,
            payload_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.packet_count == 0 {
            return Err(Error::Config("packet_count must be at least 1".into()));
        }

        // Cumulative acks are 32-bit signed on the wire
        if self.packet_count > i32::MAX as u32 {
            return Err(Error::Config(format!(
                "packet_count must not exceed {}",
                i32::MAX
            )));
        }

        if self.window_size == 0 {
            return Err(Error::Config("window_size must be at least 1".into()));
        }

        if self.payload_size == 0 {
            return Err(Error::Config("payload_size must be at least 1".into()));
        }

        if self.frame_size() > DATAGRAM_SIZE_MAX {
            return Err(Error::Config(format!(
                "payload_size must not exceed {}",
                DATAGRAM_SIZE_MAX - frame::SEQ_SIZE
            )));
        }

        match self.record_bytes() {
            Some(total) if total <= SESSION_BYTES_MAX => Ok(()),
            _ => Err(Error::Config(format!(
                "packet_count * ({} + payload_size) must not exceed {} bytes",
                ReceiveRecord::SLOT_SIZE,
                SESSION_BYTES_MAX
            ))),
        }
    }

    /// Most memory the receiving side holds for this session, or `None` on overflow.
    pub fn record_bytes(&self) -> Option<usize> {
        (self.packet_count as usize).checked_mul(ReceiveRecord::SLOT_SIZE + self.payload_size)
    }

    /// Size of one encoded data frame.
    pub fn frame_size(&self) -> usize {
        frame::SEQ_SIZE + self.payload_size
    }

    /// Sequence number of the final packet, as a cumulative ack value.
    pub fn last_seq(&self) -> i32 {
        self.packet_count as i32 - 1
    }
}
