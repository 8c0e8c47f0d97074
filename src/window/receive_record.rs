use super::Window;

use crate::frame::ACK_NONE;

#[derive(Debug)]
enum Slot {
    Empty,
    Buffered(Box<[u8]>),
    Delivered,
}

/// Outcome of offering a packet to a [`ReceiveRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// Newly received; `delivered` payloads were handed over in order as a result.
    Accepted { delivered: u32 },
    /// Inside the window but already buffered.
    Repeated,
    /// At or below the cumulative ack; already delivered.
    Behind,
    /// At or beyond `cumulative_ack + 1 + window_size`.
    Ahead,
    /// Not a sequence number of this session.
    OutOfRange,
}

impl Acceptance {
    /// Whether the packet passed the window test and so warrants an ack.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. } | Self::Repeated)
    }
}

/// Receiver-side record of a finite transfer.
///
/// Holds one slot per sequence number in `0..packet_count`. Packets that arrive ahead of the
/// cumulative ack are buffered until the gap before them fills, then handed over in order.
#[derive(Debug)]
pub struct ReceiveRecord {
    slots: Box<[Slot]>,
    cumulative_ack: i32,
    window_size: u32,
}

impl ReceiveRecord {
    /// Bookkeeping bytes allocated per sequence number up front, before any payload is stored.
    pub const SLOT_SIZE: usize = std::mem::size_of::<Slot>();

    pub fn new(packet_count: u32, window_size: u32) -> Self {
        debug_assert!(packet_count <= i32::MAX as u32);
        debug_assert!(window_size > 0);

        Self {
            slots: (0..packet_count).map(|_| Slot::Empty).collect(),
            cumulative_ack: ACK_NONE,
            window_size,
        }
    }

    /// Largest `k` such that every packet in `0..=k` has been received, or -1.
    pub fn cumulative_ack(&self) -> i32 {
        self.cumulative_ack
    }

    pub fn packet_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// The sequence numbers currently acceptable: `[cumulative_ack + 1, cumulative_ack + 1 + W)`.
    pub fn window(&self) -> Window {
        Window::new((self.cumulative_ack + 1) as u32, self.window_size)
    }

    pub fn is_complete(&self) -> bool {
        self.cumulative_ack == self.slots.len() as i32 - 1
    }

    pub fn is_received(&self, seq: u32) -> bool {
        match self.slots.get(seq as usize) {
            Some(Slot::Empty) | None => false,
            Some(_) => true,
        }
    }

    /// Classifies `seq` against the current window without changing anything.
    pub fn classify(&self, seq: u32) -> Acceptance {
        if i64::from(seq) <= i64::from(self.cumulative_ack) {
            Acceptance::Behind
        } else if seq as usize >= self.slots.len() {
            Acceptance::OutOfRange
        } else if !self.window().contains(seq) {
            Acceptance::Ahead
        } else if self.is_received(seq) {
            Acceptance::Repeated
        } else {
            Acceptance::Accepted { delivered: 0 }
        }
    }

    /// Offers a packet to the record. Payloads are passed to `deliver` strictly in sequence
    /// order, each exactly once, as the cumulative ack advances over them.
    pub fn receive<F>(&mut self, seq: u32, payload: &[u8], mut deliver: F) -> Acceptance
    where
        F: FnMut(u32, &[u8]),
    {
        match self.classify(seq) {
            Acceptance::Accepted { .. } => (),
            other => return other,
        }

        let mut delivered = 0;

        if seq == self.window().base {
            // Expected next, no need to buffer
            deliver(seq, payload);
            self.slots[seq as usize] = Slot::Delivered;
            self.cumulative_ack += 1;
            delivered += 1;

            delivered += self.drain_in_order(&mut deliver);
        } else {
            self.slots[seq as usize] = Slot::Buffered(payload.into());
        }

        Acceptance::Accepted { delivered }
    }

    fn drain_in_order<F>(&mut self, deliver: &mut F) -> u32
    where
        F: FnMut(u32, &[u8]),
    {
        let mut delivered = 0;

        loop {
            let next = (self.cumulative_ack + 1) as usize;

            let Some(slot) = self.slots.get_mut(next) else {
                break;
            };

            match std::mem::replace(slot, Slot::Delivered) {
                Slot::Buffered(payload) => {
                    deliver(next as u32, &payload);
                    self.cumulative_ack += 1;
                    delivered += 1;
                }
                other => {
                    *slot = other;
                    break;
                }
            }
        }

        delivered
    }
}
