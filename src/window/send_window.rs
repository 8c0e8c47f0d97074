//            base    next    base+size
//            v       v       v
// -----------########________--------> seq
//
// #: in transit, unacknowledged
// _: sendable

use std::ops::Range;

/// Result of applying a cumulative ack to a [`SendWindow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    /// The window advanced past `acked` more packets.
    Advanced { acked: u32 },
    /// The ack repeats the last one (`ack == base - 1`); nothing changes.
    Duplicate,
    /// The ack is older than the last one (`ack < base - 1`).
    Stale,
    /// The ack covers packets that were never sent (`ack >= next`).
    Invalid,
}

/// Sender-side window over a finite transfer of `limit` packets.
///
/// Invariants: `base <= next <= limit` and `next - base <= size`. Neither `base` nor `next`
/// ever decrease.
#[derive(Debug)]
pub struct SendWindow {
    base: u32,
    next: u32,
    size: u32,
    limit: u32,
}

impl SendWindow {
    pub fn new(size: u32, limit: u32) -> Self {
        debug_assert!(size > 0, "window size must be at least 1");

        Self {
            base: 0,
            next: 0,
            size,
            limit,
        }
    }

    /// Oldest unacknowledged sequence number.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Next sequence number to transmit for the first time.
    pub fn next(&self) -> u32 {
        self.next
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// True while there is a packet left to send and room for it in the window.
    pub fn can_send(&self) -> bool {
        self.next < self.limit && self.in_flight() < self.size
    }

    pub fn in_flight(&self) -> u32 {
        self.next - self.base
    }

    pub fn unacked(&self) -> Range<u32> {
        self.base..self.next
    }

    pub fn is_complete(&self) -> bool {
        self.base == self.limit
    }

    /// Claims the next sequence number for transmission.
    pub fn mark_sent(&mut self) -> u32 {
        debug_assert!(self.can_send());

        let seq = self.next;
        self.next += 1;

        debug_assert!(self.in_flight() <= self.size);
        seq
    }

    /// Applies a cumulative ack, meaning every packet `<= ack` has been received.
    pub fn acknowledge(&mut self, ack: i32) -> AckOutcome {
        let ack = i64::from(ack);
        let base = i64::from(self.base);

        if ack < base - 1 {
            return AckOutcome::Stale;
        }

        if ack >= i64::from(self.next) {
            return AckOutcome::Invalid;
        }

        if ack == base - 1 {
            return AckOutcome::Duplicate;
        }

        // base - 1 < ack < next, so ack + 1 fits in (base, next]
        let new_base = (ack + 1) as u32;
        let acked = new_base - self.base;

        self.base = new_base;

        AckOutcome::Advanced { acked }
    }
}
