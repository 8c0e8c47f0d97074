//! Sequence and window arithmetic shared by both endpoints.
//!
//! ```text
//!              base          next          base+size
//!              v             v             v
//! sender:  ****###############_____________--------> seq
//!
//!              cum+1                       cum+1+size
//!              v                           v
//! receiver: ***_ _ # _ # # _ _ _ _ _ _ _ _ --------> seq
//!
//! *: acknowledged
//! #: in transit (sender) / buffered (receiver)
//! _: sendable (sender) / acceptable (receiver)
//! ```

mod receive_record;
mod send_window;

pub use receive_record::{Acceptance, ReceiveRecord};
pub use send_window::{AckOutcome, SendWindow};

/// A half-open range `[base, base + size)` of sequence numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub base: u32,
    pub size: u32,
}

impl Window {
    pub fn new(base: u32, size: u32) -> Self {
        Self { base, size }
    }

    pub fn contains(&self, seq: u32) -> bool {
        seq >= self.base && u64::from(seq) < self.end()
    }

    /// One past the last sequence number in the window. Widened so that `base + size` cannot
    /// overflow.
    pub fn end(&self) -> u64 {
        u64::from(self.base) + u64::from(self.size)
    }
}
