//! Wire frames exchanged between sender and receiver.
//!
//! ```text
//! data frame:  [ seq: u32 ][ payload: B bytes ]
//! ack frame:   [ cumulative ack: i32 ]
//! ```
//!
//! Integers use native byte order; both endpoints are assumed to share an architecture.

use thiserror::Error;

pub mod serial;

pub const SEQ_SIZE: usize = 4;
pub const ACK_SIZE: usize = 4;

/// Cumulative ack value meaning "nothing received yet".
pub const ACK_NONE: i32 = -1;

#[derive(Debug, PartialEq, Eq)]
pub struct DataFrame<'a> {
    pub seq: u32,
    pub payload: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckFrame {
    pub cumulative_ack: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is {actual} bytes, expected {expected}")]
    Size { expected: usize, actual: usize },
}
