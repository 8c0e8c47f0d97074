use thiserror::Error;

/// Terminal failures of a transfer session.
///
/// Ordinary datagram loss never shows up here. It is recovered by retransmission and only
/// visible in the counters of [`crate::SendReport`] / [`crate::ReceiveReport`].
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration or session parameter failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A block handed to the sender does not match the agreed payload size.
    #[error("block {seq} is {len} bytes, expected {expected}")]
    PayloadSize { seq: u32, len: usize, expected: usize },

    /// The number of blocks handed to the sender does not match the agreed packet count.
    #[error("got {count} blocks, expected {expected}")]
    BlockCount { count: usize, expected: u32 },

    /// The configured retransmission ceiling was reached without acknowledgment progress.
    #[error("packet {seq} still unacknowledged after {attempts} consecutive timeouts")]
    RetransmitLimit { seq: u32, attempts: u64 },

    /// The receiver heard nothing for the configured idle period.
    #[error("no datagram received for {idle_ms}ms")]
    IdleTimeout { idle_ms: u64 },

    /// The session's cancel token was triggered.
    #[error("transfer cancelled")]
    Cancelled,

    /// The underlying transport failed in a way that cannot be recovered.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
