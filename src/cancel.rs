use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Error;

/// Cooperative cancellation for a running transfer.
///
/// Clones share one flag. Senders and receivers check it each time they are about to block, and
/// return [`crate::Error::Cancelled`] once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Converts a transport failure into a session error. A cancelled peer may close its end before
/// the local flag is seen, so a set flag wins over the transport error.
pub(crate) fn transport_failure(cancel: Option<&CancelToken>, err: io::Error) -> Error {
    match cancel {
        Some(token) if token.is_cancelled() => Error::Cancelled,
        _ => Error::Transport(err),
    }
}
