use std::time;

/// The sender's single retransmission timer.
///
/// Times are whole milliseconds relative to an instant chosen by the owner, the same way the
/// sender timestamps everything else.
#[derive(Debug)]
pub struct RetransmitTimer {
    timeout_ms: u64,
    deadline_ms: Option<u64>,
}

impl RetransmitTimer {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            deadline_ms: None,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    /// (Re)starts the timer so that it expires one timeout from `now_ms`.
    pub fn arm(&mut self, now_ms: u64) {
        self.deadline_ms = Some(now_ms + self.timeout_ms);
    }

    /// Starts the timer unless it is already running.
    pub fn arm_if_unarmed(&mut self, now_ms: u64) {
        if self.deadline_ms.is_none() {
            self.arm(now_ms);
        }
    }

    pub fn disarm(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline_ms) => now_ms >= deadline_ms,
            None => false,
        }
    }

    /// Returns the time remaining until the timer expires, or `None` if it is not armed.
    pub fn remaining(&self, now_ms: u64) -> Option<time::Duration> {
        self.deadline_ms
            .map(|deadline_ms| time::Duration::from_millis(deadline_ms.saturating_sub(now_ms)))
    }
}
