use std::time;

use tracing::{debug, info, trace, warn};

use super::cancel::{self, CancelToken};
use super::frame::{AckFrame, DataFrame, FrameError};
use super::session::SessionParams;
use super::timer::RetransmitTimer;
use super::transport::Transport;
use super::window::{AckOutcome, SendWindow};
use super::Error;
use super::Result;

const TIMEOUT_DEFAULT_MS: u64 = 1_500;
const TIMEOUT_MIN_MS: u64 = 1;

const CANCEL_POLL_DEFAULT_MS: u64 = 100;
const CANCEL_POLL_MIN_MS: u64 = 1;

/// Which packets are resent when the retransmission timer expires.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetransmitPolicy {
    /// Resend only the oldest unacknowledged packet.
    #[default]
    Oldest,
    /// Resend every unacknowledged packet.
    GoBackN,
}

/// Configuration for a [`Sender`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Time to wait for acknowledgment progress before retransmitting, in milliseconds.
    ///
    /// Minimum value: 1 \
    /// Default value: 1,500
    pub timeout_ms: u64,

    /// Default value: [`RetransmitPolicy::Oldest`]
    pub retransmit_policy: RetransmitPolicy,

    /// Number of consecutive timeouts without acknowledgment progress after which the transfer
    /// fails with [`Error::RetransmitLimit`]. `None` retries forever.
    ///
    /// This counts timeout rounds, not packets: under [`RetransmitPolicy::GoBackN`] one round
    /// resends up to a window of packets, each counted in [`SendReport::retransmits`].
    ///
    /// Default value: `None`
    pub max_retransmits: Option<u64>,

    /// Longest single blocking wait, in milliseconds. Bounds how long a cancellation can go
    /// unnoticed.
    ///
    /// Minimum value: 1 \
    /// Default value: 100
    pub cancel_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: TIMEOUT_DEFAULT_MS,
            retransmit_policy: RetransmitPolicy::default(),
            max_retransmits: None,
            cancel_poll_ms: CANCEL_POLL_DEFAULT_MS,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms < TIMEOUT_MIN_MS {
            return Err(Error::Config(format!(
                "sender timeout_ms < {}",
                TIMEOUT_MIN_MS
            )));
        }

        if self.cancel_poll_ms < CANCEL_POLL_MIN_MS {
            return Err(Error::Config(format!(
                "sender cancel_poll_ms < {}",
                CANCEL_POLL_MIN_MS
            )));
        }

        Ok(())
    }
}

/// Summary of a completed transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Packets transmitted for the first time.
    pub packets_sent: u64,
    /// Packets transmitted again after a timeout.
    pub retransmits: u64,
    /// Well-formed acks received, whatever their value.
    pub acks_received: u64,
    pub duplicate_acks: u64,
    pub stale_acks: u64,
    /// Acks for packets that were never sent.
    pub invalid_acks: u64,
    /// Datagrams that did not decode as an ack.
    pub malformed: u64,
    pub elapsed: time::Duration,
}

/// Sending side of a sliding-window transfer.
///
/// Transmits `N` fixed-size blocks over a [`Transport`], keeping at most `W` of them
/// unacknowledged, and retransmits on timeout until every block has been acknowledged.
pub struct Sender<T> {
    transport: T,
    params: SessionParams,
    config: Config,
    cancel: Option<CancelToken>,
    // Timestamps are computed relative to this instant
    time_ref: time::Instant,
    window: SendWindow,
    timer: RetransmitTimer,
    // Consecutive timeouts without ack progress
    stalled_rounds: u64,
    // Always-allocated frame buffer
    frame: Box<[u8]>,
    report: SendReport,
}

impl<T> Sender<T>
where
    T: Transport,
{
    pub fn new(transport: T, params: SessionParams, config: Config) -> Result<Self> {
        params.validate()?;
        config.validate()?;

        Ok(Self {
            transport,
            params,
            cancel: None,
            time_ref: time::Instant::now(),
            window: SendWindow::new(params.window_size, params.packet_count),
            timer: RetransmitTimer::new(config.timeout_ms),
            stalled_rounds: 0,
            frame: vec![0; params.frame_size()].into_boxed_slice(),
            report: SendReport::default(),
            config,
        })
    }

    /// Makes [`Sender::run`] give up with [`Error::Cancelled`] once `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Returns the number of whole milliseconds elapsed since the transfer started.
    fn time_now_ms(&self) -> u64 {
        (time::Instant::now() - self.time_ref).as_millis() as u64
    }

    fn check_blocks<B>(&self, blocks: &[B]) -> Result<()>
    where
        B: AsRef<[u8]>,
    {
        if blocks.len() != self.params.packet_count as usize {
            return Err(Error::BlockCount {
                count: blocks.len(),
                expected: self.params.packet_count,
            });
        }

        for (seq, block) in blocks.iter().enumerate() {
            let len = block.as_ref().len();

            if len != self.params.payload_size {
                return Err(Error::PayloadSize {
                    seq: seq as u32,
                    len,
                    expected: self.params.payload_size,
                });
            }
        }

        Ok(())
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    fn transmit<B>(&mut self, blocks: &[B], seq: u32) -> Result<()>
    where
        B: AsRef<[u8]>,
    {
        let frame = DataFrame {
            seq,
            payload: blocks[seq as usize].as_ref(),
        };

        let Some(len) = frame.write(&mut self.frame) else {
            return Err(Error::PayloadSize {
                seq,
                len: frame.payload.len(),
                expected: self.params.payload_size,
            });
        };

        trace!("sending packet {seq}");

        self.transport.send(&self.frame[..len])?;

        Ok(())
    }

    /// Sends new packets while the window has room.
    fn fill<B>(&mut self, blocks: &[B]) -> Result<()>
    where
        B: AsRef<[u8]>,
    {
        while self.window.can_send() {
            let seq = self.window.mark_sent();

            self.transmit(blocks, seq)?;
            self.report.packets_sent += 1;
        }

        Ok(())
    }

    fn handle_timeout<B>(&mut self, blocks: &[B], now_ms: u64) -> Result<()>
    where
        B: AsRef<[u8]>,
    {
        let base = self.window.base();

        if let Some(max_retransmits) = self.config.max_retransmits {
            if self.stalled_rounds >= max_retransmits {
                return Err(Error::RetransmitLimit {
                    seq: base,
                    attempts: self.stalled_rounds,
                });
            }
        }

        self.stalled_rounds += 1;

        let resend = match self.config.retransmit_policy {
            RetransmitPolicy::Oldest => base..base + 1,
            RetransmitPolicy::GoBackN => self.window.unacked(),
        };

        debug!(
            "no ack progress after {}ms, resending {:?} (round {})",
            self.timer.timeout_ms(),
            resend,
            self.stalled_rounds
        );

        for seq in resend {
            self.transmit(blocks, seq)?;
            self.report.retransmits += 1;
        }

        self.timer.arm(now_ms);

        Ok(())
    }

    fn handle_ack(&mut self, ack: std::result::Result<AckFrame, FrameError>) {
        let ack = match ack {
            Ok(frame) => frame.cumulative_ack,
            Err(err) => {
                warn!("discarding malformed ack: {err}");
                self.report.malformed += 1;
                return;
            }
        };

        self.report.acks_received += 1;

        match self.window.acknowledge(ack) {
            AckOutcome::Advanced { acked } => {
                trace!("ack {ack} retires {acked} packets, base now {}", self.window.base());

                // Restarted at the next wait
                self.timer.disarm();
                self.stalled_rounds = 0;
            }
            AckOutcome::Duplicate => {
                trace!("duplicate ack {ack}");
                self.report.duplicate_acks += 1;
            }
            AckOutcome::Stale => {
                debug!("stale ack {ack}, base is {}", self.window.base());
                self.report.stale_acks += 1;
            }
            AckOutcome::Invalid => {
                warn!("ack {ack} covers unsent packets, next is {}", self.window.next());
                self.report.invalid_acks += 1;
            }
        }
    }

    /// Transfers `blocks`, which must be exactly `packet_count` blocks of `payload_size` bytes,
    /// and returns once the receiver has acknowledged all of them.
    ///
    /// Loss is retried indefinitely unless [`Config::max_retransmits`] is set. The only other
    /// ways out are a fatal transport error and cancellation.
    pub fn run<B>(&mut self, blocks: &[B]) -> Result<SendReport>
    where
        B: AsRef<[u8]>,
    {
        self.check_blocks(blocks)?;

        self.time_ref = time::Instant::now();
        self.window = SendWindow::new(self.params.window_size, self.params.packet_count);
        self.timer.disarm();
        self.stalled_rounds = 0;
        self.report = SendReport::default();

        info!(
            "sending {} packets of {} bytes, window {}",
            self.params.packet_count, self.params.payload_size, self.params.window_size
        );

        let cancel_poll = time::Duration::from_millis(self.config.cancel_poll_ms);

        while !self.window.is_complete() {
            self.fill(blocks)?;

            let now_ms = self.time_now_ms();

            // The window is full or everything is sent; wait for progress
            self.timer.arm_if_unarmed(now_ms);

            if self.timer.is_expired(now_ms) {
                self.handle_timeout(blocks, now_ms)?;
                continue;
            }

            self.check_cancel()?;

            let wait = self
                .timer
                .remaining(now_ms)
                .map(|remaining| remaining.min(cancel_poll));

            let ack = match self.transport.wait_recv(wait) {
                Ok(Some(bytes)) => AckFrame::read(bytes),
                Ok(None) => continue,
                Err(err) => return Err(cancel::transport_failure(self.cancel.as_ref(), err)),
            };

            self.handle_ack(ack);

            // Take in whatever else has already arrived before refilling the window
            loop {
                let ack = match self.transport.try_recv() {
                    Ok(Some(bytes)) => AckFrame::read(bytes),
                    Ok(None) => break,
                    Err(err) => return Err(cancel::transport_failure(self.cancel.as_ref(), err)),
                };

                self.handle_ack(ack);
            }
        }

        self.timer.disarm();
        self.report.elapsed = self.time_ref.elapsed();

        info!(
            "all {} packets acknowledged in {:?}, {} retransmits",
            self.params.packet_count, self.report.elapsed, self.report.retransmits
        );

        Ok(self.report.clone())
    }
}
