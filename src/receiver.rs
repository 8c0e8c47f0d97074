use std::time;

use tracing::{debug, info, trace, warn};

use super::cancel::{self, CancelToken};
use super::frame::{AckFrame, DataFrame};
use super::session::SessionParams;
use super::transport::Transport;
use super::window::{Acceptance, ReceiveRecord};
use super::Error;
use super::Result;

const LINGER_DEFAULT_MS: u64 = 2_000;

const IDLE_TIMEOUT_MIN_MS: u64 = 1;

const CANCEL_POLL_DEFAULT_MS: u64 = 100;
const CANCEL_POLL_MIN_MS: u64 = 1;

/// Configuration for a [`Receiver`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Quiet period after the last packet is received during which retransmitted data is still
    /// acknowledged, in milliseconds. Covers the sender whose final ack was lost. 0 disables.
    ///
    /// Default value: 2,000
    pub linger_ms: u64,

    /// Give up with [`Error::IdleTimeout`] if nothing arrives for this long before the transfer
    /// completes. `None` waits forever.
    ///
    /// Minimum value: 1 \
    /// Default value: `None`
    pub idle_timeout_ms: Option<u64>,

    /// Answer packets at or below the cumulative ack with the current cumulative ack. They are
    /// still discarded. Without this, losing the ack for the newest packet in flight leaves the
    /// sender retransmitting packets that are never acknowledged again.
    ///
    /// Default value: `true`
    pub ack_behind: bool,

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
            linger_ms: LINGER_DEFAULT_MS,
            idle_timeout_ms: None,
            ack_behind: true,
            cancel_poll_ms: CANCEL_POLL_DEFAULT_MS,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if let Some(idle_timeout_ms) = self.idle_timeout_ms {
            if idle_timeout_ms < IDLE_TIMEOUT_MIN_MS {
                return Err(Error::Config(format!(
                    "receiver idle_timeout_ms < {}",
                    IDLE_TIMEOUT_MIN_MS
                )));
            }
        }

        if self.cancel_poll_ms < CANCEL_POLL_MIN_MS {
            return Err(Error::Config(format!(
                "receiver cancel_poll_ms < {}",
                CANCEL_POLL_MIN_MS
            )));
        }

        Ok(())
    }
}

/// Summary of a completed transfer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Payloads in sequence order. Only filled by [`Receiver::run`].
    pub payloads: Vec<Box<[u8]>>,
    /// Packets newly marked received.
    pub accepted: u64,
    /// Packets inside the window that were already buffered.
    pub repeated: u64,
    /// Packets at or below the cumulative ack.
    pub behind: u64,
    /// Packets beyond the window or outside the session.
    pub out_of_window: u64,
    /// Datagrams that did not decode as a data frame.
    pub malformed: u64,
    pub acks_sent: u64,
    /// Acks sent while lingering after completion. Included in `acks_sent`.
    pub linger_acks: u64,
    pub elapsed: time::Duration,
}

/// Receiving side of a sliding-window transfer.
///
/// Accepts packets that fall inside the window past the cumulative ack, acknowledges each one
/// with the cumulative ack, and hands payloads over strictly in order.
pub struct Receiver<T> {
    transport: T,
    params: SessionParams,
    config: Config,
    cancel: Option<CancelToken>,
    // Timestamps are computed relative to this instant
    time_ref: time::Instant,
    record: ReceiveRecord,
    report: ReceiveReport,
}

/// Classifies one incoming datagram and returns the ack it warrants, if any. Delivered payloads
/// are passed to `deliver`.
fn process_datagram<F>(
    record: &mut ReceiveRecord,
    report: &mut ReceiveReport,
    config: &Config,
    payload_size: usize,
    datagram: &[u8],
    deliver: &mut F,
) -> Option<i32>
where
    F: FnMut(u32, &[u8]),
{
    let frame = match DataFrame::read(datagram, payload_size) {
        Ok(frame) => frame,
        Err(err) => {
            warn!("discarding malformed datagram: {err}");
            report.malformed += 1;
            return None;
        }
    };

    let seq = frame.seq;

    match record.receive(seq, frame.payload, &mut *deliver) {
        Acceptance::Accepted { delivered } => {
            trace!(
                "accepted packet {seq}, delivered {delivered}, cumulative ack {}",
                record.cumulative_ack()
            );
            report.accepted += 1;
        }
        Acceptance::Repeated => {
            trace!("packet {seq} already buffered");
            report.repeated += 1;
        }
        Acceptance::Behind => {
            debug!("packet {seq} behind cumulative ack {}", record.cumulative_ack());
            report.behind += 1;

            return config.ack_behind.then(|| record.cumulative_ack());
        }
        Acceptance::Ahead | Acceptance::OutOfRange => {
            debug!("packet {seq} outside window {:?}", record.window());
            report.out_of_window += 1;

            return None;
        }
    }

    Some(record.cumulative_ack())
}

impl<T> Receiver<T>
where
    T: Transport,
{
    pub fn new(transport: T, params: SessionParams, config: Config) -> Result<Self> {
        params.validate()?;
        config.validate()?;

        Ok(Self {
            transport,
            params,
            config,
            cancel: None,
            time_ref: time::Instant::now(),
            record: ReceiveRecord::new(params.packet_count, params.window_size),
            report: ReceiveReport::default(),
        })
    }

    /// Makes [`Receiver::run`] give up with [`Error::Cancelled`] once `token` is cancelled.
    /// Cancelling during linger ends the linger instead.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn record(&self) -> &ReceiveRecord {
        &self.record
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

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map_or(false, |token| token.is_cancelled())
    }

    fn send_ack(&mut self, ack: i32) -> Result<()> {
        trace!("sending ack {ack}");

        self.transport.reply(&AckFrame::new(ack).write())?;
        self.report.acks_sent += 1;

        Ok(())
    }

    /// Receives the whole transfer and returns its payloads in order.
    pub fn run(&mut self) -> Result<ReceiveReport> {
        let mut payloads: Vec<Box<[u8]>> = Vec::with_capacity(self.params.packet_count as usize);

        let mut report = self.run_with(|_, payload| payloads.push(payload.into()))?;
        report.payloads = payloads;

        Ok(report)
    }

    /// Receives the whole transfer, passing each payload to `deliver` in sequence order as the
    /// cumulative ack advances over it. Every payload is delivered exactly once.
    pub fn run_with<F>(&mut self, mut deliver: F) -> Result<ReceiveReport>
    where
        F: FnMut(u32, &[u8]),
    {
        self.time_ref = time::Instant::now();
        self.record = ReceiveRecord::new(self.params.packet_count, self.params.window_size);
        self.report = ReceiveReport::default();

        info!(
            "receiving {} packets of {} bytes, window {}",
            self.params.packet_count, self.params.payload_size, self.params.window_size
        );

        let cancel_poll = time::Duration::from_millis(self.config.cancel_poll_ms);

        let mut last_heard_ms = 0;

        while !self.record.is_complete() {
            if self.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let now_ms = self.time_now_ms();

            let mut wait = self.cancel.as_ref().map(|_| cancel_poll);

            if let Some(idle_timeout_ms) = self.config.idle_timeout_ms {
                let idle_deadline_ms = last_heard_ms + idle_timeout_ms;

                if now_ms >= idle_deadline_ms {
                    return Err(Error::IdleTimeout {
                        idle_ms: now_ms - last_heard_ms,
                    });
                }

                let idle_remaining = time::Duration::from_millis(idle_deadline_ms - now_ms);
                wait = Some(wait.map_or(idle_remaining, |wait| wait.min(idle_remaining)));
            }

            let ack = match self.transport.wait_recv(wait) {
                Ok(Some(datagram)) => process_datagram(
                    &mut self.record,
                    &mut self.report,
                    &self.config,
                    self.params.payload_size,
                    datagram,
                    &mut deliver,
                ),
                Ok(None) => continue,
                Err(err) => return Err(cancel::transport_failure(self.cancel.as_ref(), err)),
            };

            last_heard_ms = self.time_now_ms();

            if let Some(ack) = ack {
                self.send_ack(ack)?;
            }
        }

        info!(
            "all {} packets received in {:?}",
            self.params.packet_count,
            self.time_ref.elapsed()
        );

        self.linger();

        self.report.elapsed = self.time_ref.elapsed();

        Ok(self.report.clone())
    }

    /// Keeps acknowledging retransmitted data until the link has been quiet for `linger_ms`.
    ///
    /// The transfer has already succeeded, so transport errors only end the linger.
    fn linger(&mut self) {
        if self.config.linger_ms == 0 {
            return;
        }

        let cancel_poll = time::Duration::from_millis(self.config.cancel_poll_ms);
        let last_seq = self.params.last_seq();

        let mut quiet_since_ms = self.time_now_ms();

        debug!("lingering for {}ms", self.config.linger_ms);

        loop {
            if self.is_cancelled() {
                debug!("linger cancelled");
                return;
            }

            let now_ms = self.time_now_ms();
            let linger_end_ms = quiet_since_ms + self.config.linger_ms;

            if now_ms >= linger_end_ms {
                debug!("linger over");
                return;
            }

            let wait = time::Duration::from_millis(linger_end_ms - now_ms).min(cancel_poll);

            let is_retransmit = match self.transport.wait_recv(Some(wait)) {
                Ok(Some(datagram)) => matches!(
                    DataFrame::read(datagram, self.params.payload_size),
                    Ok(frame) if i64::from(frame.seq) <= i64::from(last_seq)
                ),
                Ok(None) => continue,
                Err(err) => {
                    debug!("transport closed while lingering: {err}");
                    return;
                }
            };

            // Stray traffic must not keep a finished receiver around
            if !is_retransmit {
                continue;
            }

            quiet_since_ms = self.time_now_ms();

            if let Err(err) = self.send_ack(last_seq) {
                debug!("ack failed while lingering: {err}");
                return;
            }

            self.report.linger_acks += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;
    use std::thread;

    use crate::transport::{memory, MemoryTransport};

    fn data(seq: u32, payload_size: usize) -> Box<[u8]> {
        DataFrame {
            seq,
            payload: &vec![seq as u8; payload_size],
        }
        .write_boxed()
    }

    fn quick_config() -> Config {
        Config {
            linger_ms: 0,
            ..Default::default()
        }
    }

    fn spawn_receiver(
        transport: MemoryTransport,
        params: SessionParams,
        config: Config,
    ) -> thread::JoinHandle<Result<ReceiveReport>> {
        thread::spawn(move || Receiver::new(transport, params, config)?.run())
    }

    fn expect_ack(transport: &mut MemoryTransport) -> i32 {
        let bytes = transport
            .wait_recv(Some(time::Duration::from_secs(5)))
            .unwrap()
            .expect("no ack within 5s");

        AckFrame::read(bytes).unwrap().cumulative_ack
    }

    fn expect_silence(transport: &mut MemoryTransport) {
        let result = transport
            .wait_recv(Some(time::Duration::from_millis(50)))
            .unwrap()
            .map(|bytes| bytes.to_vec());

        assert_eq!(result, None);
    }

    #[test]
    fn stop_and_wait_acks_every_packet() {
        let params = SessionParams::new(5, 1, 4);
        let (mut sender, receiver) = memory::pair();

        let handle = spawn_receiver(receiver, params, quick_config());

        for seq in 0..5 {
            sender.send(&data(seq, 4)).unwrap();
            assert_eq!(expect_ack(&mut sender), seq as i32);
        }

        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.accepted, 5);
        assert_eq!(report.acks_sent, 5);
        assert_eq!(report.payloads.len(), 5);

        for (seq, payload) in report.payloads.iter().enumerate() {
            assert_eq!(&payload[..], &[seq as u8; 4]);
        }
    }

    #[test]
    fn window_rules() {
        let params = SessionParams::new(3, 2, 4);
        let (mut sender, receiver) = memory::pair();

        let config = Config {
            ack_behind: false,
            ..quick_config()
        };

        let handle = spawn_receiver(receiver, params, config);

        // Ahead of cumulative ack, buffered
        sender.send(&data(1, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), -1);

        // Beyond the window [0, 2)
        sender.send(&data(2, 4)).unwrap();
        expect_silence(&mut sender);

        // Already buffered, acknowledged again
        sender.send(&data(1, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), -1);

        // Fills the gap
        sender.send(&data(0, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 1);

        // At the cumulative ack
        sender.send(&data(1, 4)).unwrap();
        expect_silence(&mut sender);

        // Not a session sequence number
        sender.send(&data(7, 4)).unwrap();
        expect_silence(&mut sender);

        // Wrong size
        sender.send(&[0, 0, 0]).unwrap();
        expect_silence(&mut sender);

        sender.send(&data(2, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 2);

        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(report.repeated, 1);
        assert_eq!(report.behind, 1);
        assert_eq!(report.out_of_window, 2);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.acks_sent, 4);

        let firsts: Vec<u8> = report.payloads.iter().map(|payload| payload[0]).collect();
        assert_eq!(firsts, vec![0, 1, 2]);
    }

    #[test]
    fn packets_behind_are_reacked_by_default() {
        let params = SessionParams::new(3, 2, 4);
        let (mut sender, receiver) = memory::pair();

        let handle = spawn_receiver(receiver, params, quick_config());

        sender.send(&data(0, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 0);

        sender.send(&data(0, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 0);

        sender.send(&data(1, 4)).unwrap();
        sender.send(&data(2, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 1);
        assert_eq!(expect_ack(&mut sender), 2);

        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.accepted, 3);
        assert_eq!(report.behind, 1);
        assert_eq!(report.acks_sent, 4);
        assert_eq!(report.payloads.len(), 3);
    }

    #[test]
    fn run_with_delivers_in_order() {
        let params = SessionParams::new(4, 4, 2);
        let (mut sender, receiver) = memory::pair();

        let handle = thread::spawn(move || {
            let mut delivered = Vec::new();

            let mut receiver = Receiver::new(receiver, params, quick_config())?;
            receiver.run_with(|seq, payload| delivered.push((seq, payload[0])))?;

            Ok::<_, Error>(delivered)
        });

        for seq in [3, 1, 2, 0] {
            sender.send(&data(seq, 2)).unwrap();
        }

        let delivered = handle.join().unwrap().unwrap();

        assert_eq!(delivered, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn linger_reacks_retransmitted_data() {
        let params = SessionParams::new(2, 2, 4);
        let (mut sender, receiver) = memory::pair();

        let config = Config {
            linger_ms: 200,
            ..Default::default()
        };

        let handle = spawn_receiver(receiver, params, config);

        sender.send(&data(0, 4)).unwrap();
        sender.send(&data(1, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 0);
        assert_eq!(expect_ack(&mut sender), 1);

        // Last ack presumed lost
        sender.send(&data(1, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 1);

        // Garbage is not answered
        sender.send(&[1]).unwrap();
        expect_silence(&mut sender);

        let report = handle.join().unwrap().unwrap();

        assert_eq!(report.linger_acks, 1);
        assert_eq!(report.acks_sent, 3);
        assert!(report.elapsed >= time::Duration::from_millis(200));
    }

    #[test]
    fn stray_traffic_does_not_extend_linger() {
        let params = SessionParams::new(1, 1, 4);
        let (mut sender, receiver) = memory::pair();

        let config = Config {
            linger_ms: 200,
            ..Default::default()
        };

        let handle = spawn_receiver(receiver, params, config);

        sender.send(&data(0, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 0);

        // Malformed datagrams and packets of another session size keep arriving
        let start = time::Instant::now();

        while !handle.is_finished() && start.elapsed() < time::Duration::from_secs(3) {
            sender.send(&[1, 2, 3]).unwrap();
            sender.send(&[0; 9]).unwrap();
            thread::sleep(time::Duration::from_millis(20));
        }

        assert!(handle.is_finished(), "linger outlived its quiet period");

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.linger_acks, 0);
        assert_eq!(report.acks_sent, 1);
    }

    #[test]
    fn cancellation_wins_over_a_closing_peer() {
        // Cancels the shared token and reports the peer gone, as a cancelled peer would
        struct ClosingPeer {
            token: CancelToken,
        }

        impl Transport for ClosingPeer {
            fn send(&mut self, _datagram: &[u8]) -> io::Result<()> {
                Ok(())
            }

            fn reply(&mut self, datagram: &[u8]) -> io::Result<()> {
                self.send(datagram)
            }

            fn try_recv(&mut self) -> io::Result<Option<&[u8]>> {
                Ok(None)
            }

            fn wait_recv(&mut self, _timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>> {
                self.token.cancel();
                Err(io::Error::new(io::ErrorKind::ConnectionAborted, "peer closed"))
            }
        }

        let params = SessionParams::new(3, 2, 4);
        let token = CancelToken::new();

        let peer = ClosingPeer {
            token: token.clone(),
        };

        let mut receiver = Receiver::new(peer, params, quick_config())
            .unwrap()
            .with_cancel(token);

        assert!(matches!(receiver.run(), Err(Error::Cancelled)));
    }

    #[test]
    fn linger_ends_when_the_sender_goes_away() {
        let params = SessionParams::new(1, 1, 4);
        let (mut sender, receiver) = memory::pair();

        let config = Config {
            linger_ms: 60_000,
            ..Default::default()
        };

        let handle = spawn_receiver(receiver, params, config);

        sender.send(&data(0, 4)).unwrap();
        assert_eq!(expect_ack(&mut sender), 0);

        drop(sender);

        let report = handle.join().unwrap().unwrap();
        assert_eq!(report.payloads.len(), 1);
    }

    #[test]
    fn idle_timeout() {
        let params = SessionParams::new(4, 2, 4);
        let (_sender, receiver) = memory::pair();

        let config = Config {
            idle_timeout_ms: Some(50),
            ..quick_config()
        };

        let start = time::Instant::now();

        match Receiver::new(receiver, params, config).unwrap().run() {
            Err(Error::IdleTimeout { idle_ms }) => assert!(idle_ms >= 50),
            other => panic!("unexpected result {other:?}"),
        }

        assert!(start.elapsed() >= time::Duration::from_millis(50));
    }

    #[test]
    fn cancel_while_waiting() {
        let params = SessionParams::new(4, 2, 4);
        let (_sender, receiver) = memory::pair();

        let token = CancelToken::new();
        let remote = token.clone();

        let config = Config {
            cancel_poll_ms: 10,
            ..quick_config()
        };

        let handle = thread::spawn(move || {
            Receiver::new(receiver, params, config)?
                .with_cancel(token)
                .run()
        });

        thread::sleep(time::Duration::from_millis(50));
        remote.cancel();

        assert!(matches!(handle.join().unwrap(), Err(Error::Cancelled)));
    }

    #[test]
    fn closed_transport_is_fatal_before_completion() {
        let params = SessionParams::new(4, 2, 4);
        let (sender, receiver) = memory::pair();

        drop(sender);

        assert!(matches!(
            Receiver::new(receiver, params, quick_config()).unwrap().run(),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn invalid_config() {
        let params = SessionParams::new(4, 2, 4);
        let (_sender, receiver) = memory::pair();

        let config = Config {
            idle_timeout_ms: Some(0),
            ..Default::default()
        };

        assert!(matches!(
            Receiver::new(receiver, params, config),
            Err(Error::Config(_))
        ));
    }
}
