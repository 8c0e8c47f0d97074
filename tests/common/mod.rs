use std::sync::{Arc, Mutex, Once};
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::Level;

use swarq::transport::Verdict;
use swarq::{receiver, sender};
use swarq::{ReceiveReport, Receiver, SendReport, Sender, SessionParams, Transport};

static INIT_LOGGING: Once = Once::new();

pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(Level::DEBUG)
            .try_init()
            .ok();
    });
}

/// Random blocks for a session, reproducible from `seed`.
pub fn make_blocks(params: &SessionParams, seed: u64) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(seed);

    (0..params.packet_count)
        .map(|_| {
            let mut block = vec![0u8; params.payload_size];
            rng.fill(&mut block[..]);
            block
        })
        .collect()
}

pub fn digest<B>(blocks: &[B]) -> md5::Digest
where
    B: AsRef<[u8]>,
{
    let mut context = md5::Context::new();

    for block in blocks {
        context.consume(block.as_ref());
    }

    context.compute()
}

/// Sequence number of an encoded data frame.
pub fn data_seq(datagram: &[u8]) -> u32 {
    u32::from_ne_bytes(datagram[..4].try_into().unwrap())
}

/// Cumulative ack of an encoded ack frame.
pub fn ack_value(datagram: &[u8]) -> i32 {
    i32::from_ne_bytes(datagram[..4].try_into().unwrap())
}

/// A fault script that lets everything through and records the acks it sees.
pub fn ack_recorder() -> (Arc<Mutex<Vec<i32>>>, impl FnMut(&[u8]) -> Verdict + Send + 'static) {
    let acks = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&acks);

    let script = move |datagram: &[u8]| {
        log.lock().unwrap().push(ack_value(datagram));
        Verdict::Deliver
    };

    (acks, script)
}

pub struct Outcome {
    pub send: swarq::Result<SendReport>,
    pub receive: swarq::Result<ReceiveReport>,
    /// Sequence numbers in the order the receiver delivered them.
    pub delivered: Vec<u32>,
}

/// Runs a whole transfer, the receiver on its own thread and the sender on this one.
pub fn transfer<S, R>(
    sender_transport: S,
    receiver_transport: R,
    params: SessionParams,
    sender_config: sender::Config,
    receiver_config: receiver::Config,
    blocks: &[Vec<u8>],
) -> Outcome
where
    S: Transport,
    R: Transport + Send,
{
    thread::scope(|scope| {
        let receiver_thread = scope.spawn(move || {
            let mut delivered = Vec::new();
            let mut payloads: Vec<Box<[u8]>> = Vec::new();

            let mut receiver = Receiver::new(receiver_transport, params, receiver_config)?;
            let mut report = receiver.run_with(|seq, payload| {
                delivered.push(seq);
                payloads.push(payload.into());
            })?;

            report.payloads = payloads;

            Ok::<_, swarq::Error>((report, delivered))
        });

        let send = Sender::new(sender_transport, params, sender_config)
            .and_then(|mut sender| sender.run(blocks));

        let (receive, delivered) = match receiver_thread.join().unwrap() {
            Ok((report, delivered)) => (Ok(report), delivered),
            Err(err) => (Err(err), Vec::new()),
        };

        Outcome {
            send,
            receive,
            delivered,
        }
    })
}
