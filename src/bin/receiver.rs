use clap::Parser;
use tracing::{info, warn, Level};

use swarq::receiver::Config;
use swarq::transport::{FaultRates, LossyTransport, UdpTransport};
use swarq::{Receiver, SessionParams};

/// Receives a generated test transfer from a swarq sender and checks its contents.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Local address to bind.
    #[arg(long, default_value = "0.0.0.0:9000")]
    bind: String,

    /// Number of packets to expect.
    #[arg(short = 'n', long, default_value_t = 1000)]
    count: u32,

    #[arg(short, long, default_value_t = 16)]
    window: u32,

    #[arg(long, default_value_t = 1024)]
    payload_size: usize,

    /// How long to keep acknowledging retransmissions after completion, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    linger_ms: u64,

    /// Percentage of outgoing acks to drop on purpose.
    #[arg(long, default_value_t = 0)]
    drop_percent: u8,

    /// Seed for the drop decisions. Random if not given.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

/// Checks that block `seq` starts with its own sequence number.
fn block_is_stamped(seq: u32, block: &[u8]) -> bool {
    let stamp = seq.to_ne_bytes();
    let stamp_len = stamp.len().min(block.len());

    block[..stamp_len] == stamp[..stamp_len]
}

fn main() -> swarq::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::TRACE
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).try_init().ok();

    let params = SessionParams::new(args.count, args.window, args.payload_size);
    params.validate()?;

    let config = Config {
        linger_ms: args.linger_ms,
        ..Default::default()
    };

    let seed = args.seed.unwrap_or_else(rand::random);

    // One spare byte so that oversized datagrams read as malformed rather than truncated
    let socket = UdpTransport::bind(args.bind.as_str(), params.frame_size() + 1)?;
    info!("listening on {}", socket.local_addr());

    let transport = LossyTransport::random(socket, FaultRates::loss(args.drop_percent), seed);

    let mut mismatched = 0u32;
    let mut bytes = 0usize;

    let mut receiver = Receiver::new(transport, params, config)?;
    let report = receiver.run_with(|seq, payload| {
        bytes += payload.len();

        if !block_is_stamped(seq, payload) {
            warn!("block {seq} does not carry its sequence number");
            mismatched += 1;
        }
    })?;

    let faults = receiver.transport().stats();

    println!(
        "received {} packets ({bytes} bytes) in {:?}: {} repeated, {} behind, {} out of window, \
         {} malformed, {} acks sent, {} dropped on purpose (seed {seed}), {mismatched} mismatched",
        report.accepted,
        report.elapsed,
        report.repeated,
        report.behind,
        report.out_of_window,
        report.malformed,
        report.acks_sent,
        faults.dropped
    );

    Ok(())
}
