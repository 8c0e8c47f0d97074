use clap::Parser;
use tracing::{info, Level};

use swarq::sender::{Config, RetransmitPolicy};
use swarq::transport::{FaultRates, LossyTransport, UdpTransport};
use swarq::{SessionParams, Sender};

/// Sends a generated test transfer to a swarq receiver.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Local address to bind.
    #[arg(long, default_value = "0.0.0.0:0")]
    bind: String,

    /// Address of the receiver.
    #[arg(long, default_value = "127.0.0.1:9000")]
    peer: String,

    /// Number of packets to send.
    #[arg(short = 'n', long, default_value_t = 1000)]
    count: u32,

    #[arg(short, long, default_value_t = 16)]
    window: u32,

    #[arg(long, default_value_t = 1024)]
    payload_size: usize,

    /// Retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 1500)]
    timeout_ms: u64,

    /// Resend the whole window on timeout instead of only the oldest packet.
    #[arg(long, default_value_t = false)]
    go_back_n: bool,

    /// Give up after this many consecutive timeout rounds without progress. A go-back-n round
    /// resends the whole window but counts once.
    #[arg(long)]
    max_retransmits: Option<u64>,

    /// Percentage of outgoing data packets to drop on purpose.
    #[arg(long, default_value_t = 0)]
    drop_percent: u8,

    /// Seed for the drop decisions. Random if not given.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

/// Block `seq` starts with its own sequence number and is padded with its low byte.
fn make_block(seq: u32, payload_size: usize) -> Vec<u8> {
    let mut block = vec![seq as u8; payload_size];
    let stamp = seq.to_ne_bytes();
    let stamp_len = stamp.len().min(payload_size);

    block[..stamp_len].copy_from_slice(&stamp[..stamp_len]);
    block
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
        timeout_ms: args.timeout_ms,
        retransmit_policy: if args.go_back_n {
            RetransmitPolicy::GoBackN
        } else {
            RetransmitPolicy::Oldest
        },
        max_retransmits: args.max_retransmits,
        ..Default::default()
    };

    let seed = args.seed.unwrap_or_else(rand::random);

    // One spare byte so that oversized datagrams read as malformed rather than truncated
    let socket = UdpTransport::connect(
        args.bind.as_str(),
        args.peer.as_str(),
        params.frame_size() + 1,
    )?;
    info!("sending from {} to {}", socket.local_addr(), args.peer);

    let transport = LossyTransport::random(socket, FaultRates::loss(args.drop_percent), seed);

    let blocks: Vec<Vec<u8>> = (0..args.count)
        .map(|seq| make_block(seq, args.payload_size))
        .collect();

    let mut sender = Sender::new(transport, params, config)?;
    let report = sender.run(&blocks)?;

    let faults = sender.transport().stats();

    println!(
        "sent {} packets in {:?}: {} retransmits, {} dropped on purpose (seed {seed}), \
         {} duplicate acks",
        report.packets_sent,
        report.elapsed,
        report.retransmits,
        faults.dropped,
        report.duplicate_acks
    );

    Ok(())
}
