/*

Swarq moves a finite sequence of fixed-size blocks across an unreliable datagram link using a
sliding window, cumulative acknowledgments and a single retransmission timer.

# Session

Both ends agree on three numbers before anything is sent:

  N  packet count, sequence numbers 0..N-1
  W  window size
  B  payload size in bytes

There is no handshake; a mismatch shows up as malformed or out-of-window datagrams.

# Frames

  data  [ seq: u32 ][ payload: B bytes ]
  ack   [ cumulative ack: i32 ]

Integers use the host's native byte order. A datagram of any other length is malformed, and is
logged and dropped.

# Sender

The sender keeps base (oldest unacknowledged) and next (next never sent), with next - base <= W
at all times:

  0        base            next          base+W       N
  |--acked--|---in flight---|---sendable---|---later---|

It sends until the window is full, then waits. An ack k is classified against the window:

  k <  base-1      stale, ignored
  k == base-1      duplicate, ignored
  k >= next        acknowledges unsent data, ignored
  otherwise        base <- k+1

Any progress restarts the retransmission timer. When it expires, the oldest unacknowledged packet
is resent (or, in go-back-N mode, all of them) and the timer restarts. Timeouts are the only
trigger for retransmission.

# Receiver

The receiver holds a cumulative ack c, starting at -1, and accepts seq only when

  c < seq < c+1+W  and  seq < N

Accepted packets are buffered until the gap before them fills, after which c advances over every
consecutive received packet and their payloads are handed over in order. Each accepted packet is
answered with c, changed or not. Packets beyond the window are dropped silently. Packets at or
below c are dropped and, by default, answered with c so that a lost ack cannot stall the sender.

Once c reaches N-1 the receiver lingers, acknowledging retransmitted data with N-1 until no
retransmission has arrived for a while. This covers the case where the final ack was lost.

*/

pub mod cancel;
mod error;
pub mod frame;
pub mod receiver;
pub mod sender;
mod session;
mod timer;
pub mod transport;
pub mod window;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use receiver::{ReceiveReport, Receiver};
pub use sender::{RetransmitPolicy, SendReport, Sender};
pub use session::SessionParams;
pub use transport::Transport;
