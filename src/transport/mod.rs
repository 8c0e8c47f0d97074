//! Datagram transports the ARQ endpoints run over.
//!
//! The protocol assumes nothing of a transport beyond best effort: datagrams may be lost,
//! duplicated or reordered. A transport only has to report errors it cannot recover from
//! (closed socket, unreachable host), which end the session.

use std::io;
use std::time;

pub mod lossy;
pub mod memory;
mod socket;

pub use lossy::{FaultRates, LossyTransport, Verdict};
pub use memory::MemoryTransport;
pub use socket::UdpTransport;

pub trait Transport {
    /// Sends a datagram to the peer. Delivery is best effort.
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Sends a datagram back to the source of the most recently received datagram.
    fn reply(&mut self, datagram: &[u8]) -> io::Result<()>;

    /// Returns the next datagram if one is available without blocking.
    fn try_recv(&mut self) -> io::Result<Option<&[u8]>>;

    /// Blocks for up to `timeout` (forever if `None`) for the next datagram. Returns `Ok(None)`
    /// if nothing arrived in time, or if the wait woke spuriously; callers keep track of their
    /// own deadlines.
    fn wait_recv(&mut self, timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>>;
}

impl<T> Transport for &mut T
where
    T: Transport + ?Sized,
{
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        (**self).send(datagram)
    }

    fn reply(&mut self, datagram: &[u8]) -> io::Result<()> {
        (**self).reply(datagram)
    }

    fn try_recv(&mut self) -> io::Result<Option<&[u8]>> {
        (**self).try_recv()
    }

    fn wait_recv(&mut self, timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>> {
        (**self).wait_recv(timeout)
    }
}
