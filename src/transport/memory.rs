//! In-process transport pair built on channels.
//!
//! Delivery is reliable and ordered, which makes it a deterministic base for
//! [`super::LossyTransport`] faults in tests.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::time;

use super::Transport;

/// One end of an in-process datagram link. See [`pair`].
pub struct MemoryTransport {
    tx: mpsc::Sender<Box<[u8]>>,
    rx: mpsc::Receiver<Box<[u8]>>,
    // Last datagram handed out
    current: Box<[u8]>,
}

/// Creates two connected ends. Each end sends to and receives from the other.
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();

    let a = MemoryTransport {
        tx: a_tx,
        rx: a_rx,
        current: Box::default(),
    };

    let b = MemoryTransport {
        tx: b_tx,
        rx: b_rx,
        current: Box::default(),
    };

    (a, b)
}

fn peer_closed() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "peer transport closed")
}

impl Transport for MemoryTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        // Like UDP, sending into the void is not an error
        let _ = self.tx.send(datagram.into());
        Ok(())
    }

    fn reply(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.send(datagram)
    }

    fn try_recv(&mut self) -> io::Result<Option<&[u8]>> {
        match self.rx.try_recv() {
            Ok(datagram) => {
                self.current = datagram;
                Ok(Some(&self.current[..]))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(peer_closed()),
        }
    }

    fn wait_recv(&mut self, timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>> {
        let datagram = match timeout {
            Some(timeout) => match self.rx.recv_timeout(timeout) {
                Ok(datagram) => datagram,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => return Err(peer_closed()),
            },
            None => self.rx.recv().map_err(|_| peer_closed())?,
        };

        self.current = datagram;
        Ok(Some(&self.current[..]))
    }
}
