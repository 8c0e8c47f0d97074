use std::io;
use std::net;
use std::time;

use tracing::{debug, trace};

use super::Transport;

const SOCKET_POLLING_KEY: usize = 0;

/// A [`Transport`] over a non-blocking UDP socket.
///
/// Blocking waits are done through a [`polling::Poller`] so that a deadline can be honored
/// without spinning.
pub struct UdpTransport {
    socket: net::UdpSocket,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    // Destination of send()
    peer_addr: Option<net::SocketAddr>,
    // Destination of reply(), learned from incoming datagrams
    reply_addr: Option<net::SocketAddr>,
    // Polling objects
    poller: polling::Poller,
    poller_events: polling::Events,
    // Always-allocated receive buffer
    recv_buffer: Box<[u8]>,
}

impl UdpTransport {
    /// Binds a socket with no fixed peer; replies go to whoever sent last. Suitable for a
    /// receiving endpoint.
    pub fn bind<A>(bind_address: A, frame_size_max: usize) -> io::Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        let socket = net::UdpSocket::bind(bind_address)?;

        Self::new(socket, None, frame_size_max)
    }

    /// Binds a socket connected to `peer_address`. Datagrams from any other source are discarded
    /// by the operating system. Suitable for a sending endpoint.
    pub fn connect<A, B>(
        bind_address: A,
        peer_address: B,
        frame_size_max: usize,
    ) -> io::Result<Self>
    where
        A: net::ToSocketAddrs,
        B: net::ToSocketAddrs,
    {
        let socket = net::UdpSocket::bind(bind_address)?;
        socket.connect(peer_address)?;

        let peer_addr = socket.peer_addr()?;

        Self::new(socket, Some(peer_addr), frame_size_max)
    }

    fn new(
        socket: net::UdpSocket,
        peer_addr: Option<net::SocketAddr>,
        frame_size_max: usize,
    ) -> io::Result<Self> {
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        let poller = polling::Poller::new()?;

        // SAFETY: the socket is owned by the returned object and deleted from the poller in
        // Drop, before it is closed
        unsafe {
            poller.add(&socket, polling::Event::readable(SOCKET_POLLING_KEY))?;
        }

        debug!("udp transport bound to {local_addr}, peer {peer_addr:?}");

        Ok(Self {
            socket,
            local_addr,
            peer_addr,
            reply_addr: None,
            poller,
            poller_events: polling::Events::new(),
            recv_buffer: vec![0; frame_size_max].into_boxed_slice(),
        })
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<net::SocketAddr> {
        self.peer_addr
    }

    fn send_to(&self, datagram: &[u8], addr: net::SocketAddr) -> io::Result<()> {
        // Some platforms refuse an explicit destination on a connected socket
        let result = if self.peer_addr == Some(addr) {
            self.socket.send(datagram)
        } else {
            self.socket.send_to(datagram, addr)
        };

        match result {
            Ok(_) => Ok(()),
            // A full send buffer is indistinguishable from loss further down the path
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!("send buffer full, dropped {} bytes to {addr}", datagram.len());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        match self.peer_addr {
            Some(addr) => self.send_to(datagram, addr),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "transport has no peer address",
            )),
        }
    }

    fn reply(&mut self, datagram: &[u8]) -> io::Result<()> {
        match self.reply_addr.or(self.peer_addr) {
            Some(addr) => self.send_to(datagram, addr),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "nothing received yet, no reply address",
            )),
        }
    }

    fn try_recv(&mut self) -> io::Result<Option<&[u8]>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((frame_len, sender_addr)) => {
                self.reply_addr = Some(sender_addr);
                Ok(Some(&self.recv_buffer[..frame_len]))
            }
            Err(err) => match err.kind() {
                // The only acceptable error is WouldBlock, indicating no datagram
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(err),
            },
        }
    }

    fn wait_recv(&mut self, timeout: Option<time::Duration>) -> io::Result<Option<&[u8]>> {
        // Wait for a readable event (must be re-armed prior to each wait() call)
        self.poller
            .modify(&self.socket, polling::Event::readable(SOCKET_POLLING_KEY))?;

        self.poller_events.clear();

        let n = self.poller.wait(&mut self.poller_events, timeout)?;

        if n > 0 {
            // The socket is readable - read in confidence
            self.try_recv()
        } else {
            Ok(None)
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        let _ = self.poller.delete(&self.socket);
    }
}
