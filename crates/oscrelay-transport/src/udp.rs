use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use oscrelay_codec::Packet;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::traits::{ConnectionState, PacketReceiver, PacketSender, StateCell};

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Receive buffer: one maximal datagram.
const RECEIVE_BUFFER_SIZE: usize = 64 * 1024;

/// Smallest timeout the socket accepts; zero means "block forever" to the OS.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// A bound UDP socket that hands out senders and a receiver.
///
/// Senders and the receiver share the socket, so confirmations sent back by a
/// peer arrive on the same port the original packages left from.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a UDP socket.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        let label = format!("{addr:?}");
        let socket = UdpSocket::bind(addr).map_err(|source| TransportError::Bind {
            addr: label.clone(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| TransportError::Bind {
            addr: label,
            source,
        })?;
        debug!(%local_addr, "bound udp socket");
        Ok(Self {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A sender that transmits every packet to `peer`.
    pub fn sender(&self, peer: SocketAddr) -> UdpSender {
        UdpSender {
            socket: Arc::clone(&self.socket),
            peer,
        }
    }

    /// A receiver over this socket. Starts in [`ConnectionState::NotConnected`].
    pub fn receiver(&self) -> UdpReceiver {
        UdpReceiver {
            socket: Arc::clone(&self.socket),
            state: StateCell::new(),
            buf: Mutex::new(vec![0u8; RECEIVE_BUFFER_SIZE]),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "udp"
    }
}

/// Sends encoded packets to one fixed peer.
#[derive(Debug, Clone)]
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpSender {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl PacketSender for UdpSender {
    fn send(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes();
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::DatagramTooLarge {
                size: bytes.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        self.socket
            .send_to(&bytes, self.peer)
            .map_err(|source| TransportError::Send {
                peer: self.peer,
                source,
            })?;
        trace!(peer = %self.peer, size = bytes.len(), "sent datagram");
        Ok(())
    }
}

/// Receives and decodes datagrams from any peer.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: Arc<UdpSocket>,
    state: StateCell,
    buf: Mutex<Vec<u8>>,
}

impl PacketReceiver for UdpReceiver {
    fn connect(&self) -> Result<()> {
        self.state.connect()?;
        debug!(local_addr = ?self.socket.local_addr().ok(), "udp receiver connected");
        Ok(())
    }

    fn close(&self) {
        if self.state.close() {
            debug!(local_addr = ?self.socket.local_addr().ok(), "udp receiver closed");
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Packet>> {
        self.state.ensure_connected()?;
        self.socket
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        let mut buf = self
            .buf
            .lock()
            .map_err(|_| std::io::Error::other("receive buffer lock poisoned"))?;
        match self.socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                trace!(%from, size = len, "received datagram");
                Ok(Some(Packet::decode(&buf[..len])?))
            }
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(_) if self.state.get() == ConnectionState::Closed => Err(TransportError::Closed),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn try_receive(&self) -> Result<Option<Packet>> {
        self.receive_timeout(MIN_READ_TIMEOUT)
    }
}
