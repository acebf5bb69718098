use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use oscrelay_codec::Packet;

use crate::error::{Result, TransportError};

/// How long [`PacketReceiver::receive`] waits between state checks.
const BLOCKING_RECEIVE_SLICE: Duration = Duration::from_millis(100);

/// Connection state of a receiving transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Connected,
    Closed,
}

/// Outbound half of a transport.
///
/// Sending is best-effort: success means the datagram was handed to the
/// network, not that the peer received it.
pub trait PacketSender: Send + Sync {
    fn send(&self, packet: &Packet) -> Result<()>;
}

/// Inbound half of a transport.
pub trait PacketReceiver: Send + Sync {
    /// Transition to [`ConnectionState::Connected`].
    fn connect(&self) -> Result<()>;

    /// Transition to [`ConnectionState::Closed`]. Idempotent.
    fn close(&self);

    fn state(&self) -> ConnectionState;

    /// Wait up to `timeout` for the next packet; `Ok(None)` on timeout.
    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Packet>>;

    /// Return a packet if one is already available.
    fn try_receive(&self) -> Result<Option<Packet>>;

    /// Block until a packet arrives or the receiver is closed.
    fn receive(&self) -> Result<Packet> {
        loop {
            if let Some(packet) = self.receive_timeout(BLOCKING_RECEIVE_SLICE)? {
                return Ok(packet);
            }
        }
    }
}

impl<T: PacketSender + ?Sized> PacketSender for Arc<T> {
    fn send(&self, packet: &Packet) -> Result<()> {
        (**self).send(packet)
    }
}

impl<T: PacketReceiver + ?Sized> PacketReceiver for Arc<T> {
    fn connect(&self) -> Result<()> {
        (**self).connect()
    }

    fn close(&self) {
        (**self).close()
    }

    fn state(&self) -> ConnectionState {
        (**self).state()
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Packet>> {
        (**self).receive_timeout(timeout)
    }

    fn try_receive(&self) -> Result<Option<Packet>> {
        (**self).try_receive()
    }
}

/// Atomic [`ConnectionState`] shared by receiver implementations.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    pub(crate) fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            0 => ConnectionState::NotConnected,
            1 => ConnectionState::Connected,
            _ => ConnectionState::Closed,
        }
    }

    /// Move to `Connected`; a closed receiver cannot be reopened.
    pub(crate) fn connect(&self) -> Result<()> {
        match self
            .0
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(1) => Ok(()),
            Err(_) => Err(TransportError::Closed),
        }
    }

    /// Returns true if this call performed the transition.
    pub(crate) fn close(&self) -> bool {
        self.0.swap(2, Ordering::AcqRel) != 2
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        match self.get() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::NotConnected => Err(TransportError::NotConnected),
            ConnectionState::Closed => Err(TransportError::Closed),
        }
    }
}
