//! In-memory transport.
//!
//! Packets are encoded on send and decoded on receive, exactly as they would
//! be over a socket, but carried through a channel instead of the network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use oscrelay_codec::Packet;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{ConnectionState, PacketReceiver, PacketSender, StateCell};

/// Create a connected sender/receiver pair.
pub fn pair() -> (LoopbackSender, LoopbackReceiver) {
    let (tx, rx) = channel::unbounded();
    (
        LoopbackSender {
            tx,
            sent: Arc::new(AtomicU64::new(0)),
        },
        LoopbackReceiver {
            rx,
            state: StateCell::new(),
        },
    )
}

#[derive(Debug, Clone)]
pub struct LoopbackSender {
    tx: Sender<Bytes>,
    sent: Arc<AtomicU64>,
}

impl LoopbackSender {
    /// Number of datagrams sent through this sender and its clones.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl PacketSender for LoopbackSender {
    fn send(&self, packet: &Packet) -> Result<()> {
        let bytes = packet.to_bytes();
        let size = bytes.len();
        self.tx.send(bytes).map_err(|_| TransportError::Closed)?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!(size, "loopback datagram queued");
        Ok(())
    }
}

#[derive(Debug)]
pub struct LoopbackReceiver {
    rx: Receiver<Bytes>,
    state: StateCell,
}

impl LoopbackReceiver {
    /// Datagrams waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl PacketReceiver for LoopbackReceiver {
    fn connect(&self) -> Result<()> {
        self.state.connect()
    }

    fn close(&self) {
        self.state.close();
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn receive_timeout(&self, timeout: Duration) -> Result<Option<Packet>> {
        self.state.ensure_connected()?;
        match self.rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(Some(Packet::decode(&bytes)?)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn try_receive(&self) -> Result<Option<Packet>> {
        self.state.ensure_connected()?;
        match self.rx.try_recv() {
            Ok(bytes) => Ok(Some(Packet::decode(&bytes)?)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }
}
