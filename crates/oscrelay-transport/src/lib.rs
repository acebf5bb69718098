//! Datagram transport abstraction.
//!
//! Provides a unified interface for moving whole packets between peers:
//! - UDP sockets
//! - An in-memory loopback pair (same encode/decode path, no sockets)
//!
//! This is the lowest layer of oscrelay that performs I/O. The reliable
//! overlay only talks to the [`PacketSender`] and [`PacketReceiver`] traits.

pub mod error;
pub mod loopback;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use loopback::{LoopbackReceiver, LoopbackSender};
pub use traits::{ConnectionState, PacketReceiver, PacketSender};
pub use udp::{UdpReceiver, UdpSender, UdpTransport, MAX_DATAGRAM_SIZE};
