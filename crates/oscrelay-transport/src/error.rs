use std::net::SocketAddr;

use oscrelay_codec::CodecError;

/// Errors that can occur in datagram transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to send to the specified peer.
    #[error("failed to send to {peer}: {source}")]
    Send {
        peer: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A received datagram could not be decoded.
    #[error("malformed datagram: {0}")]
    Codec(#[from] CodecError),

    /// The encoded packet does not fit in a single datagram.
    #[error("datagram too large ({size} bytes, max {max})")]
    DatagramTooLarge { size: usize, max: usize },

    /// The receiver has not been connected yet.
    #[error("transport not connected")]
    NotConnected,

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
