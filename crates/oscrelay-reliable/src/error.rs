/// Errors that can occur in the reliable overlay.
///
/// Protocol-level outcomes (duplicate, expired, unmatched confirmation) are
/// not errors; they surface as return values and observer callbacks.
#[derive(Debug, thiserror::Error)]
pub enum ReliableError {
    /// Transport-level error, including malformed datagrams.
    #[error("transport error: {0}")]
    Transport(#[from] oscrelay_transport::TransportError),

    /// The dispatcher rejected a received packet.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// A message handler panicked on the receive thread.
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    /// The receive thread could not be started.
    #[error("failed to spawn receive thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReliableError>;
