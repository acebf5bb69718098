//! Acknowledged, deduplicated delivery of OSC-style packets over UDP.
//!
//! # Crate Structure
//!
//! - [`codec`]: Messages, bundles, time tags and their binary wire format
//! - [`transport`]: Packet sender/receiver traits with UDP and loopback implementations
//! - [`reliable`]: Package builder, retry queue and deduplicating listener
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use oscrelay::codec::{Arg, Message};
//! use oscrelay::reliable::{
//!     BuilderConfig, Mode, PackageListener, PackageQueue, QueueConfig, RETURN_ADDRESS,
//! };
//! use oscrelay::transport::UdpTransport;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let socket = UdpTransport::bind("0.0.0.0:0")?;
//! let queue = Arc::new(PackageQueue::new(
//!     socket.sender("127.0.0.1:9000".parse()?),
//!     QueueConfig {
//!         builder: BuilderConfig {
//!             mode: Mode::PackagedAndQueued,
//!             ..BuilderConfig::default()
//!         },
//!         ..QueueConfig::default()
//!     },
//! ));
//!
//! let confirmations = PackageListener::new(socket.receiver());
//! confirmations
//!     .dispatcher()
//!     .attach_handler(RETURN_ADDRESS, queue.return_handler());
//! confirmations.connect()?;
//!
//! queue.add([Message::new("/fader/1", vec![Arg::Float32(0.5)]).into()])?;
//! queue.flush()?;
//! while !queue.is_empty() {
//!     queue.pump()?;
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! # Ok(())
//! # }
//! ```

/// Re-export codec types.
pub mod codec {
    pub use oscrelay_codec::*;
}

/// Re-export transport types.
pub mod transport {
    pub use oscrelay_transport::*;
}

/// Re-export reliable-delivery types.
pub mod reliable {
    pub use oscrelay_reliable::*;
}
