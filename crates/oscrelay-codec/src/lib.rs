//! OSC 1.0 packet codec.
//!
//! Every datagram carries exactly one packet, which is either:
//! - a message: an address string, a type-tag string and typed arguments
//! - a bundle: the `#bundle` marker, a 64-bit NTP time tag and a sequence of
//!   size-prefixed packets (which may themselves be bundles)
//!
//! Packets are immutable values. Their encoded size is known without encoding,
//! which is what the reliable overlay uses to keep bundles under a datagram
//! ceiling.

pub mod arg;
pub mod bundle;
pub mod codec;
pub mod error;
pub mod message;
pub mod packet;
pub mod timetag;

pub use arg::Arg;
pub use bundle::Bundle;
pub use codec::{BUNDLE_HEADER_SIZE, BUNDLE_TAG, ELEMENT_SIZE_PREFIX, MAX_BUNDLE_DEPTH};
pub use error::{CodecError, Result};
pub use message::Message;
pub use packet::Packet;
pub use timetag::TimeTag;
