use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::bundle::Bundle;
use crate::codec::{Reader, BUNDLE_TAG, MAX_BUNDLE_DEPTH};
use crate::error::{CodecError, Result};
use crate::message::Message;

/// The unit carried by one datagram: a message or a bundle.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl Packet {
    /// Wire size of this packet in bytes.
    pub fn encoded_size(&self) -> usize {
        match self {
            Packet::Message(m) => m.encoded_size(),
            Packet::Bundle(b) => b.encoded_size(),
        }
    }

    /// Append the wire form to `dst` and return the number of bytes written.
    pub fn write_to(&self, dst: &mut BytesMut) -> usize {
        let start = dst.len();
        dst.reserve(self.encoded_size());
        self.write_into(dst);
        dst.len() - start
    }

    pub(crate) fn write_into(&self, dst: &mut BytesMut) {
        match self {
            Packet::Message(m) => m.write_to(dst),
            Packet::Bundle(b) => b.write_to(dst),
        }
    }

    /// Encode into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.write_into(&mut buf);
        buf.freeze()
    }

    /// Decode a complete datagram.
    ///
    /// Bundles nested deeper than [`MAX_BUNDLE_DEPTH`] are rejected.
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        let packet = Self::decode_nested(datagram, 0)?;
        trace!(size = datagram.len(), bundle = packet.is_bundle(), "decoded packet");
        Ok(packet)
    }

    /// Decode one packet found inside `depth` enclosing bundles.
    pub(crate) fn decode_nested(datagram: &[u8], depth: usize) -> Result<Self> {
        let mut reader = Reader::new(datagram);
        match datagram.first() {
            None => Err(CodecError::UnexpectedEof),
            Some(b'#') if datagram.starts_with(BUNDLE_TAG) => {
                if depth >= MAX_BUNDLE_DEPTH {
                    return Err(CodecError::NestingTooDeep {
                        max: MAX_BUNDLE_DEPTH,
                    });
                }
                Ok(Packet::Bundle(Bundle::decode(&mut reader, depth + 1)?))
            }
            Some(_) => Ok(Packet::Message(Message::decode(&mut reader)?)),
        }
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, Packet::Bundle(_))
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Packet::Message(m) => Some(m),
            Packet::Bundle(_) => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Packet::Bundle(b) => Some(b),
            Packet::Message(_) => None,
        }
    }
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Packet::Message(m)
    }
}

impl From<Bundle> for Packet {
    fn from(b: Bundle) -> Self {
        Packet::Bundle(b)
    }
}
