use bytes::{BufMut, BytesMut};

use crate::codec::{Reader, BUNDLE_HEADER_SIZE, BUNDLE_TAG, ELEMENT_SIZE_PREFIX};
use crate::error::{CodecError, Result};
use crate::packet::Packet;
use crate::timetag::TimeTag;

/// A time-tagged container of packets. A bundle is itself a packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    /// When the contents should take effect.
    pub timetag: TimeTag,
    /// Contained packets in wire order.
    pub packets: Vec<Packet>,
}

impl Bundle {
    /// Create a bundle.
    pub fn new(timetag: TimeTag, packets: Vec<Packet>) -> Self {
        Self { timetag, packets }
    }

    /// Wire size: header plus every element with its size prefix.
    pub fn encoded_size(&self) -> usize {
        BUNDLE_HEADER_SIZE
            + self
                .packets
                .iter()
                .map(|p| ELEMENT_SIZE_PREFIX + p.encoded_size())
                .sum::<usize>()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub(crate) fn write_to(&self, dst: &mut BytesMut) {
        dst.put_slice(BUNDLE_TAG);
        dst.put_u64(self.timetag.raw());
        for packet in &self.packets {
            dst.put_u32(packet.encoded_size() as u32);
            packet.write_into(dst);
        }
    }

    /// Decode a bundle that sits at nesting level `depth`.
    pub(crate) fn decode(reader: &mut Reader<'_>, depth: usize) -> Result<Self> {
        if reader.take(BUNDLE_TAG.len())? != BUNDLE_TAG {
            return Err(CodecError::InvalidAddress("#bundle".to_string()));
        }
        let timetag = TimeTag::from_raw(reader.read_u64()?);

        let mut packets = Vec::new();
        while !reader.is_empty() {
            let size = reader.read_i32()?;
            let remaining = reader.remaining();
            if size < 0 || size as usize > remaining {
                return Err(CodecError::InvalidElementSize { size, remaining });
            }
            let element = reader.take(size as usize)?;
            packets.push(Packet::decode_nested(element, depth)?);
        }

        Ok(Self { timetag, packets })
    }
}
