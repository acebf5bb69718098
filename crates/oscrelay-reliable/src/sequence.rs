use std::fmt;

use oscrelay_codec::{Arg, Message, Packet};

/// Reserved address of the id-tag message that opens every tagged bundle.
pub const PACKAGE_ADDRESS: &str = "/_package";

/// Reserved address of the confirmation sent back for a settled package.
pub const RETURN_ADDRESS: &str = "/_package/return";

/// Identifier of one package: queue identifier in the high 32 bits, package
/// counter in the low 32 bits.
///
/// The counter wraps after 2^32 packages from one builder; ids are only
/// unique within that window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceId(u64);

impl SequenceId {
    pub const fn new(queue_identifier: u32, counter: u32) -> Self {
        Self(((queue_identifier as u64) << 32) | counter as u64)
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn queue_identifier(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn counter(self) -> u32 {
        self.0 as u32
    }

    /// The id following this one from the same queue.
    pub const fn next(self) -> Self {
        Self::new(self.queue_identifier(), self.counter().wrapping_add(1))
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:{}", self.queue_identifier(), self.counter())
    }
}

/// Build the id-tag message (`is_return == false`) or the confirmation
/// message (`is_return == true`) for `id`.
pub fn package_id_message(id: SequenceId, is_return: bool) -> Message {
    let address = if is_return {
        RETURN_ADDRESS
    } else {
        PACKAGE_ADDRESS
    };
    Message::new(address, vec![Arg::Int64(id.raw() as i64)])
}

/// The id carried by `message` if it is addressed to `address` and has the
/// single integer argument the tag convention requires.
pub fn id_from_message(message: &Message, address: &str) -> Option<SequenceId> {
    if message.address != address {
        return None;
    }
    match message.args.as_slice() {
        [arg] => arg.as_i64().map(|raw| SequenceId::from_raw(raw as u64)),
        _ => None,
    }
}

/// The id of a tagged bundle, i.e. one whose first element is an id-tag
/// message.
pub fn package_id(packet: &Packet) -> Option<SequenceId> {
    let first = packet.as_bundle()?.packets.first()?.as_message()?;
    id_from_message(first, PACKAGE_ADDRESS)
}

pub(crate) fn is_reserved_address(address: &str) -> bool {
    address == PACKAGE_ADDRESS || address == RETURN_ADDRESS
}
