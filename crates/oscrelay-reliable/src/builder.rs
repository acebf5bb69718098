use std::sync::Mutex;

use oscrelay_codec::{Bundle, Packet, TimeTag, ELEMENT_SIZE_PREFIX};
use tracing::{debug, warn};

use crate::error::Result;
use crate::lock;
use crate::sequence::{package_id_message, SequenceId};

/// Safe UDP payload on a 1500-byte Ethernet MTU (1500 - 20 IPv4 - 8 UDP).
pub const DEFAULT_MAX_PACKAGE_SIZE: usize = 1472;

/// Bytes kept free for the bundle header when budgeting a package.
pub const DEFAULT_HEADER_RESERVE: usize = 18;

/// How a builder turns added packets into transmitted bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Every packet goes out on its own, wrapped in a bundle. No ids, no retry.
    #[default]
    Immediate,
    /// Packets accumulate and go out as one untagged bundle per flush.
    Bundled,
    /// Like `Bundled`, but every bundle opens with an id-tag message.
    Packaged,
    /// Like `Packaged`, and the bundle is retransmitted until confirmed.
    PackagedAndQueued,
}

impl Mode {
    /// Whether bundles in this mode carry a sequence id.
    pub fn is_tagged(self) -> bool {
        matches!(self, Mode::Packaged | Mode::PackagedAndQueued)
    }

    /// Whether bundles in this mode wait for confirmation.
    pub fn is_queued(self) -> bool {
        self == Mode::PackagedAndQueued
    }
}

/// Configuration for a [`PackageBuilder`].
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// High 32 bits of every id this builder issues. Must differ between
    /// builders that share a transport.
    pub queue_identifier: u32,
    /// Largest encoded bundle the builder aims to emit. Default: 1472.
    pub max_package_size: usize,
    /// Bytes subtracted from `max_package_size` for the bundle header.
    pub header_reserve: usize,
    /// Initial mode.
    pub mode: Mode,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            queue_identifier: std::process::id(),
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
            header_reserve: DEFAULT_HEADER_RESERVE,
            mode: Mode::default(),
        }
    }
}

/// A bundle ready for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedBundle {
    /// Sequence id, present only for tagged modes.
    pub id: Option<SequenceId>,
    /// Mode the bundle was built under.
    pub mode: Mode,
    /// The bundle itself.
    pub packet: Packet,
}

type BundleCompleteHook = Box<dyn Fn(CompletedBundle) -> Result<()> + Send + Sync>;

/// The in-progress accumulation.
struct Pending {
    mode: Mode,
    packets: Vec<Packet>,
    /// Sum of element sizes including their size prefixes.
    size: usize,
    /// Id the current (or next) tagged bundle carries.
    next_id: SequenceId,
}

impl Pending {
    fn new(mode: Mode, first_id: SequenceId) -> Self {
        let mut pending = Self {
            mode,
            packets: Vec::new(),
            size: 0,
            next_id: first_id,
        };
        pending.reset();
        pending
    }

    fn header_len(&self) -> usize {
        usize::from(self.mode.is_tagged())
    }

    fn has_payload(&self) -> bool {
        self.packets.len() > self.header_len()
    }

    fn push(&mut self, packet: Packet) {
        self.size += ELEMENT_SIZE_PREFIX + packet.encoded_size();
        self.packets.push(packet);
    }

    /// Clear the accumulation and, in tagging modes, arm the id tag.
    fn reset(&mut self) {
        self.packets.clear();
        self.size = 0;
        if self.mode.is_tagged() {
            self.push(package_id_message(self.next_id, false).into());
        }
    }

    /// Take the pending bundle if it carries payload, then re-arm.
    ///
    /// The id advances only when a tagged bundle is actually emitted, so ids
    /// stay contiguous across empty flushes.
    fn take_bundle(&mut self) -> Option<CompletedBundle> {
        let completed = if self.has_payload() {
            let id = self.mode.is_tagged().then_some(self.next_id);
            if id.is_some() {
                self.next_id = self.next_id.next();
            }
            let packets = std::mem::take(&mut self.packets);
            Some(CompletedBundle {
                id,
                mode: self.mode,
                packet: Bundle::new(TimeTag::now(), packets).into(),
            })
        } else {
            None
        };
        self.reset();
        completed
    }
}

/// Accumulates outgoing packets into size-bounded, optionally tagged bundles.
///
/// Completed bundles are handed to the hook passed at construction. The hook
/// runs while the builder's lock is held, so bundles reach it in the order
/// they were completed; it must not call back into the same builder.
pub struct PackageBuilder {
    budget: usize,
    queue_identifier: u32,
    pending: Mutex<Pending>,
    on_complete: BundleCompleteHook,
}

impl PackageBuilder {
    /// Create a builder that reports every completed bundle to `on_complete`.
    pub fn new<F>(config: BuilderConfig, on_complete: F) -> Self
    where
        F: Fn(CompletedBundle) -> Result<()> + Send + Sync + 'static,
    {
        let first_id = SequenceId::new(config.queue_identifier, 0);
        Self {
            budget: config
                .max_package_size
                .saturating_sub(config.header_reserve),
            queue_identifier: config.queue_identifier,
            pending: Mutex::new(Pending::new(config.mode, first_id)),
            on_complete: Box::new(on_complete),
        }
    }

    pub fn queue_identifier(&self) -> u32 {
        self.queue_identifier
    }

    pub fn mode(&self) -> Mode {
        lock(&self.pending).mode
    }

    /// Id the next tagged bundle will carry.
    pub fn next_id(&self) -> SequenceId {
        lock(&self.pending).next_id
    }

    /// Encoded size of the pending elements, id tag included.
    pub fn pending_size(&self) -> usize {
        lock(&self.pending).size
    }

    /// Switch mode, flushing whatever is pending under the old mode first.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        let mut pending = lock(&self.pending);
        if pending.mode == mode {
            return Ok(());
        }
        let flushed = pending.take_bundle();
        let previous = pending.mode;
        pending.mode = mode;
        pending.reset();
        debug!(?previous, ?mode, "package mode changed");
        self.emit(flushed)
    }

    /// Add packets, flushing ahead of any packet that would overflow the
    /// size budget.
    ///
    /// A single packet larger than the budget is still appended and goes out
    /// in an oversized bundle. If the hook fails, the error is returned and
    /// packets after the failing one are not added.
    pub fn add<I>(&self, packets: I) -> Result<()>
    where
        I: IntoIterator<Item = Packet>,
    {
        let mut pending = lock(&self.pending);
        for packet in packets {
            if pending.mode == Mode::Immediate {
                let packet = match packet {
                    Packet::Bundle(_) => packet,
                    other => Bundle::new(TimeTag::now(), vec![other]).into(),
                };
                (self.on_complete)(CompletedBundle {
                    id: None,
                    mode: Mode::Immediate,
                    packet,
                })?;
                continue;
            }

            let size = ELEMENT_SIZE_PREFIX + packet.encoded_size();
            if pending.has_payload() && pending.size + size > self.budget {
                let full = pending.take_bundle();
                self.emit(full)?;
            }
            if pending.size + size > self.budget {
                warn!(
                    size,
                    budget = self.budget,
                    "packet exceeds the package budget on its own"
                );
            }
            pending.push(packet);
        }
        Ok(())
    }

    /// Emit the pending bundle if it carries payload.
    pub fn flush(&self) -> Result<()> {
        let mut pending = lock(&self.pending);
        let flushed = pending.take_bundle();
        self.emit(flushed)
    }

    fn emit(&self, completed: Option<CompletedBundle>) -> Result<()> {
        match completed {
            Some(bundle) => {
                debug!(
                    id = ?bundle.id,
                    mode = ?bundle.mode,
                    size = bundle.packet.encoded_size(),
                    "bundle complete"
                );
                (self.on_complete)(bundle)
            }
            None => Ok(()),
        }
    }
}
