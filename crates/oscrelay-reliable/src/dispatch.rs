use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use oscrelay_codec::{Message, Packet, TimeTag};
use tracing::trace;

use crate::sequence::is_reserved_address;

/// Callback invoked for every dispatched message with a matching address.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Token returned by [`Dispatcher::attach`], used to detach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// What the listener should do with a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Invoke,
    /// Nothing to deliver.
    DontInvoke,
    /// The packet is malformed for dispatch.
    HasError,
    /// The bundle is scheduled for later; ask again on a later tick.
    Postpone,
}

/// Result of dispatching one packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handler invocations performed.
    pub invoked: usize,
    /// Addresses that had no handler attached, in packet order.
    pub unknown: Vec<String>,
}

/// Exact-address message registry.
pub struct Dispatcher {
    handlers: RwLock<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Attach a closure to `address`.
    pub fn attach<F>(&self, address: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.attach_handler(address, Arc::new(handler))
    }

    pub fn attach_handler(&self, address: impl Into<String>, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let address = address.into();
        trace!(%address, ?id, "handler attached");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(address)
            .or_default()
            .push((id, handler));
        id
    }

    /// Detach one handler. Returns false if it was not attached to `address`.
    pub fn detach(&self, address: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(address) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(address);
        }
        removed
    }

    pub fn has_handlers(&self, address: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(address)
    }

    /// Decide whether `packet` can be dispatched at time `now`.
    ///
    /// Only the outermost bundle's timetag is considered for scheduling.
    pub fn should_invoke(&self, packet: &Packet, now: TimeTag) -> Disposition {
        if let Packet::Bundle(bundle) = packet {
            if bundle.is_empty() {
                return Disposition::DontInvoke;
            }
            if !bundle.timetag.is_immediate() && bundle.timetag > now {
                return Disposition::Postpone;
            }
        }
        if well_formed(packet) {
            Disposition::Invoke
        } else {
            Disposition::HasError
        }
    }

    /// Deliver every message in `packet` to its handlers, depth first.
    ///
    /// Handlers run outside the registry lock and may attach or detach.
    pub fn invoke(&self, packet: &Packet) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        self.invoke_into(packet, &mut outcome);
        outcome
    }

    fn invoke_into(&self, packet: &Packet, outcome: &mut DispatchOutcome) {
        match packet {
            Packet::Message(message) => {
                let matched: Vec<Handler> = self
                    .handlers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&message.address)
                    .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                    .unwrap_or_default();

                if matched.is_empty() {
                    if !is_reserved_address(&message.address) {
                        outcome.unknown.push(message.address.clone());
                    }
                    return;
                }
                for handler in matched {
                    handler(message);
                    outcome.invoked += 1;
                }
            }
            Packet::Bundle(bundle) => {
                for inner in &bundle.packets {
                    self.invoke_into(inner, outcome);
                }
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut addresses: Vec<&String> = handlers.keys().collect();
        addresses.sort();
        f.debug_struct("Dispatcher")
            .field("addresses", &addresses)
            .finish()
    }
}

fn well_formed(packet: &Packet) -> bool {
    match packet {
        Packet::Message(message) => message.address.starts_with('/'),
        Packet::Bundle(bundle) => bundle.packets.iter().all(well_formed),
    }
}
