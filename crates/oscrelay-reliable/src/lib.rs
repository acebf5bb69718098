//! Reliable-delivery overlay for oscrelay transports.
//!
//! Turns a fire-and-forget datagram transport into an acknowledged,
//! idempotent delivery channel:
//!
//! - [`PackageBuilder`] accumulates packets into size-bounded bundles, tagging
//!   each with a [`SequenceId`] when the [`Mode`] asks for it.
//! - [`PackageQueue`] transmits completed bundles and, in
//!   [`Mode::PackagedAndQueued`], retransmits the oldest one on every
//!   [`PackageQueue::pump`] tick until the peer confirms it.
//! - [`PackageListener`] runs the receive thread, suppresses retransmissions of
//!   packages the application has declared settled, and dispatches the rest.
//!
//! Delivery is at-least-once. Deduplication is driven by the application
//! through [`PackageListener::filter_packet`]; the listener never marks a
//! package settled on its own.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod builder;
pub mod clock;
pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod queue;
pub mod sequence;

pub use builder::{
    BuilderConfig, CompletedBundle, Mode, PackageBuilder, DEFAULT_HEADER_RESERVE,
    DEFAULT_MAX_PACKAGE_SIZE,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dedup::{DedupTable, Expiry};
pub use dispatch::{DispatchOutcome, Dispatcher, Disposition, Handler, HandlerId};
pub use error::{ReliableError, Result};
pub use listener::{ListenerConfig, ListenerObserver, NoopObserver, PackageListener};
pub use queue::{PackageQueue, QueueConfig, RetryEntry, DEFAULT_RETRY_INTERVAL};
pub use sequence::{
    package_id, package_id_message, SequenceId, PACKAGE_ADDRESS, RETURN_ADDRESS,
};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// Every critical section in this crate leaves its data consistent before any
/// call that can panic, so the inner value is always safe to reuse.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
