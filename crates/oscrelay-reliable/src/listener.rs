use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use oscrelay_codec::{Packet, TimeTag};
use oscrelay_transport::{ConnectionState, PacketReceiver, TransportError};
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::dedup::{DedupTable, Expiry};
use crate::dispatch::{Dispatcher, Disposition};
use crate::error::{ReliableError, Result};
use crate::lock;
use crate::sequence::{package_id, SequenceId};

/// Callbacks raised by a [`PackageListener`].
///
/// Everything except [`ListenerObserver::package_expired`] runs on the
/// receive thread, in receive order. `package_expired` runs on whichever
/// thread calls [`PackageListener::expunge`].
pub trait ListenerObserver: Send + Sync {
    /// Every packet taken off the transport, before deduplication.
    fn packet_received(&self, _packet: &Packet) {}

    /// A retransmission of a package already declared settled was suppressed.
    fn package_confirmed(&self, _id: SequenceId) {}

    /// A dedup record passed its expiry and was swept.
    fn package_expired(&self, _id: SequenceId) {}

    /// A dispatched message had no handler.
    fn unknown_address(&self, _address: &str) {}

    /// The receive loop hit an error. The loop keeps running unless the
    /// transport reported itself closed.
    fn inner_error(&self, _error: &ReliableError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ListenerObserver for NoopObserver {}

/// Configuration for a [`PackageListener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Upper bound on one blocking receive; also the cadence at which
    /// postponed bundles are re-checked and `close` is noticed.
    pub poll_interval: Duration,
    pub thread_name: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            thread_name: "oscrelay-listener".to_string(),
        }
    }
}

struct ListenerCore<R> {
    receiver: R,
    dispatcher: Dispatcher,
    dedup: Mutex<DedupTable>,
    observer: Arc<dyn ListenerObserver>,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
    config: ListenerConfig,
}

impl<R: PacketReceiver> ListenerCore<R> {
    fn run(&self) {
        debug!(thread = %self.config.thread_name, "receive loop started");
        let mut postponed: Vec<Packet> = Vec::new();

        while self.running.load(Ordering::Acquire) {
            self.release_postponed(&mut postponed);

            match self.receiver.receive_timeout(self.config.poll_interval) {
                Ok(Some(packet)) => self.handle(packet, &mut postponed),
                Ok(None) => {}
                Err(err) => {
                    if !self.running.load(Ordering::Acquire)
                        || self.receiver.state() != ConnectionState::Connected
                    {
                        break;
                    }
                    let closed = matches!(err, TransportError::Closed);
                    let io = matches!(err, TransportError::Io(_));
                    self.report(err.into());
                    if closed {
                        break;
                    }
                    // A socket error can repeat on every call; wait out one poll.
                    if io {
                        thread::sleep(self.config.poll_interval);
                    }
                }
            }
        }

        if !postponed.is_empty() {
            debug!(dropped = postponed.len(), "discarding postponed bundles");
        }
        debug!(thread = %self.config.thread_name, "receive loop stopped");
    }

    fn handle(&self, packet: Packet, postponed: &mut Vec<Packet>) {
        trace!(size = packet.encoded_size(), "packet received");
        self.observer.packet_received(&packet);

        if !self.should_process_package(&packet) {
            return;
        }
        match self.dispatcher.should_invoke(&packet, TimeTag::now()) {
            Disposition::Invoke => self.dispatch(&packet),
            Disposition::DontInvoke => {}
            Disposition::HasError => {
                self.report(ReliableError::InvalidPacket(
                    "message address must start with '/'".to_string(),
                ));
            }
            Disposition::Postpone => {
                trace!("bundle scheduled for later");
                postponed.push(packet);
            }
        }
    }

    fn release_postponed(&self, postponed: &mut Vec<Packet>) {
        if postponed.is_empty() {
            return;
        }
        let now = TimeTag::now();
        let (due, waiting): (Vec<Packet>, Vec<Packet>) = std::mem::take(postponed)
            .into_iter()
            .partition(|packet| self.dispatcher.should_invoke(packet, now) != Disposition::Postpone);
        *postponed = waiting;
        for packet in due {
            self.dispatch(&packet);
        }
    }

    fn dispatch(&self, packet: &Packet) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatcher.invoke(packet))) {
            Ok(outcome) => {
                trace!(
                    handlers = outcome.invoked,
                    unknown = outcome.unknown.len(),
                    "packet dispatched"
                );
                for address in &outcome.unknown {
                    self.observer.unknown_address(address);
                }
            }
            Err(payload) => {
                self.report(ReliableError::HandlerPanicked(panic_message(payload.as_ref())));
            }
        }
    }

    fn should_process_package(&self, packet: &Packet) -> bool {
        let Some(id) = package_id(packet) else {
            return true;
        };
        let settled = lock(&self.dedup).contains_live(id, self.clock.now());
        if settled {
            trace!(%id, "suppressing settled package");
            self.observer.package_confirmed(id);
        }
        !settled
    }

    fn report(&self, error: ReliableError) {
        warn!(%error, "receive loop error");
        self.observer.inner_error(&error);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Receives packets on a dedicated thread, suppresses retransmissions of
/// settled packages, and dispatches the rest.
///
/// A package is settled once the application calls
/// [`PackageListener::filter_packet`] for its id. Until then every
/// retransmission is dispatched again.
pub struct PackageListener<R: PacketReceiver + 'static> {
    core: Arc<ListenerCore<R>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<R: PacketReceiver + 'static> PackageListener<R> {
    pub fn new(receiver: R) -> Self {
        Self::with_observer(receiver, Arc::new(NoopObserver))
    }

    pub fn with_observer(receiver: R, observer: Arc<dyn ListenerObserver>) -> Self {
        Self::from_parts(
            receiver,
            observer,
            Arc::new(SystemClock),
            ListenerConfig::default(),
        )
    }

    pub fn from_parts(
        receiver: R,
        observer: Arc<dyn ListenerObserver>,
        clock: Arc<dyn Clock>,
        config: ListenerConfig,
    ) -> Self {
        Self {
            core: Arc::new(ListenerCore {
                receiver,
                dispatcher: Dispatcher::new(),
                dedup: Mutex::new(DedupTable::new()),
                observer,
                clock,
                running: AtomicBool::new(false),
                config,
            }),
            handle: Mutex::new(None),
        }
    }

    /// Handler registry used by the receive thread.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.core.dispatcher
    }

    pub fn receiver(&self) -> &R {
        &self.core.receiver
    }

    /// Connect the receiver and start the receive thread.
    ///
    /// Calling this while already running does nothing. A closed listener
    /// cannot be restarted if its receiver refuses to reconnect.
    pub fn connect(&self) -> Result<()> {
        let mut handle = lock(&self.handle);
        if handle.is_some() {
            return Ok(());
        }
        self.core.receiver.connect()?;
        self.core.running.store(true, Ordering::Release);

        let core = Arc::clone(&self.core);
        let spawned = thread::Builder::new()
            .name(self.core.config.thread_name.clone())
            .spawn(move || core.run());
        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(err) => {
                self.core.running.store(false, Ordering::Release);
                self.core.receiver.close();
                Err(ReliableError::Spawn(err))
            }
        }
    }

    /// Stop the receive thread and close the receiver.
    ///
    /// Blocks until the thread has exited, so no handler or observer runs
    /// after this returns. Idempotent. Called from a handler on the receive
    /// thread itself, it stops the loop without waiting for it; the thread
    /// stays joinable, so a later `close` from another thread still waits
    /// for that handler to return.
    pub fn close(&self) {
        self.core.running.store(false, Ordering::Release);
        self.core.receiver.close();

        let join = {
            let mut handle = lock(&self.handle);
            let on_receive_thread = handle
                .as_ref()
                .is_some_and(|join| join.thread().id() == thread::current().id());
            if on_receive_thread {
                return;
            }
            handle.take()
        };
        if let Some(join) = join {
            if join.join().is_err() {
                warn!("receive thread panicked");
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
            && self.core.receiver.state() == ConnectionState::Connected
    }

    /// False if `packet` is a tagged bundle whose id is settled and not yet
    /// expired; raises [`ListenerObserver::package_confirmed`] in that case.
    pub fn should_process_package(&self, packet: &Packet) -> bool {
        self.core.should_process_package(packet)
    }

    /// Declare package `id` settled for `ttl` (forever if `None`).
    ///
    /// Later retransmissions of it are suppressed instead of dispatched.
    pub fn filter_packet(&self, id: SequenceId, ttl: Option<Duration>) {
        let expiry = Expiry::after(self.core.clock.now(), ttl);
        trace!(%id, ?expiry, "package settled");
        lock(&self.core.dedup).register(id, expiry);
    }

    /// Sweep expired dedup records, raising
    /// [`ListenerObserver::package_expired`] for each.
    pub fn expunge(&self) -> Vec<SequenceId> {
        let now = self.core.clock.now();
        let expired = lock(&self.core.dedup).take_expired(now);
        for id in &expired {
            self.core.observer.package_expired(*id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "dedup records expired");
        }
        expired
    }

    /// Forget a dedup record without raising any callback.
    pub fn cancel(&self, id: SequenceId) -> bool {
        lock(&self.core.dedup).remove(id)
    }

    /// Whether `id` is currently suppressed.
    pub fn is_filtered(&self, id: SequenceId) -> bool {
        lock(&self.core.dedup).contains_live(id, self.core.clock.now())
    }
}

impl<R: PacketReceiver + 'static> Drop for PackageListener<R> {
    fn drop(&mut self) {
        self.close();
    }
}
