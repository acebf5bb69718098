use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use oscrelay_codec::{Message, Packet};
use oscrelay_transport::PacketSender;
use tracing::{debug, trace};

use crate::builder::{BuilderConfig, CompletedBundle, Mode, PackageBuilder};
use crate::clock::{Clock, SystemClock};
use crate::dispatch::Handler;
use crate::error::Result;
use crate::lock;
use crate::sequence::{id_from_message, package_id_message, SequenceId, RETURN_ADDRESS};

/// Default pause between retransmissions of the retry head.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a [`PackageQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub builder: BuilderConfig,
    /// Minimum time between two transmissions of the retry head.
    pub retry_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            builder: BuilderConfig::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// A bundle awaiting confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEntry {
    pub id: SequenceId,
    pub packet: Packet,
}

#[derive(Debug)]
struct RetryState {
    entries: VecDeque<RetryEntry>,
    /// Last time the head was put on the wire.
    last_pump: Option<Instant>,
}

struct QueueCore<S> {
    sender: S,
    retry: Mutex<RetryState>,
    retry_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: PacketSender> QueueCore<S> {
    fn bundle_complete(&self, bundle: CompletedBundle) -> Result<()> {
        let id = match bundle.id {
            Some(id) if bundle.mode.is_queued() => id,
            _ => {
                trace!(id = ?bundle.id, mode = ?bundle.mode, "transmitting bundle");
                return Ok(self.sender.send(&bundle.packet)?);
            }
        };

        let mut retry = lock(&self.retry);
        retry.entries.push_back(RetryEntry {
            id,
            packet: bundle.packet,
        });
        debug!(%id, depth = retry.entries.len(), "package queued for confirmation");

        if retry.entries.len() > 1 {
            return Ok(());
        }
        retry.last_pump = Some(self.clock.now());
        let head = &retry.entries[0];
        Ok(self.sender.send(&head.packet)?)
    }

    fn pump(&self) -> Result<bool> {
        let mut retry = lock(&self.retry);
        if retry.entries.is_empty() {
            return Ok(false);
        }
        let now = self.clock.now();
        if let Some(last) = retry.last_pump {
            if now.saturating_duration_since(last) < self.retry_interval {
                return Ok(false);
            }
        }
        retry.last_pump = Some(now);
        let head = &retry.entries[0];
        trace!(id = %head.id, "retransmitting retry head");
        self.sender.send(&head.packet)?;
        Ok(true)
    }

    fn on_return_message(&self, message: &Message) -> bool {
        let Some(id) = id_from_message(message, RETURN_ADDRESS) else {
            return false;
        };
        let mut retry = lock(&self.retry);
        match retry.entries.front() {
            Some(head) if head.id == id => {
                retry.entries.pop_front();
                debug!(%id, remaining = retry.entries.len(), "package confirmed");
                true
            }
            _ => {
                trace!(%id, "confirmation does not match retry head");
                false
            }
        }
    }
}

/// Sends completed bundles and retries confirmed-delivery bundles until the
/// peer acknowledges them.
///
/// Only the oldest unconfirmed bundle is ever on the wire. Retransmission is
/// driven by the caller through [`PackageQueue::pump`]; confirmations arrive
/// through [`PackageQueue::on_return_message`], usually via a listener that
/// has [`PackageQueue::return_handler`] attached to [`RETURN_ADDRESS`].
pub struct PackageQueue<S> {
    builder: PackageBuilder,
    core: Arc<QueueCore<S>>,
}

impl<S: PacketSender + 'static> PackageQueue<S> {
    pub fn new(sender: S, config: QueueConfig) -> Self {
        Self::with_clock(sender, config, Arc::new(SystemClock))
    }

    /// Create a queue whose retry cadence follows `clock`.
    pub fn with_clock(sender: S, config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        let core = Arc::new(QueueCore {
            sender,
            retry: Mutex::new(RetryState {
                entries: VecDeque::new(),
                last_pump: None,
            }),
            retry_interval: config.retry_interval,
            clock,
        });
        let hook_core = Arc::clone(&core);
        let builder = PackageBuilder::new(config.builder, move |bundle| {
            hook_core.bundle_complete(bundle)
        });
        Self { builder, core }
    }

    /// Add packets to the pending package. See [`PackageBuilder::add`].
    pub fn add<I>(&self, packets: I) -> Result<()>
    where
        I: IntoIterator<Item = Packet>,
    {
        self.builder.add(packets)
    }

    pub fn flush(&self) -> Result<()> {
        self.builder.flush()
    }

    pub fn mode(&self) -> Mode {
        self.builder.mode()
    }

    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.builder.set_mode(mode)
    }

    /// Id the next tagged bundle will carry.
    pub fn next_id(&self) -> SequenceId {
        self.builder.next_id()
    }

    /// Retransmit the retry head if the retry interval has passed since it
    /// was last sent. Returns whether anything was transmitted.
    ///
    /// A failed send still counts as an attempt; the next try waits a full
    /// interval.
    pub fn pump(&self) -> Result<bool> {
        self.core.pump()
    }

    /// Dequeue the retry head if `message` confirms it.
    ///
    /// Confirmations for any other id are ignored and return false.
    pub fn on_return_message(&self, message: &Message) -> bool {
        self.core.on_return_message(message)
    }

    /// A dispatcher handler that feeds confirmations into this queue.
    pub fn return_handler(&self) -> Handler {
        let core = Arc::clone(&self.core);
        Arc::new(move |message: &Message| {
            core.on_return_message(message);
        })
    }

    /// Confirm package `id` to the peer that sent it.
    pub fn send_return_message(&self, id: SequenceId) -> Result<()> {
        trace!(%id, "sending confirmation");
        let message = Packet::from(package_id_message(id, true));
        Ok(self.core.sender.send(&message)?)
    }

    /// Number of bundles awaiting confirmation.
    pub fn len(&self) -> usize {
        lock(&self.core.retry).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.core.retry).entries.is_empty()
    }

    pub fn head_id(&self) -> Option<SequenceId> {
        lock(&self.core.retry).entries.front().map(|entry| entry.id)
    }

    /// Ids awaiting confirmation, oldest first.
    pub fn pending_ids(&self) -> Vec<SequenceId> {
        lock(&self.core.retry)
            .entries
            .iter()
            .map(|entry| entry.id)
            .collect()
    }

    pub fn sender(&self) -> &S {
        &self.core.sender
    }
}

#[cfg(test)]
mod tests {
    use oscrelay_codec::{Arg, Bundle, TimeTag};
    use oscrelay_transport::loopback::{self, LoopbackReceiver, LoopbackSender};
    use oscrelay_transport::{PacketReceiver, TransportError};

    use super::*;
    use crate::clock::ManualClock;
    use crate::sequence::package_id;

    fn msg(n: i32) -> Packet {
        Message::new("/value", vec![Arg::Int32(n)]).into()
    }

    fn queue(mode: Mode) -> (PackageQueue<LoopbackSender>, LoopbackReceiver, Arc<ManualClock>) {
        let (tx, rx) = loopback::pair();
        rx.connect().unwrap();
        let clock = Arc::new(ManualClock::new());
        let config = QueueConfig {
            builder: BuilderConfig {
                queue_identifier: 7,
                mode,
                ..BuilderConfig::default()
            },
            retry_interval: Duration::from_millis(100),
        };
        let queue = PackageQueue::with_clock(tx, config, clock.clone());
        (queue, rx, clock)
    }

    fn drain(rx: &LoopbackReceiver) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = rx.try_receive().unwrap() {
            packets.push(packet);
        }
        packets
    }

    fn confirmation(id: SequenceId) -> Message {
        package_id_message(id, true)
    }

    #[test]
    fn unqueued_modes_send_without_retry() {
        for mode in [Mode::Immediate, Mode::Bundled, Mode::Packaged] {
            let (queue, rx, clock) = queue(mode);
            queue.add([msg(1)]).unwrap();
            queue.flush().unwrap();
            assert_eq!(drain(&rx).len(), 1, "{mode:?}");

            clock.advance(Duration::from_secs(1));
            assert!(!queue.pump().unwrap());
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn head_is_sent_immediately_and_second_waits() {
        let (queue, rx, clock) = queue(Mode::PackagedAndQueued);

        queue.add([msg(1)]).unwrap();
        queue.flush().unwrap();
        let first = drain(&rx);
        assert_eq!(first.len(), 1);
        assert_eq!(package_id(&first[0]), Some(SequenceId::new(7, 0)));

        queue.add([msg(2)]).unwrap();
        queue.flush().unwrap();
        assert!(drain(&rx).is_empty());
        assert_eq!(queue.len(), 2);

        // Retries keep resending the head, never the second entry.
        clock.advance(Duration::from_millis(150));
        assert!(queue.pump().unwrap());
        let resent = drain(&rx);
        assert_eq!(resent.len(), 1);
        assert_eq!(package_id(&resent[0]), Some(SequenceId::new(7, 0)));

        assert!(queue.on_return_message(&confirmation(SequenceId::new(7, 0))));
        clock.advance(Duration::from_millis(150));
        assert!(queue.pump().unwrap());
        let next = drain(&rx);
        assert_eq!(package_id(&next[0]), Some(SequenceId::new(7, 1)));
    }

    #[test]
    fn retry_cadence_follows_interval() {
        let (queue, rx, clock) = queue(Mode::PackagedAndQueued);
        queue.add([msg(1)]).unwrap();
        queue.flush().unwrap();
        assert_eq!(drain(&rx).len(), 1);

        clock.advance(Duration::from_millis(50));
        assert!(!queue.pump().unwrap());
        assert!(drain(&rx).is_empty());

        clock.advance(Duration::from_millis(60));
        assert!(queue.pump().unwrap());
        assert_eq!(drain(&rx).len(), 1);

        // The interval restarts from the retransmission.
        assert!(!queue.pump().unwrap());
    }

    #[test]
    fn only_head_confirmation_dequeues() {
        let (queue, _rx, _clock) = queue(Mode::PackagedAndQueued);
        queue.add([msg(1)]).unwrap();
        queue.flush().unwrap();
        queue.add([msg(2)]).unwrap();
        queue.flush().unwrap();

        let a = SequenceId::new(7, 0);
        let b = SequenceId::new(7, 1);
        assert_eq!(queue.pending_ids(), vec![a, b]);

        assert!(!queue.on_return_message(&confirmation(b)));
        assert_eq!(queue.pending_ids(), vec![a, b]);

        assert!(queue.on_return_message(&confirmation(a)));
        assert_eq!(queue.pending_ids(), vec![b]);
        assert_eq!(queue.head_id(), Some(b));
    }

    #[test]
    fn non_confirmation_messages_are_ignored() {
        let (queue, _rx, _clock) = queue(Mode::PackagedAndQueued);
        queue.add([msg(1)]).unwrap();
        queue.flush().unwrap();

        let wrong_address = package_id_message(SequenceId::new(7, 0), false);
        assert!(!queue.on_return_message(&wrong_address));
        assert!(!queue.on_return_message(&Message::new(RETURN_ADDRESS, vec![])));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn return_handler_dequeues_from_another_thread() {
        let (queue, _rx, _clock) = queue(Mode::PackagedAndQueued);
        queue.add([msg(1)]).unwrap();
        queue.flush().unwrap();

        let handler = queue.return_handler();
        let ack = confirmation(SequenceId::new(7, 0));
        std::thread::spawn(move || handler(&ack)).join().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn send_return_message_carries_the_id() {
        let (queue, rx, _clock) = queue(Mode::Immediate);
        let id = SequenceId::new(9, 4);
        queue.send_return_message(id).unwrap();

        let sent = drain(&rx);
        assert_eq!(sent.len(), 1);
        let message = sent[0].as_message().unwrap();
        assert_eq!(id_from_message(message, RETURN_ADDRESS), Some(id));
    }

    #[test]
    fn failed_send_keeps_the_entry() {
        let (tx, rx) = loopback::pair();
        drop(rx);
        let clock = Arc::new(ManualClock::new());
        let config = QueueConfig {
            builder: BuilderConfig {
                queue_identifier: 1,
                mode: Mode::PackagedAndQueued,
                ..BuilderConfig::default()
            },
            ..QueueConfig::default()
        };
        let queue = PackageQueue::with_clock(tx, config, clock.clone());

        queue.add([msg(1)]).unwrap();
        let err = queue.flush().unwrap_err();
        assert!(matches!(
            err,
            crate::ReliableError::Transport(TransportError::Closed)
        ));
        assert_eq!(queue.len(), 1);

        clock.advance(DEFAULT_RETRY_INTERVAL);
        assert!(queue.pump().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn queued_bundles_keep_the_tag_first() {
        let (queue, rx, _clock) = queue(Mode::PackagedAndQueued);
        let nested = Packet::from(Bundle::new(TimeTag::IMMEDIATE, vec![msg(5)]));
        queue.add([msg(1), nested]).unwrap();
        queue.flush().unwrap();

        let sent = drain(&rx);
        let bundle = sent[0].as_bundle().unwrap();
        assert_eq!(bundle.len(), 3);
        assert_eq!(package_id(&sent[0]), queue.head_id());
    }
}
