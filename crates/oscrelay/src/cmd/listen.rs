use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use oscrelay_codec::{Message, Packet};
use oscrelay_reliable::sequence::id_from_message;
use oscrelay_reliable::{
    ListenerObserver, Mode, PackageListener, PackageQueue, QueueConfig, ReliableError, SequenceId,
    PACKAGE_ADDRESS,
};
use oscrelay_transport::{UdpReceiver, UdpSender, UdpTransport};
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, ListenArgs};
use crate::exit::{reliable_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_packet, OutputFormat};

/// How often the main loop wakes to check for Ctrl-C and sweep expired records.
const TICK: Duration = Duration::from_millis(100);

enum Event {
    Packet(Packet),
    Duplicate(SequenceId),
    Failed(String),
}

/// Forwards receive-thread callbacks to the printing thread.
struct Forwarder(Sender<Event>);

impl ListenerObserver for Forwarder {
    fn packet_received(&self, packet: &Packet) {
        let _ = self.0.send(Event::Packet(packet.clone()));
    }

    fn package_confirmed(&self, id: SequenceId) {
        let _ = self.0.send(Event::Duplicate(id));
    }

    fn package_expired(&self, id: SequenceId) {
        debug!(%id, "package no longer suppressed");
    }

    fn inner_error(&self, error: &ReliableError) {
        let _ = self.0.send(Event::Failed(error.to_string()));
    }
}

type Replies = Arc<PackageQueue<UdpSender>>;

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let filter_ttl = parse_duration(&args.filter_ttl)?;
    let socket = UdpTransport::bind(args.bind).map_err(|err| transport_error("bind failed", err))?;
    info!(addr = %socket.local_addr(), "listening");

    let (events_tx, events) = channel::unbounded();
    let listener = Arc::new(PackageListener::with_observer(
        socket.receiver(),
        Arc::new(Forwarder(events_tx)),
    ));

    let replies: Option<Replies> = args.reply_to.map(|peer| {
        Arc::new(PackageQueue::new(
            socket.sender(peer),
            QueueConfig {
                builder: oscrelay_reliable::BuilderConfig {
                    mode: Mode::Immediate,
                    ..Default::default()
                },
                ..QueueConfig::default()
            },
        ))
    });
    if let Some(replies) = &replies {
        attach_settler(&listener, Arc::downgrade(&listener), replies.clone(), filter_ttl);
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    listener
        .connect()
        .map_err(|err| reliable_error("listen failed", err))?;

    let mut printed = 0usize;
    let mut last_sweep = Instant::now();
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(TICK) {
            Ok(Event::Packet(packet)) => {
                print_packet(&packet, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Ok(Event::Duplicate(id)) => {
                debug!(%id, "retransmission suppressed");
                // The earlier confirmation was lost; the sender is still waiting.
                if let Some(replies) = &replies {
                    confirm(replies, id);
                }
            }
            Ok(Event::Failed(message)) => warn!(%message, "receive error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if last_sweep.elapsed() >= TICK {
            listener.expunge();
            last_sweep = Instant::now();
        }
    }

    listener.close();
    Ok(SUCCESS)
}

/// Settle and confirm every package as soon as its tag is dispatched.
fn attach_settler(
    listener: &PackageListener<UdpReceiver>,
    weak: Weak<PackageListener<UdpReceiver>>,
    replies: Replies,
    ttl: Duration,
) {
    listener
        .dispatcher()
        .attach(PACKAGE_ADDRESS, move |message: &Message| {
            let Some(id) = id_from_message(message, PACKAGE_ADDRESS) else {
                return;
            };
            if let Some(listener) = weak.upgrade() {
                listener.filter_packet(id, Some(ttl));
            }
            confirm(&replies, id);
        });
}

fn confirm(replies: &PackageQueue<UdpSender>, id: SequenceId) {
    if let Err(err) = replies.send_return_message(id) {
        warn!(%id, error = %err, "confirmation failed");
    }
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
