use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use oscrelay_codec::{Arg, Message, Packet};
use oscrelay_reliable::{
    BuilderConfig, ListenerConfig, Mode, NoopObserver, PackageListener, PackageQueue, QueueConfig,
    SequenceId, SystemClock, RETURN_ADDRESS,
};
use oscrelay_transport::{loopback, UdpTransport};

const WAIT: Duration = Duration::from_secs(5);

fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn queued(queue_identifier: u32) -> QueueConfig {
    QueueConfig {
        builder: BuilderConfig {
            queue_identifier,
            mode: Mode::PackagedAndQueued,
            ..BuilderConfig::default()
        },
        retry_interval: Duration::from_millis(20),
    }
}

fn fast_listener() -> ListenerConfig {
    ListenerConfig {
        poll_interval: Duration::from_millis(5),
        ..ListenerConfig::default()
    }
}

/// A receiver that acknowledges and settles every package it handles, and a
/// sender that pumps until its queue drains.
#[test]
fn loopback_round_trip_confirms_every_package() {
    let (to_peer, peer_rx) = loopback::pair();
    let (to_origin, origin_rx) = loopback::pair();

    let origin = Arc::new(PackageQueue::new(to_peer, queued(11)));
    let origin_listener = PackageListener::from_parts(
        origin_rx,
        Arc::new(NoopObserver),
        Arc::new(SystemClock),
        fast_listener(),
    );
    origin_listener
        .dispatcher()
        .attach_handler(RETURN_ADDRESS, origin.return_handler());
    origin_listener.connect().expect("origin listener should connect");

    let replies = Arc::new(PackageQueue::new(
        to_origin,
        QueueConfig {
            builder: BuilderConfig {
                queue_identifier: 12,
                ..BuilderConfig::default()
            },
            ..QueueConfig::default()
        },
    ));
    let peer = Arc::new(PackageListener::from_parts(
        peer_rx,
        Arc::new(NoopObserver),
        Arc::new(SystemClock),
        fast_listener(),
    ));

    let received = Arc::new(Mutex::new(Vec::new()));
    let current = Arc::new(Mutex::new(None::<SequenceId>));
    {
        let current = Arc::clone(&current);
        peer.dispatcher()
            .attach(oscrelay_reliable::PACKAGE_ADDRESS, move |message| {
                *current.lock().unwrap() =
                    message.args[0].as_i64().map(|raw| SequenceId::from_raw(raw as u64));
            });
    }
    {
        let received = Arc::clone(&received);
        let current = Arc::clone(&current);
        let replies = Arc::clone(&replies);
        let weak_peer = Arc::downgrade(&peer);
        peer.dispatcher().attach("/value", move |message: &Message| {
            received.lock().unwrap().push(message.args[0].clone());
            if let Some(id) = *current.lock().unwrap() {
                if let Some(peer) = weak_peer.upgrade() {
                    peer.filter_packet(id, Some(Duration::from_secs(60)));
                }
                replies.send_return_message(id).unwrap();
            }
        });
    }
    peer.connect().expect("peer listener should connect");

    for n in 0..5 {
        origin.add([Message::new("/value", vec![Arg::Int32(n)]).into()]).unwrap();
        origin.flush().unwrap();
    }
    assert_eq!(origin.len(), 5);

    wait_for(|| {
        origin.pump().unwrap();
        origin.is_empty()
    });

    let received = received.lock().unwrap();
    let values: Vec<i64> = received.iter().filter_map(Arg::as_i64).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    for counter in 0..5 {
        assert!(peer.is_filtered(SequenceId::new(11, counter)));
    }

    peer.close();
    origin_listener.close();
}

/// Without settlement every retransmission is dispatched again.
#[test]
fn unsettled_retransmissions_reach_the_handler_again() {
    let (to_peer, peer_rx) = loopback::pair();
    let queue = PackageQueue::new(to_peer, queued(21));
    let listener = PackageListener::from_parts(
        peer_rx,
        Arc::new(NoopObserver),
        Arc::new(SystemClock),
        fast_listener(),
    );
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        listener.dispatcher().attach("/value", move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }
    listener.connect().expect("listener should connect");

    queue.add([Message::new("/value", vec![Arg::Int32(1)]).into()]).unwrap();
    queue.flush().unwrap();

    wait_for(|| {
        queue.pump().unwrap();
        hits.load(Ordering::SeqCst) >= 3
    });
    assert_eq!(queue.len(), 1);
    listener.close();
}

#[test]
fn udp_transport_carries_packages_and_confirmations() {
    let origin_socket = UdpTransport::bind("127.0.0.1:0").expect("origin should bind");
    let peer_socket = UdpTransport::bind("127.0.0.1:0").expect("peer should bind");

    let origin = Arc::new(PackageQueue::new(
        origin_socket.sender(peer_socket.local_addr()),
        queued(31),
    ));
    let origin_listener = PackageListener::from_parts(
        origin_socket.receiver(),
        Arc::new(NoopObserver),
        Arc::new(SystemClock),
        fast_listener(),
    );
    origin_listener
        .dispatcher()
        .attach_handler(RETURN_ADDRESS, origin.return_handler());
    origin_listener.connect().expect("origin listener should connect");

    let replies = Arc::new(PackageQueue::new(
        peer_socket.sender(origin_socket.local_addr()),
        QueueConfig::default(),
    ));
    let peer = PackageListener::from_parts(
        peer_socket.receiver(),
        Arc::new(NoopObserver),
        Arc::new(SystemClock),
        fast_listener(),
    );
    {
        let replies = Arc::clone(&replies);
        peer.dispatcher()
            .attach(oscrelay_reliable::PACKAGE_ADDRESS, move |message| {
                if let Some(raw) = message.args[0].as_i64() {
                    replies
                        .send_return_message(SequenceId::from_raw(raw as u64))
                        .unwrap();
                }
            });
    }
    peer.connect().expect("peer listener should connect");

    let payload: Vec<Packet> = (0..50)
        .map(|n| Message::new("/value", vec![Arg::Int32(n)]).into())
        .collect();
    origin.add(payload).unwrap();
    origin.flush().unwrap();
    assert!(!origin.is_empty());

    wait_for(|| {
        origin.pump().unwrap();
        origin.is_empty()
    });

    peer.close();
    origin_listener.close();
}
