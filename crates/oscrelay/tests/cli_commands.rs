#![cfg(feature = "cli")]

use std::net::UdpSocket;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use oscrelay::codec::{Message, Packet};
use oscrelay::reliable::{package_id, package_id_message, PACKAGE_ADDRESS};

fn oscrelay() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_oscrelay"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn local_socket() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("socket should bind");
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout should be settable");
    socket
}

fn receive(socket: &UdpSocket) -> (Packet, std::net::SocketAddr) {
    let mut buf = vec![0u8; 65_536];
    let (len, from) = socket.recv_from(&mut buf).expect("datagram should arrive");
    (
        Packet::decode(&buf[..len]).expect("datagram should decode"),
        from,
    )
}

#[test]
fn version_prints_crate_version() {
    let output = oscrelay()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with(&format!("oscrelay {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn bundled_send_emits_one_bundle() {
    let peer = local_socket();
    let addr = peer.local_addr().expect("peer should have an address");

    let output = oscrelay()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(addr.to_string())
        .arg("/fader/1, 0.5f")
        .arg("/label, \"left, right\"")
        .output()
        .expect("send should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"mode\":\"bundled\""));
    assert!(stdout.contains("\"packets\":2"));

    let (packet, _) = receive(&peer);
    let bundle = packet.as_bundle().expect("bundled mode sends a bundle");
    assert_eq!(bundle.len(), 2);
    assert_eq!(package_id(&packet), None);
    let label: &Message = bundle.packets[1].as_message().expect("second is a message");
    assert_eq!(label.args[0].as_str(), Some("left, right"));
}

#[test]
fn queued_send_retries_until_confirmed() {
    let peer = local_socket();
    let addr = peer.local_addr().expect("peer should have an address");

    let child = oscrelay()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(addr.to_string())
        .arg("--mode")
        .arg("queued")
        .arg("--queue-id")
        .arg("7")
        .arg("--retry-interval")
        .arg("20ms")
        .arg("/ping")
        .stdout(Stdio::piped())
        .spawn()
        .expect("send should start");

    // Ignore the first transmission so the retry path runs.
    let (first, _) = receive(&peer);
    let (retry, from) = receive(&peer);
    let id = package_id(&first).expect("queued packages are tagged");
    assert_eq!(package_id(&retry), Some(id));
    assert_eq!(id.queue_identifier(), 7);

    let ack = Packet::from(package_id_message(id, true)).to_bytes();
    peer.send_to(&ack, from).expect("confirmation should send");

    let output = child.wait_with_output().expect("send should finish");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("\"confirmed\":true"));
}

#[test]
fn queued_send_without_confirmation_times_out() {
    let peer = local_socket();
    let addr = peer.local_addr().expect("peer should have an address");

    let output = oscrelay()
        .arg("send")
        .arg(addr.to_string())
        .arg("--mode")
        .arg("queued")
        .arg("--timeout")
        .arg("200ms")
        .arg("/ping")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn invalid_message_is_a_data_error() {
    let output = oscrelay()
        .arg("send")
        .arg("127.0.0.1:9")
        .arg("no-leading-slash")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid message"));
}

#[test]
fn listen_confirms_packages_and_exits_after_count() {
    let probe = UdpSocket::bind("127.0.0.1:0").expect("probe should bind");
    let listen_addr = probe.local_addr().expect("probe should have an address");
    drop(probe);

    let sender = local_socket();
    let sender_addr = sender.local_addr().expect("sender should have an address");

    let child = oscrelay()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(listen_addr.to_string())
        .arg("--reply-to")
        .arg(sender_addr.to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .spawn()
        .expect("listen should start");

    let id = oscrelay::reliable::SequenceId::new(3, 0);
    let package = Packet::from(oscrelay::codec::Bundle::new(
        oscrelay::codec::TimeTag::IMMEDIATE,
        vec![
            package_id_message(id, false).into(),
            Message::new("/hello", vec![]).into(),
        ],
    ))
    .to_bytes();

    // The listener may not be bound yet; resend until it confirms.
    let mut confirmation = None;
    for _ in 0..50 {
        sender
            .send_to(&package, listen_addr)
            .expect("package should send");
        sender
            .set_read_timeout(Some(Duration::from_millis(100)))
            .expect("read timeout should be settable");
        let mut buf = vec![0u8; 1024];
        if let Ok((len, _)) = sender.recv_from(&mut buf) {
            confirmation = Some(Packet::decode(&buf[..len]).expect("confirmation should decode"));
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }

    let confirmation = confirmation.expect("listener should confirm the package");
    let message = confirmation.as_message().expect("confirmation is a message");
    assert_ne!(message.address, PACKAGE_ADDRESS);
    assert_eq!(message.args[0].as_i64(), Some(id.raw() as i64));

    let output = child.wait_with_output().expect("listen should exit");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("/hello"));
}
