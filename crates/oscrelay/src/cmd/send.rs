use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use oscrelay_codec::{Message, Packet};
use oscrelay_reliable::{
    BuilderConfig, ListenerConfig, NoopObserver, PackageListener, PackageQueue, QueueConfig,
    SequenceId, SystemClock, RETURN_ADDRESS,
};
use oscrelay_transport::{PacketSender, UdpTransport};
use tracing::{debug, info};

use crate::cmd::{parse_duration, ModeArg, SendArgs};
use crate::exit::{codec_error, reliable_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_send_report, OutputFormat, SendReport};

/// Sleep between pump ticks while waiting for confirmations.
const PUMP_TICK: Duration = Duration::from_millis(5);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let retry_interval = parse_duration(&args.retry_interval)?;
    let timeout = parse_duration(&args.timeout)?;
    let packets = parse_messages(&args.messages)?;

    let socket = UdpTransport::bind(args.bind).map_err(|err| transport_error("bind failed", err))?;
    let mut builder = BuilderConfig {
        mode: args.mode.into(),
        max_package_size: args.max_package_size,
        ..BuilderConfig::default()
    };
    if let Some(queue_id) = args.queue_id {
        builder.queue_identifier = queue_id;
    }
    let queue = PackageQueue::new(
        socket.sender(args.peer),
        QueueConfig {
            builder,
            retry_interval,
        },
    );

    // Confirmations come back to the socket the packages left from.
    let confirmations = (args.mode == ModeArg::Queued)
        .then(|| start_confirmation_listener(&socket, &queue))
        .transpose()?;

    let first_id = queue.next_id();
    let count = packets.len();
    queue
        .add(packets)
        .and_then(|()| queue.flush())
        .map_err(|err| reliable_error("send failed", err))?;
    let packages = issued_ids(first_id, queue.next_id());
    debug!(packets = count, packages = packages.len(), "messages handed to transport");

    let confirmed = match &confirmations {
        Some(_) => wait_for_confirmation(&queue, timeout)?,
        None => false,
    };
    if let Some(listener) = confirmations {
        listener.close();
    }

    print_send_report(
        &SendReport {
            peer: args.peer.to_string(),
            mode: args.mode.name(),
            packets: count,
            packages: packages.iter().map(SequenceId::to_string).collect(),
            confirmed,
        },
        format,
    );

    if args.mode == ModeArg::Queued && !confirmed {
        return Err(CliError::new(
            TIMEOUT,
            format!(
                "{} package(s) unconfirmed after {}ms",
                queue.len(),
                timeout.as_millis()
            ),
        ));
    }
    Ok(SUCCESS)
}

fn parse_messages(inputs: &[String]) -> CliResult<Vec<Packet>> {
    inputs
        .iter()
        .map(|input| {
            input
                .parse::<Message>()
                .map(Packet::from)
                .map_err(|err| codec_error(&format!("invalid message {input:?}"), err))
        })
        .collect()
}

/// Ids issued between two readings of the builder's next id.
fn issued_ids(first: SequenceId, next: SequenceId) -> Vec<SequenceId> {
    let mut ids = Vec::new();
    let mut id = first;
    while id != next {
        ids.push(id);
        id = id.next();
    }
    ids
}

fn start_confirmation_listener<S: PacketSender + 'static>(
    socket: &UdpTransport,
    queue: &PackageQueue<S>,
) -> CliResult<PackageListener<oscrelay_transport::UdpReceiver>> {
    let listener = PackageListener::from_parts(
        socket.receiver(),
        Arc::new(NoopObserver),
        Arc::new(SystemClock),
        ListenerConfig {
            poll_interval: Duration::from_millis(20),
            thread_name: "oscrelay-confirm".to_string(),
        },
    );
    listener
        .dispatcher()
        .attach_handler(RETURN_ADDRESS, queue.return_handler());
    listener
        .connect()
        .map_err(|err| reliable_error("listen for confirmations failed", err))?;
    Ok(listener)
}

fn wait_for_confirmation<S: PacketSender + 'static>(
    queue: &PackageQueue<S>,
    timeout: Duration,
) -> CliResult<bool> {
    let deadline = Instant::now() + timeout;
    while !queue.is_empty() {
        if Instant::now() >= deadline {
            return Ok(false);
        }
        queue
            .pump()
            .map_err(|err| reliable_error("retransmit failed", err))?;
        thread::sleep(PUMP_TICK);
    }
    info!("all packages confirmed");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_ids_walks_the_counter() {
        let first = SequenceId::new(4, u32::MAX - 1);
        let ids = issued_ids(first, SequenceId::new(4, 1));
        assert_eq!(
            ids,
            vec![
                SequenceId::new(4, u32::MAX - 1),
                SequenceId::new(4, u32::MAX),
                SequenceId::new(4, 0),
            ]
        );
        assert!(issued_ids(first, first).is_empty());
    }

    #[test]
    fn parse_messages_reports_the_bad_input() {
        let err = parse_messages(&["/ok, 1".to_string(), "no-slash".to_string()])
            .expect_err("invalid address should fail");
        assert_eq!(err.code, crate::exit::DATA_INVALID);
        assert!(err.message.contains("no-slash"));
    }
}
