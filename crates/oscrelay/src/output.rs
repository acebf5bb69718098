use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use oscrelay_codec::{Message, Packet};
use oscrelay_reliable::{package_id, SequenceId};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput {
    address: String,
    type_tags: String,
    text: String,
}

#[derive(Serialize)]
struct PacketOutput {
    kind: &'static str,
    package_id: Option<String>,
    size: usize,
    messages: Vec<MessageOutput>,
    timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    pub peer: String,
    pub mode: &'static str,
    pub packets: usize,
    pub packages: Vec<String>,
    pub confirmed: bool,
}

/// Flatten a packet to its messages in wire order, skipping package tags.
fn payload_messages(packet: &Packet) -> Vec<&Message> {
    fn walk<'a>(packet: &'a Packet, out: &mut Vec<&'a Message>) {
        match packet {
            Packet::Message(message) => out.push(message),
            Packet::Bundle(bundle) => {
                for inner in &bundle.packets {
                    walk(inner, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(packet, &mut out);
    if package_id(packet).is_some() {
        out.remove(0);
    }
    out
}

pub fn print_packet(packet: &Packet, format: OutputFormat) {
    let id = package_id(packet);
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                kind: if packet.is_bundle() { "bundle" } else { "message" },
                package_id: id.map(|id| id.to_string()),
                size: packet.encoded_size(),
                messages: payload_messages(packet)
                    .into_iter()
                    .map(|message| MessageOutput {
                        address: message.address.clone(),
                        type_tags: message.type_tags(),
                        text: message.to_string(),
                    })
                    .collect(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PACKAGE", "ADDRESS", "TAGS", "MESSAGE"]);
            let package = package_label(id);
            for message in payload_messages(packet) {
                table.add_row(vec![
                    package.clone(),
                    message.address.clone(),
                    message.type_tags(),
                    message.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let messages = payload_messages(packet);
            println!(
                "package={} size={} messages={}",
                package_label(id),
                packet.encoded_size(),
                messages.len()
            );
            for message in messages {
                println!("  {message}");
            }
        }
        OutputFormat::Raw => print_raw(&packet.to_bytes()),
    }
}

pub fn print_send_report(report: &SendReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PEER", "MODE", "PACKETS", "PACKAGES", "CONFIRMED"])
                .add_row(vec![
                    report.peer.clone(),
                    report.mode.to_string(),
                    report.packets.to_string(),
                    report.packages.join(" "),
                    report.confirmed.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent {} packet(s) to {} mode={} packages=[{}] confirmed={}",
                report.packets,
                report.peer,
                report.mode,
                report.packages.join(", "),
                report.confirmed
            );
        }
        OutputFormat::Raw => {}
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn package_label(id: Option<SequenceId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
