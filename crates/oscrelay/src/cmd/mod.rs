use std::net::SocketAddr;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use oscrelay_reliable::Mode;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send messages, optionally waiting for confirmation.
    Send(SendArgs),
    /// Receive and print packets, confirming packages on request.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Delivery mode as spelled on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Immediate,
    Bundled,
    Packaged,
    /// Packaged, retried until the peer confirms.
    Queued,
}

impl ModeArg {
    pub fn name(self) -> &'static str {
        match self {
            ModeArg::Immediate => "immediate",
            ModeArg::Bundled => "bundled",
            ModeArg::Packaged => "packaged",
            ModeArg::Queued => "queued",
        }
    }
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Immediate => Mode::Immediate,
            ModeArg::Bundled => Mode::Bundled,
            ModeArg::Packaged => Mode::Packaged,
            ModeArg::Queued => Mode::PackagedAndQueued,
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address of the receiving peer.
    pub peer: SocketAddr,
    /// Messages in text form, e.g. "/fader/1, 0.5f".
    #[arg(required = true, value_name = "MESSAGE")]
    pub messages: Vec<String>,
    /// Local address to bind; confirmations arrive here.
    #[arg(long, default_value = "0.0.0.0:0")]
    pub bind: SocketAddr,
    /// Delivery mode.
    #[arg(long, short = 'm', value_enum, default_value = "bundled")]
    pub mode: ModeArg,
    /// Queue identifier (high 32 bits of package ids). Default: process id.
    #[arg(long)]
    pub queue_id: Option<u32>,
    /// Largest bundle to emit, in bytes.
    #[arg(long, default_value_t = oscrelay_reliable::DEFAULT_MAX_PACKAGE_SIZE)]
    pub max_package_size: usize,
    /// Pause between retransmissions in queued mode (e.g. 100ms).
    #[arg(long, default_value = "100ms")]
    pub retry_interval: String,
    /// How long to wait for confirmations in queued mode (e.g. 5s).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local address to bind.
    pub bind: SocketAddr,
    /// Confirm every package to this address and suppress its retransmissions.
    #[arg(long, value_name = "ADDR")]
    pub reply_to: Option<SocketAddr>,
    /// How long a confirmed package stays suppressed (e.g. 60s).
    #[arg(long, default_value = "60s")]
    pub filter_ttl: String,
    /// Exit after printing N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in [
            ModeArg::Immediate,
            ModeArg::Bundled,
            ModeArg::Packaged,
            ModeArg::Queued,
        ] {
            assert_eq!(ModeArg::from_str(mode.name(), false), Ok(mode));
        }
        assert_eq!(Mode::from(ModeArg::Queued), Mode::PackagedAndQueued);
    }
}
