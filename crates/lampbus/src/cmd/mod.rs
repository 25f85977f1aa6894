use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use lampbus_frame::Target;
use lampbus_session::{Session, SessionConfig};
use lampbus_transport::BusStream;
use tokio_util::sync::CancellationToken;

use crate::exit::{session_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod channels;
pub mod decode;
pub mod monitor;
pub mod probe;
pub mod query;
pub mod simulate;
pub mod version;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show version information.
    Version(VersionArgs),
    /// List channels with their commands and value ranges.
    Channels,
    /// Decode captured bus bytes offline.
    Decode(DecodeArgs),
    /// Read one channel or command from a lamp.
    Query(QueryArgs),
    /// Write a channel and read it back.
    Write(WriteArgs),
    /// Find the device behind a link.
    Probe(ProbeArgs),
    /// Print inbound bus traffic.
    Monitor(MonitorArgs),
    /// Serve a simulated bus over TCP.
    Simulate(SimulateArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        Command::Channels => channels::run(format),
        Command::Decode(args) => decode::run(args, format),
        Command::Query(args) => query::run(args, format),
        Command::Write(args) => write::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Simulate(args) => simulate::run(args),
    }
}

/// Which link to open, on the command line or through the environment.
/// When several are set the device wins, then TCP, then the Unix socket.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial character device (e.g. /dev/ttyUSB0).
    #[arg(long, env = "LAMPBUS_DEVICE", value_name = "PATH")]
    pub device: Option<PathBuf>,
    /// TCP serial bridge (host:port).
    #[arg(long, env = "LAMPBUS_TCP", value_name = "ADDR")]
    pub tcp: Option<String>,
    /// Unix socket bridge.
    #[arg(long, env = "LAMPBUS_UNIX", value_name = "PATH")]
    pub unix: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes, e.g. "fe 02 53 88 fd" or fe025388fd.
    #[arg(required = true, num_args = 1..)]
    pub hex: Vec<String>,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Channel name or command name (e.g. strobe_pulse_width, CMD_RD_MODE).
    #[arg(value_parser = parse_target)]
    pub target: Target,
    /// Lamp address (decimal or 0x-prefixed hex).
    #[arg(long, short = 'a', value_parser = parse_byte)]
    pub address: u8,
    /// Reply deadline (e.g. 500ms, 2s).
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Channel name or command name.
    #[arg(value_parser = parse_target)]
    pub target: Target,
    /// Logical value.
    pub value: i64,
    /// Lamp address (decimal or 0x-prefixed hex); 0xff broadcasts.
    #[arg(long, short = 'a', value_parser = parse_byte)]
    pub address: u8,
    /// Deadline for the write and its read-back.
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub timeout: Duration,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Full sweeps over the address range.
    #[arg(long, default_value = "3")]
    pub attempts: u32,
    /// First address to probe.
    #[arg(long, default_value = "0x01", value_parser = parse_byte)]
    pub first: u8,
    /// Last address to probe.
    #[arg(long, default_value = "0xfe", value_parser = parse_byte)]
    pub last: u8,
    /// Reply deadline per address.
    #[arg(long, default_value = "10ms", value_parser = parse_duration)]
    pub per_address_timeout: Duration,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// TCP address to listen on.
    #[arg(long, default_value = "127.0.0.1:4001")]
    pub listen: String,
    /// Lamp addresses on the simulated bus.
    #[arg(long = "lamp", value_parser = parse_byte, default_value = "0x01")]
    pub lamps: Vec<u8>,
    /// Firmware version reported by every lamp.
    #[arg(long, default_value = "0x1d", value_parser = parse_byte)]
    pub firmware_version: u8,
    /// Reply from the lamp's own address instead of the master's.
    #[arg(long)]
    pub reply_from_lamp: bool,
}

pub fn parse_target(input: &str) -> Result<Target, String> {
    Target::from_name(input)
        .ok_or_else(|| format!("unknown channel or command '{input}' (see `lampbus channels`)"))
}

pub fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("invalid byte '{input}': expected 0-255 or 0x00-0xff"))
}

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration value: {input}"))?;
    if value == 0 {
        return Err("duration must be greater than zero".to_string());
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Run one command's async body on a fresh current-thread runtime.
pub fn block_on<F, T>(future: F) -> CliResult<T>
where
    F: Future<Output = CliResult<T>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    runtime.block_on(future)
}

/// Open the configured link and start a session on it.
pub async fn open_session(link: &LinkArgs) -> CliResult<Session> {
    let stream = if let Some(path) = &link.device {
        BusStream::open_device(path).await
    } else if let Some(endpoint) = &link.tcp {
        BusStream::connect_tcp(endpoint).await
    } else if let Some(path) = &link.unix {
        unix_link(path).await
    } else {
        return Err(CliError::new(
            USAGE,
            "no link given: pass --device, --tcp or --unix (or LAMPBUS_DEVICE, LAMPBUS_TCP, LAMPBUS_UNIX)",
        ));
    };
    let stream = stream.map_err(|err| session_error("open failed", err.into()))?;
    Ok(Session::open(stream, SessionConfig::default()))
}

#[cfg(unix)]
async fn unix_link(path: &std::path::Path) -> lampbus_transport::Result<BusStream> {
    BusStream::connect_unix(path).await
}

#[cfg(not(unix))]
async fn unix_link(path: &std::path::Path) -> lampbus_transport::Result<BusStream> {
    Err(lampbus_transport::TransportError::Connect {
        endpoint: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::Unsupported),
    })
}

/// A token that fires after `after`.
pub fn deadline(after: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    token
}

#[cfg(test)]
mod tests {
    use lampbus_frame::{Channel, Command};

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
    fn parse_byte_forms() {
        assert_eq!(parse_byte("5").unwrap(), 5);
        assert_eq!(parse_byte("0x1d").unwrap(), 0x1d);
        assert_eq!(parse_byte("0XFF").unwrap(), 0xff);
        assert!(parse_byte("256").is_err());
        assert!(parse_byte("-1").is_err());
        assert!(parse_byte("0x100").is_err());
    }

    #[test]
    fn parse_target_names() {
        assert_eq!(
            parse_target("strobe_pulse_width").unwrap(),
            Target::Channel(Channel::StrobePulseWidth)
        );
        assert_eq!(
            parse_target("CMD_RD_MODE").unwrap(),
            Target::Command(Command::RdMode)
        );
        assert!(parse_target("brightness").is_err());
    }
}
