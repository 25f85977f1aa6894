mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "lampbus", version, about = "Strobe-lamp bus CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "LAMPBUS_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use lampbus_frame::{Channel, Target};

    use super::*;

    #[test]
    fn parses_query_subcommand() {
        let cli = Cli::try_parse_from([
            "lampbus",
            "query",
            "strobe_pulse_width",
            "--address",
            "0x05",
            "--tcp",
            "127.0.0.1:4001",
            "--timeout",
            "500ms",
        ])
        .expect("query args should parse");

        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!(args.target, Target::Channel(Channel::StrobePulseWidth));
        assert_eq!(args.address, 0x05);
        assert_eq!(args.link.tcp.as_deref(), Some("127.0.0.1:4001"));
    }

    #[test]
    fn rejects_unknown_target() {
        let err = Cli::try_parse_from(["lampbus", "query", "brightness", "--address", "1"])
            .expect_err("unknown target should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_simulate_with_several_lamps() {
        let cli = Cli::try_parse_from([
            "lampbus", "simulate", "--listen", "127.0.0.1:0", "--lamp", "1", "--lamp", "0x05",
        ])
        .expect("simulate args should parse");
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.lamps, vec![0x01, 0x05]);
        assert!(!args.reply_from_lamp);
    }

    #[test]
    fn decode_requires_bytes() {
        let err = Cli::try_parse_from(["lampbus", "decode"]).expect_err("decode needs input");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
