use lampbus_session::{validate, ProbeConfig, ProbeOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::{block_on, open_session, ProbeArgs};
use crate::exit::{session_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct ProbeOutput<'a> {
    device_id: String,
    firmware_version: i64,
    link: &'a str,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.first > args.last {
        return Err(CliError::new(
            USAGE,
            format!("--first 0x{:02x} is above --last 0x{:02x}", args.first, args.last),
        ));
    }
    let config = ProbeConfig {
        attempts: args.attempts,
        first_address: args.first,
        last_address: args.last,
        per_address_timeout: args.per_address_timeout,
    };

    block_on(async {
        let session = open_session(&args.link).await?;
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });

        info!(link = session.link_id(), attempts = config.attempts, "probing");
        let outcome = validate(&session, &cancel, &config).await;
        let _ = session.shutdown().await;

        match outcome.map_err(|err| session_error("probe failed", err))? {
            ProbeOutcome::Resolved(id) => {
                let out = ProbeOutput {
                    device_id: id.to_string(),
                    firmware_version: id.firmware_version(),
                    link: session.link_id(),
                };
                match format {
                    OutputFormat::Json => println!(
                        "{}",
                        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                    ),
                    OutputFormat::Table | OutputFormat::Pretty => {
                        println!("{} (firmware {})", out.device_id, out.firmware_version)
                    }
                }
                Ok(SUCCESS)
            }
            ProbeOutcome::Exhausted => {
                eprintln!("no device answered on {}", session.link_id());
                Ok(FAILURE)
            }
        }
    })
}
