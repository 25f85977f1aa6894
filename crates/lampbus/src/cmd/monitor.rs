use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::cmd::{block_on, open_session, MonitorArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    block_on(async {
        let session = open_session(&args.link).await?;
        let mut events = session.subscribe();
        let mut printed = 0usize;

        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = tokio::signal::ctrl_c() => break,
                closed = session.closed() => {
                    closed.map_err(|err| session_error("link failed", err))?;
                    break;
                }
            };
            match event {
                Ok(message) => {
                    print_message(&message, session.link_id(), format);
                    printed = printed.saturating_add(1);
                    if args.count.is_some_and(|count| printed >= count) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "monitor fell behind"),
                Err(RecvError::Closed) => break,
            }
        }

        let _ = session.shutdown().await;
        Ok(SUCCESS)
    })
}
