use lampbus_frame::{Message, MessageId, Target};
use tokio::sync::broadcast::error::TryRecvError;

use crate::cmd::{block_on, deadline, open_session, WriteArgs};
use crate::exit::{session_error, CliError, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: WriteArgs, format: OutputFormat) -> CliResult<i32> {
    let message = write_message(&args)?;

    block_on(async {
        let session = open_session(&args.link).await?;
        let mut events = session.subscribe();
        let result = session.write(message, &deadline(args.timeout)).await;
        let _ = session.shutdown().await;
        result.map_err(|err| session_error("write failed", err))?;

        // The read-back reply, when the write was verified.
        match events.try_recv() {
            Ok(readback) => print_message(&readback, session.link_id(), format),
            Err(TryRecvError::Empty | TryRecvError::Closed) => {
                eprintln!("sent {} = {}", MessageId::new(args.address, args.target), args.value);
            }
            Err(TryRecvError::Lagged(_)) => {}
        }
        Ok(SUCCESS)
    })
}

fn write_message(args: &WriteArgs) -> CliResult<Message> {
    let writable = match args.target {
        Target::Channel(channel) => channel.write_command().is_some(),
        Target::Command(command) => !command.is_query(),
    };
    if !writable {
        return Err(CliError::usage(format!(
            "{} cannot be written",
            args.target
        )));
    }
    Ok(Message::new(
        MessageId::new(args.address, args.target),
        Some(args.value),
    ))
}
