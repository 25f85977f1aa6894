use crate::cmd::{block_on, deadline, open_session, QueryArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn run(args: QueryArgs, format: OutputFormat) -> CliResult<i32> {
    block_on(async {
        let session = open_session(&args.link).await?;
        let result = session
            .query(args.target, args.address, &deadline(args.timeout))
            .await;
        let _ = session.shutdown().await;

        let value = result.map_err(|err| session_error("query failed", err))?;
        print_value(args.address, args.target.name(), value, format);
        Ok(SUCCESS)
    })
}
