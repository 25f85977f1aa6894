use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_channels, OutputFormat};

pub fn run(format: OutputFormat) -> CliResult<i32> {
    print_channels(format);
    Ok(SUCCESS)
}
