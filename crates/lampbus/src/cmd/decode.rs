use lampbus_frame::{decode, Framer};
use lampbus_session::value;

use crate::cmd::DecodeArgs;
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_packets, OutputFormat, PacketOutput};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;

    let mut framer = Framer::new();
    let packets = framer.push(&bytes);
    if packets.is_empty() {
        return Err(CliError::new(
            DATA_INVALID,
            format!("no packet found in {} byte(s)", bytes.len()),
        ));
    }

    let rows: Vec<PacketOutput> = packets
        .iter()
        .map(|packet| {
            let mut row = PacketOutput::new(packet);
            match decode(packet) {
                Ok(mut message) => {
                    row.id = Some(message.id.to_string());
                    row.command = message.metadata.command.map(|c| c.name().to_string());
                    match value::decode_message(&mut message) {
                        Ok(()) => row.value = message.payload,
                        Err(err) => row.error = Some(err.to_string()),
                    }
                }
                Err(err) => row.error = Some(err.to_string()),
            }
            row
        })
        .collect();

    print_packets(&rows, framer.residue(), format);
    Ok(SUCCESS)
}

/// Accepts whitespace, `:` or `,` separated bytes, optional `0x` prefixes,
/// or unbroken hex runs.
fn parse_hex(args: &[String]) -> CliResult<Vec<u8>> {
    let mut bytes = Vec::new();
    for token in args
        .iter()
        .flat_map(|arg| arg.split(|c: char| c.is_whitespace() || c == ':' || c == ','))
        .filter(|token| !token.is_empty())
    {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.len() % 2 != 0 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CliError::usage(format!("invalid hex '{token}'")));
        }
        for pair in digits.as_bytes().chunks(2) {
            let pair = std::str::from_utf8(pair)
                .map_err(|_| CliError::usage(format!("invalid hex '{token}'")))?;
            let byte = u8::from_str_radix(pair, 16)
                .map_err(|_| CliError::usage(format!("invalid hex '{token}'")))?;
            bytes.push(byte);
        }
    }
    Ok(bytes)
}
