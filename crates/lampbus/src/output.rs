use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lampbus_frame::{Channel, Message, Packet};
use lampbus_session::ValueRange;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

#[derive(Serialize)]
pub struct MessageOutput {
    pub id: String,
    pub address: String,
    pub target: String,
    pub command: Option<String>,
    pub value: Option<i64>,
    pub timestamp_us: Option<u64>,
    pub link: String,
}

impl MessageOutput {
    pub fn new(message: &Message, link: &str) -> Self {
        Self {
            id: message.id.to_string(),
            address: format!("0x{:02x}", message.metadata.address),
            target: message.id.target.to_string(),
            command: message.metadata.command.map(|c| c.name().to_string()),
            value: message.payload,
            timestamp_us: message.metadata.timestamp,
            link: link.to_string(),
        }
    }
}

pub fn print_message(message: &Message, link: &str, format: OutputFormat) {
    let out = MessageOutput::new(message, link);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ADDRESS", "TARGET", "COMMAND", "VALUE"]);
            table.add_row(vec![
                out.address,
                out.target,
                out.command.unwrap_or_default(),
                value_text(out.value),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{message}"),
    }
}

#[derive(Serialize)]
struct ValueOutput<'a> {
    address: String,
    target: &'a str,
    value: i64,
}

pub fn print_value(address: u8, target: &str, value: i64, format: OutputFormat) {
    let out = ValueOutput {
        address: format!("0x{address:02x}"),
        target,
        value,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut table = new_table(vec!["ADDRESS", "TARGET", "VALUE"]);
            table.add_row(vec![out.address, target.to_string(), value.to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{address:02x}:{target} = {value}"),
    }
}

/// One row of `decode` output. A packet that fails to decode still gets a
/// row with the error.
#[derive(Serialize)]
pub struct PacketOutput {
    pub packet: String,
    pub id: Option<String>,
    pub command: Option<String>,
    pub raw: u8,
    pub value: Option<i64>,
    pub error: Option<String>,
}

impl PacketOutput {
    pub fn new(packet: &Packet) -> Self {
        Self {
            packet: packet.to_string(),
            id: None,
            command: None,
            raw: packet.data(),
            value: None,
            error: None,
        }
    }
}

#[derive(Serialize)]
struct DecodeOutput<'a> {
    packets: &'a [PacketOutput],
    residue: usize,
}

pub fn print_packets(packets: &[PacketOutput], residue: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&DecodeOutput { packets, residue }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["PACKET", "ID", "COMMAND", "RAW", "VALUE"]);
            for row in packets {
                table.add_row(vec![
                    row.packet.clone(),
                    row.id.clone().unwrap_or_default(),
                    row.command.clone().unwrap_or_default(),
                    format!("0x{:02x}", row.raw),
                    row.error.clone().unwrap_or_else(|| value_text(row.value)),
                ]);
            }
            println!("{table}");
            if residue > 0 {
                println!("{residue} trailing byte(s) did not form a packet");
            }
        }
        OutputFormat::Pretty => {
            for row in packets {
                match (&row.id, &row.error) {
                    (Some(id), None) => println!("{}  {id} = {}", row.packet, value_text(row.value)),
                    (_, Some(error)) => println!("{}  error: {error}", row.packet),
                    (None, None) => println!("{}", row.packet),
                }
            }
            if residue > 0 {
                println!("residue: {residue} byte(s)");
            }
        }
    }
}

#[derive(Serialize)]
struct ChannelOutput {
    name: &'static str,
    read: Option<&'static str>,
    write: Option<&'static str>,
    logical: [i64; 2],
    wire: [u8; 2],
}

pub fn print_channels(format: OutputFormat) {
    let rows: Vec<ChannelOutput> = Channel::ALL
        .into_iter()
        .map(|channel| {
            let range = ValueRange::for_channel(channel);
            ChannelOutput {
                name: channel.name(),
                read: channel.read_command().map(|c| c.name()),
                write: channel.write_command().map(|c| c.name()),
                logical: [range.logical_min, range.logical_max],
                wire: [range.wire_min, range.wire_max],
            }
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&rows),
        OutputFormat::Table => {
            let mut table = new_table(vec!["CHANNEL", "READ", "WRITE", "LOGICAL", "WIRE"]);
            for row in &rows {
                table.add_row(vec![
                    row.name.to_string(),
                    row.read.unwrap_or("-").to_string(),
                    row.write.unwrap_or("-").to_string(),
                    format!("{}..={}", row.logical[0], row.logical[1]),
                    format!("0x{:02x}..=0x{:02x}", row.wire[0], row.wire[1]),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!(
                    "{:<28} read={:<20} write={:<20} {}..={}",
                    row.name,
                    row.read.unwrap_or("-"),
                    row.write.unwrap_or("-"),
                    row.logical[0],
                    row.logical[1]
                );
            }
        }
    }
}

fn value_text(value: Option<i64>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}
