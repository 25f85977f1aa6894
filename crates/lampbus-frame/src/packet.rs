use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::clock::{Clock, MonotonicClock};
use crate::command::Command;
use crate::error::{FrameError, Result};
use crate::message::{Message, MessageId, Target};

/// Packet length on the wire.
pub const PACKET_LEN: usize = 5;

/// First byte of every packet.
pub const FRAMING_START: u8 = 0xFE;

/// Last byte of every packet.
pub const FRAMING_END: u8 = 0xFD;

/// One framed packet, exactly as it appears on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Packet([u8; PACKET_LEN]);

impl Packet {
    /// Build a packet. The caller guarantees address and command are not
    /// framing bytes; [`encode`] checks this for messages.
    pub const fn new(address: u8, command: u8, data: u8) -> Self {
        Self([FRAMING_START, address, command, data, FRAMING_END])
    }

    /// Accept a 5-byte candidate window if it is a well-formed packet.
    pub fn from_window(window: &[u8]) -> Option<Self> {
        let window: [u8; PACKET_LEN] = window.try_into().ok()?;
        is_valid_window(&window).then_some(Self(window))
    }

    pub const fn address(&self) -> u8 {
        self.0[1]
    }

    pub const fn command(&self) -> u8 {
        self.0[2]
    }

    pub const fn data(&self) -> u8 {
        self.0[3]
    }

    pub const fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.0
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet({self})")
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.0;
        write!(f, "{a:02x} {b:02x} {c:02x} {d:02x} {e:02x}")
    }
}

fn is_framing_byte(byte: u8) -> bool {
    byte == FRAMING_START || byte == FRAMING_END
}

/// Check a candidate window: start and end markers in place, and neither
/// address nor command is a framing byte.
pub(crate) fn is_valid_window(window: &[u8; PACKET_LEN]) -> bool {
    window[0] == FRAMING_START
        && window[4] == FRAMING_END
        && !is_framing_byte(window[1])
        && !is_framing_byte(window[2])
}

/// Encode a message into a packet.
///
/// Wire format:
/// ```text
/// ┌───────┬─────────┬─────────┬──────┬───────┐
/// │ 0xFE  │ ADDRESS │ COMMAND │ DATA │ 0xFD  │
/// └───────┴─────────┴─────────┴──────┴───────┘
/// ```
///
/// Address and command come from the metadata stamped by the upper layers.
/// A `None` payload is sent as `0x00`.
pub fn encode(message: &Message) -> Result<Packet> {
    let command = message
        .metadata
        .command
        .ok_or_else(|| FrameError::UnresolvedCommand {
            id: message.id.to_string(),
        })?;

    let address = message.metadata.address;
    if is_framing_byte(address) {
        return Err(FrameError::ReservedAddress(address));
    }

    let value = message.payload.unwrap_or(0);
    let data = u8::try_from(value).map_err(|_| FrameError::InvalidPayload {
        id: message.id.to_string(),
        value,
    })?;

    Ok(Packet::new(address, command.code(), data))
}

/// Decode a packet into a message.
///
/// The message ID uses the command's channel when it has one, otherwise the
/// command itself. The payload is the raw data byte.
pub fn decode(packet: &Packet) -> Result<Message> {
    let command =
        Command::from_code(packet.command()).ok_or(FrameError::UnknownCommand(packet.command()))?;

    let id = MessageId::new(packet.address(), Target::for_command(command));
    let mut message = Message::new(id, Some(i64::from(packet.data())));
    message.metadata.command = Some(command);
    message.metadata.query = false;

    trace!(%packet, id = %message.id, "decoded packet");
    Ok(message)
}

/// Packet decoder that stamps every message with a timestamp.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    clock: Arc<dyn Clock>,
}

impl PacketDecoder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn decode(&self, packet: &Packet) -> Result<Message> {
        let mut message = decode(packet)?;
        message.metadata.timestamp = Some(self.clock.now_micros());
        Ok(message)
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new(Arc::new(MonotonicClock::new()))
    }
}
