//! Typed application messages.

use std::fmt;
use std::str::FromStr;

use crate::channel::Channel;
use crate::command::Command;
use crate::error::FrameError;

/// Broadcast address: every lamp acts on it, none replies.
pub const BROADCAST: u8 = 0xFF;

/// The bus master. Device replies are forwarded by it and carry this address.
pub const MASTER: u8 = 0x00;

/// What a message talks about: a channel, or a raw command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Channel(Channel),
    Command(Command),
}

impl Target {
    /// The target name, as it appears in a message ID.
    pub const fn name(self) -> &'static str {
        match self {
            Target::Channel(channel) => channel.name(),
            Target::Command(command) => command.name(),
        }
    }

    /// Parse a channel name or a command name.
    pub fn from_name(name: &str) -> Option<Self> {
        Channel::from_name(name)
            .map(Target::Channel)
            .or_else(|| Command::from_name(name).map(Target::Command))
    }

    /// The channel, if this target is one or the command belongs to one.
    pub const fn channel(self) -> Option<Channel> {
        match self {
            Target::Channel(channel) => Some(channel),
            Target::Command(command) => Channel::from_command(command),
        }
    }

    /// Target for a decoded command: its channel when it has one.
    pub const fn for_command(command: Command) -> Self {
        match Channel::from_command(command) {
            Some(channel) => Target::Channel(channel),
            None => Target::Command(command),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Channel> for Target {
    fn from(channel: Channel) -> Self {
        Target::Channel(channel)
    }
}

impl From<Command> for Target {
    fn from(command: Command) -> Self {
        Target::Command(command)
    }
}

/// Address plus target. The single source of truth for who a message is
/// to or from and what it is about.
///
/// String form is `"{address:02x}:{target}"`, e.g. `"05:strobe_pulse_width"`
/// or `"01:CMD_RD_VERSION"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId {
    pub address: u8,
    pub target: Target,
}

impl MessageId {
    pub const fn new(address: u8, target: Target) -> Self {
        Self { address, target }
    }

    pub const fn channel(address: u8, channel: Channel) -> Self {
        Self::new(address, Target::Channel(channel))
    }

    pub const fn command(address: u8, command: Command) -> Self {
        Self::new(address, Target::Command(command))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{}", self.address, self.target)
    }
}

impl FromStr for MessageId {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FrameError::InvalidMessageId(s.to_string());

        let (address, target) = s.split_once(':').ok_or_else(invalid)?;
        if address.is_empty()
            || address.len() > 2
            || !address.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(invalid());
        }
        let address = u8::from_str_radix(address, 16).map_err(|_| invalid())?;
        let target = Target::from_name(target).ok_or_else(invalid)?;

        Ok(Self::new(address, target))
    }
}

/// Per-message annotations stamped by the pipeline layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Wire address the message is sent to or was received from.
    pub address: u8,
    /// Resolved wire command.
    pub command: Option<Command>,
    /// Channel the command belongs to, when it has one.
    pub channel: Option<Channel>,
    /// True for read requests.
    pub query: bool,
    /// Microseconds on the session clock when the packet was decoded.
    pub timestamp: Option<u64>,
}

/// A typed message travelling between the application and the wire.
///
/// Payload is the logical value above the value codec and the raw data
/// byte below it; `None` is sent as `0x00`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Option<i64>,
    pub metadata: Metadata,
}

impl Message {
    /// Create a message, deriving address and channel metadata from the ID.
    pub fn new(id: MessageId, payload: Option<i64>) -> Self {
        let command = match id.target {
            Target::Command(command) => Some(command),
            Target::Channel(_) => None,
        };
        Self {
            id,
            payload,
            metadata: Metadata {
                address: id.address,
                command,
                channel: id.target.channel(),
                query: command.is_some_and(Command::is_query),
                timestamp: None,
            },
        }
    }

    /// A read request for `target` at `address`.
    pub fn query(address: u8, target: impl Into<Target>) -> Self {
        let mut message = Self::new(MessageId::new(address, target.into()), Some(0));
        message.metadata.query = true;
        message
    }

    /// A write of `value` to `channel` at `address`.
    pub fn write(address: u8, channel: Channel, value: i64) -> Self {
        let mut message = Self::new(MessageId::channel(address, channel), Some(value));
        message.metadata.query = false;
        message
    }

    /// Address carried by the message ID.
    pub fn address(&self) -> u8 {
        self.id.address
    }

    pub fn is_query(&self) -> bool {
        self.metadata.query
    }

    pub fn is_broadcast(&self) -> bool {
        self.id.address == BROADCAST
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload {
            Some(payload) => write!(f, "{} = {payload}", self.id),
            None => write!(f, "{} = null", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(address: u8, target: Target) {
        let id = MessageId::new(address, target);
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed.address, address);
        assert_eq!(parsed.target, target);
    }

    #[test]
    fn message_ids_roundtrip() {
        roundtrip(0x00, Channel::LampFirmwareVersion.into());
        roundtrip(0x01, Channel::LampAddress.into());
        roundtrip(0x10, Channel::Options.into());
        roundtrip(0x50, Channel::CalibrationOffset.into());
        roundtrip(0xf0, Channel::PulseIntensityBottomIr.into());
        roundtrip(0xff, Channel::PulseIntensityTopWhite.into());
        roundtrip(0x05, Command::RdMode.into());
    }

    #[test]
    fn every_address_and_target_roundtrips() {
        for address in 0..=u8::MAX {
            for channel in Channel::ALL {
                roundtrip(address, channel.into());
            }
            for command in Command::ALL {
                roundtrip(address, command.into());
            }
        }
    }

    #[test]
    fn string_form() {
        assert_eq!(
            MessageId::channel(0x05, Channel::StrobePulseWidth).to_string(),
            "05:strobe_pulse_width"
        );
        assert_eq!(
            MessageId::command(0xab, Command::RdVersion).to_string(),
            "ab:CMD_RD_VERSION"
        );
    }

    #[test]
    fn rejects_malformed_ids() {
        for bad in [
            "-1:options",
            "100:options",
            "zz:options",
            ":options",
            "05",
            "05:",
            "05:no_such_channel",
            "+5:options",
        ] {
            let err = bad.parse::<MessageId>().unwrap_err();
            assert!(matches!(err, FrameError::InvalidMessageId(ref s) if s == bad));
        }
    }

    #[test]
    fn new_message_derives_metadata() {
        let msg = Message::new(MessageId::command(0x03, Command::StrbPwRd), None);
        assert_eq!(msg.metadata.address, 0x03);
        assert_eq!(msg.metadata.command, Some(Command::StrbPwRd));
        assert_eq!(msg.metadata.channel, Some(Channel::StrobePulseWidth));
        assert!(msg.is_query());

        let msg = Message::write(0x03, Channel::StrobePulseWidth, 200);
        assert_eq!(msg.metadata.command, None);
        assert_eq!(msg.metadata.channel, Some(Channel::StrobePulseWidth));
        assert!(!msg.is_query());
        assert_eq!(msg.payload, Some(200));
    }

    #[test]
    fn decoded_target_prefers_channel() {
        assert_eq!(
            Target::for_command(Command::PulseAmpBRd),
            Target::Channel(Channel::PulseIntensityBottomIr)
        );
        assert_eq!(
            Target::for_command(Command::RdMode),
            Target::Command(Command::RdMode)
        );
    }

    #[test]
    fn broadcast_detection() {
        assert!(Message::write(BROADCAST, Channel::TriggerStrobe, 0).is_broadcast());
        assert!(!Message::write(MASTER, Channel::TriggerStrobe, 0).is_broadcast());
    }
}
