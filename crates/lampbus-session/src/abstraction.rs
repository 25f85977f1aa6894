//! Channel abstraction: resolves the wire command for a message and expands
//! writes into write-then-verify pairs.

use lampbus_frame::{Message, Target};
use tracing::debug;

use crate::error::{Result, SessionError};

/// Stamp the wire command for the message's direction.
///
/// Command targets are already resolved. Channel targets resolve to the
/// channel's read or write command; a channel without a command in that
/// direction yields [`SessionError::ChannelUnsupported`].
pub fn resolve(mut message: Message) -> Result<Message> {
    let command = match message.id.target {
        Target::Command(command) => command,
        Target::Channel(channel) => {
            let query = message.is_query();
            channel
                .command(query)
                .ok_or(SessionError::ChannelUnsupported {
                    channel,
                    direction: if query { "read" } else { "write" },
                })?
        }
    };

    message.metadata.address = message.id.address;
    message.metadata.command = Some(command);
    message.metadata.channel = message.id.target.channel();
    debug!(id = %message.id, %command, query = message.is_query(), "resolved command");
    Ok(message)
}

/// Read-back query that verifies a write, if the write has one.
///
/// Broadcast writes and queries are never verified. Command-form writes are
/// verified through their channel when they belong to one.
pub fn verify_query(write: &Message) -> Option<Message> {
    if write.is_query() || write.is_broadcast() {
        return None;
    }
    let channel = write.id.target.channel()?;
    Some(Message::query(write.address(), channel))
}

/// A write followed by its verification query.
pub fn expand(message: Message) -> Vec<Message> {
    match verify_query(&message) {
        Some(query) => vec![message, query],
        None => vec![message],
    }
}

#[cfg(test)]
mod tests {
    use lampbus_frame::{Channel, Command, MessageId, BROADCAST};

    use super::*;

    #[test]
    fn resolves_channel_per_direction() {
        let write = resolve(Message::write(0x02, Channel::StrobePulseWidth, 300)).unwrap();
        assert_eq!(write.metadata.command, Some(Command::StrbPwSet));
        assert_eq!(write.metadata.address, 0x02);

        let query = resolve(Message::query(0x02, Channel::StrobePulseWidth)).unwrap();
        assert_eq!(query.metadata.command, Some(Command::StrbPwRd));
        assert!(query.is_query());
    }

    #[test]
    fn command_targets_keep_their_command() {
        let msg = resolve(Message::query(0x02, Command::RdMode)).unwrap();
        assert_eq!(msg.metadata.command, Some(Command::RdMode));
        assert_eq!(msg.metadata.channel, None);
    }

    #[test]
    fn unsupported_direction() {
        let err = resolve(Message::query(0x02, Channel::LampAddress)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::ChannelUnsupported {
                channel: Channel::LampAddress,
                direction: "read"
            }
        ));
        let err = resolve(Message::write(0x02, Channel::HealthStatus, 1)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::ChannelUnsupported {
                direction: "write",
                ..
            }
        ));
    }

    #[test]
    fn write_expands_to_write_then_verify() {
        let messages = expand(Message::write(0x03, Channel::StrobePulseDelay, 512));
        assert_eq!(messages.len(), 2);
        assert!(!messages[0].is_query());
        assert_eq!(messages[0].payload, Some(512));
        assert!(messages[1].is_query());
        assert_eq!(
            messages[1].id,
            MessageId::channel(0x03, Channel::StrobePulseDelay)
        );
    }

    #[test]
    fn broadcast_and_queries_are_not_expanded() {
        assert_eq!(expand(Message::write(BROADCAST, Channel::TriggerStrobe, 0)).len(), 1);
        assert_eq!(expand(Message::query(0x03, Channel::StrobePulseDelay)).len(), 1);
    }

    #[test]
    fn unmapped_command_write_is_not_verified() {
        let msg = Message::new(MessageId::command(0x03, Command::PulseAmpSet), Some(10));
        assert_eq!(expand(msg).len(), 1);
    }
}
