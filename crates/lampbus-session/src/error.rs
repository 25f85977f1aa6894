use lampbus_frame::{Channel, Command, MessageId, Target};

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] lampbus_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] lampbus_frame::FrameError),

    /// A value falls outside the declared range of its channel.
    #[error("incorrect data for {target}: {value} must be between {min} and {max}")]
    OutOfRange {
        target: Target,
        value: i64,
        min: i64,
        max: i64,
    },

    /// The hardware answered something other than the pending query.
    #[error("received {received} while waiting for a {expected} reply; correlator out of sync")]
    UnexpectedReply {
        expected: Command,
        received: MessageId,
    },

    /// The caller's deadline passed before a reply arrived.
    #[error("no reply to {id} before the deadline")]
    Timeout { id: MessageId },

    /// Discovery was cancelled before it completed.
    #[error("discovery cancelled")]
    Cancelled,

    /// The channel has no command in the requested direction.
    #[error("channel {channel} has no {direction} command")]
    ChannelUnsupported {
        channel: Channel,
        direction: &'static str,
    },

    /// Broadcast queries are never answered.
    #[error("cannot query the broadcast address")]
    BroadcastQuery,

    /// The session closed while the operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,
}

impl SessionError {
    /// True when the caller's deadline expired; typically means "no lamp at
    /// this address" and is safe to retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
