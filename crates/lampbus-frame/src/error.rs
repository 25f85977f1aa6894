/// Errors that can occur while framing, encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The command byte is not in the command table.
    #[error("unknown packet command: 0x{0:02x}")]
    UnknownCommand(u8),

    /// The message reached the packet encoder without a resolved command.
    #[error("no command resolved for message {id}")]
    UnresolvedCommand { id: String },

    /// The payload does not fit the single data byte.
    #[error("payload {value} for {id} does not fit a data byte")]
    InvalidPayload { id: String, value: i64 },

    /// The address collides with a framing byte and cannot be sent.
    #[error("address 0x{0:02x} is a framing byte")]
    ReservedAddress(u8),

    /// A message ID string could not be parsed.
    #[error("invalid message id '{0}'")]
    InvalidMessageId(String),

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link closed.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
