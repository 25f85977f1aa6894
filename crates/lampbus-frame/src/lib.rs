//! Five-byte packet framing and message model for the strobe-lamp bus.
//!
//! Every packet on the wire is exactly:
//! - `0xFE` start byte
//! - one address byte (`0x00` bus master, `0xFF` broadcast)
//! - one command byte from the fixed [`Command`] table
//! - one data byte
//! - `0xFD` end byte
//!
//! Address and command may never be `0xFE` or `0xFD`; data may be anything.
//! There is no checksum and no length field, so the [`Framer`] resynchronizes
//! on garbage one byte at a time.

pub mod channel;
pub mod clock;
#[cfg(feature = "async")]
pub mod codec;
pub mod command;
pub mod error;
pub mod framer;
pub mod message;
pub mod packet;

pub use channel::Channel;
pub use clock::{Clock, ManualClock, MonotonicClock};
#[cfg(feature = "async")]
pub use codec::PacketCodec;
pub use command::Command;
pub use error::{FrameError, Result};
pub use framer::{next_packet, Framer};
pub use message::{Message, MessageId, Metadata, Target, BROADCAST, MASTER};
pub use packet::{decode, encode, Packet, PacketDecoder, FRAMING_END, FRAMING_START, PACKET_LEN};
