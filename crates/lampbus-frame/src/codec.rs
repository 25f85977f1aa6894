use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::FrameError;
use crate::framer::next_packet;
use crate::packet::Packet;

/// `tokio_util` codec over the packet framer.
///
/// Used with `FramedRead`/`FramedWrite` on any async byte stream. The read
/// buffer never keeps more than a partial packet after `decode` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl PacketCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        Ok(next_packet(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        if let Some(packet) = next_packet(src) {
            return Ok(Some(packet));
        }
        if !src.is_empty() {
            trace!(residue = src.len(), "dropping partial packet at end of stream");
            src.clear();
        }
        Ok(None)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        dst.extend_from_slice(packet.as_ref());
        Ok(())
    }
}
