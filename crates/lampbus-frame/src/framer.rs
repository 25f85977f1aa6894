use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::packet::{is_valid_window, Packet, PACKET_LEN};

/// Pull the next packet out of `buf`, discarding garbage in front of it.
///
/// Slides a 5-byte window over the buffer one byte at a time until a valid
/// packet is found. Returns `None` once fewer than 5 bytes remain; those are
/// left in place for the next chunk.
pub fn next_packet(buf: &mut BytesMut) -> Option<Packet> {
    let mut skipped = 0usize;
    let found = loop {
        if buf.len() < PACKET_LEN {
            break None;
        }
        let window: [u8; PACKET_LEN] = [buf[0], buf[1], buf[2], buf[3], buf[4]];
        if is_valid_window(&window) {
            buf.advance(PACKET_LEN);
            break Some(Packet::new(window[1], window[2], window[3]));
        }
        buf.advance(1);
        skipped += 1;
    };

    if skipped > 0 {
        trace!(skipped, "discarded framing garbage");
    }
    found
}

/// Extracts packets from an arbitrary byte stream.
///
/// Owned by exactly one connection. The residue kept between chunks is
/// always shorter than a packet, however much garbage arrives.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a received chunk and collect every complete packet, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Packet> {
        self.buf.extend_from_slice(chunk);

        let mut packets = Vec::new();
        while let Some(packet) = next_packet(&mut self.buf) {
            packets.push(packet);
        }
        packets
    }

    /// Bytes held back waiting for the rest of a packet.
    pub fn residue(&self) -> usize {
        self.buf.len()
    }

    /// Encode direction: packets are already framed, so this is the identity.
    pub fn frame<'a>(&self, packet: &'a Packet) -> &'a [u8] {
        packet.as_ref()
    }

    /// Drop any buffered partial packet.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
