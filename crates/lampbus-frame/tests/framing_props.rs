use lampbus_frame::{
    decode, encode, Channel, Command, Framer, Message, MessageId, Packet, FRAMING_END,
    FRAMING_START, PACKET_LEN,
};
use proptest::prelude::*;

fn non_framing() -> impl Strategy<Value = u8> {
    any::<u8>().prop_filter("framing byte", |b| *b != FRAMING_START && *b != FRAMING_END)
}

fn valid_packet() -> impl Strategy<Value = Packet> {
    (non_framing(), non_framing(), any::<u8>()).prop_map(|(a, c, d)| Packet::new(a, c, d))
}

/// Garbage that can never complete a packet window with the bytes around it:
/// no start byte at all, so every window that begins inside it is rejected.
fn garbage() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(
        any::<u8>().prop_filter("start byte", |b| *b != FRAMING_START),
        0..32,
    )
}

proptest! {
    #[test]
    fn packet_surrounded_by_garbage_is_recovered(
        before in garbage(),
        packet in valid_packet(),
        after in garbage(),
    ) {
        let mut input = before.clone();
        input.extend_from_slice(packet.as_ref());
        input.extend_from_slice(&after);

        let mut framer = Framer::new();
        let packets = framer.push(&input);

        prop_assert_eq!(packets, vec![packet]);
        prop_assert!(framer.residue() < PACKET_LEN);
    }

    #[test]
    fn stray_framing_bytes_before_packet_are_skipped(
        strays in prop::collection::vec(prop::sample::select(vec![FRAMING_START, FRAMING_END]), 0..8),
        packet in valid_packet(),
    ) {
        let mut input = strays;
        input.extend_from_slice(packet.as_ref());

        let mut framer = Framer::new();
        let packets = framer.push(&input);
        prop_assert_eq!(packets.last().copied(), Some(packet));
        prop_assert!(framer.residue() < PACKET_LEN);
    }

    #[test]
    fn residue_is_bounded_for_any_input(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16),
    ) {
        let mut framer = Framer::new();
        for chunk in chunks {
            let packets = framer.push(&chunk);
            for packet in packets {
                prop_assert!(Packet::from_window(packet.as_ref()).is_some());
            }
            prop_assert!(framer.residue() < PACKET_LEN);
        }
    }

    #[test]
    fn chunking_does_not_change_the_result(
        packets in prop::collection::vec(valid_packet(), 1..8),
        split in 1usize..7,
    ) {
        let wire: Vec<u8> = packets.iter().flat_map(|p| p.as_bytes().to_vec()).collect();

        let mut whole = Framer::new();
        let expected = whole.push(&wire);

        let mut chunked = Framer::new();
        let mut got = Vec::new();
        for chunk in wire.chunks(split) {
            got.extend(chunked.push(chunk));
        }
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn encoded_ids_decode_back(address in non_framing(), index in 0usize..Command::ALL.len(), data in any::<u8>()) {
        let command = Command::ALL[index];
        let mut message = Message::new(MessageId::command(address, command), Some(i64::from(data)));
        message.metadata.command = Some(command);

        let packet = encode(&message).unwrap();
        let decoded = decode(&packet).unwrap();

        prop_assert_eq!(decoded.address(), address);
        prop_assert_eq!(decoded.metadata.command, Some(command));
        prop_assert_eq!(decoded.metadata.channel, Channel::from_command(command));
        prop_assert_eq!(decoded.payload, Some(i64::from(data)));
    }
}
