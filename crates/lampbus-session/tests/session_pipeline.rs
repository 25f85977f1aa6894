use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lampbus_frame::{
    Channel, Command, ManualClock, Message, Packet, PacketCodec, Target, BROADCAST, MASTER,
};
use lampbus_session::{Session, SessionConfig, SessionError, Simulator, SimulatorConfig};
use lampbus_transport::{BusStream, DEFAULT_MEMORY_CAPACITY};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

fn simulated(lamps: &[u8]) -> (Session, Simulator) {
    let (near, far) = BusStream::memory_pair("bus", DEFAULT_MEMORY_CAPACITY);
    let sim = Simulator::new(SimulatorConfig {
        lamps: lamps.to_vec(),
        ..SimulatorConfig::default()
    });
    tokio::spawn({
        let sim = sim.clone();
        async move { sim.serve(far).await }
    });
    (Session::open(near, SessionConfig::default()), sim)
}

fn raw_peer() -> (Session, Framed<BusStream, PacketCodec>) {
    let (near, far) = BusStream::memory_pair("bus", DEFAULT_MEMORY_CAPACITY);
    let session = Session::open(near, SessionConfig::default());
    (session, Framed::new(far, PacketCodec::new()))
}

fn deadline(after: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
    token
}

#[tokio::test(start_paused = true)]
async fn concurrent_queries_are_single_flight() {
    let (session, mut peer) = raw_peer();
    let never = CancellationToken::new();
    let channels = [
        Channel::LampFirmwareVersion,
        Channel::HealthStatus,
        Channel::CalibrationOffset,
    ];

    let mut tasks = Vec::new();
    for channel in channels {
        let session = session.clone();
        let never = never.clone();
        tasks.push(tokio::spawn(async move {
            session.send(Message::query(0x01, channel), &never).await
        }));
        // Let each caller reach the correlator before the next one starts.
        tokio::task::yield_now().await;
    }

    let mut seen = Vec::new();
    for payload in 0..3u8 {
        let request = peer.next().await.unwrap().unwrap();
        assert_eq!(request.address(), 0x01);
        // Nothing else goes out while this query is pending.
        assert!(tokio::time::timeout(Duration::from_millis(50), peer.next())
            .await
            .is_err());
        seen.push(request.command());
        peer.send(Packet::new(MASTER, request.command(), payload))
            .await
            .unwrap();
    }
    assert_eq!(
        seen,
        vec![
            Command::RdVersion.code(),
            Command::ReadErrors.code(),
            Command::OffsetRd.code()
        ]
    );

    for (expected, (task, channel)) in tasks.into_iter().zip(channels).enumerate() {
        let reply = task.await.unwrap().unwrap().unwrap();
        assert_eq!(reply.address(), 0x01);
        assert_eq!(reply.id.target, Target::Channel(channel));
        assert_eq!(reply.payload, Some(expected as i64));
    }
}

#[tokio::test(start_paused = true)]
async fn timed_out_query_releases_the_lock() {
    let (session, _sim) = simulated(&[0x01]);

    let err = session
        .query(Channel::LampFirmwareVersion, 0x02, &deadline(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let never = CancellationToken::new();
    let version = session
        .query(Channel::LampFirmwareVersion, 0x01, &never)
        .await
        .unwrap();
    assert_eq!(version, 0x1d);
}

#[tokio::test(start_paused = true)]
async fn query_that_times_out_while_queued_never_reaches_the_bus() {
    // Room for exactly one packet: the link stays full until the peer reads.
    let (near, far) = BusStream::memory_pair("bus", 5);
    let session = Session::open(near, SessionConfig::default());
    let mut peer = Framed::new(far, PacketCodec::new());
    let never = CancellationToken::new();

    session
        .send(Message::write(BROADCAST, Channel::TriggerStrobe, 0), &never)
        .await
        .unwrap();

    let err = session
        .query(Channel::LampFirmwareVersion, 0x01, &deadline(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let trigger = peer.next().await.unwrap().unwrap();
    assert_eq!(trigger.address(), BROADCAST);
    assert_eq!(trigger.command(), Command::TriggerNow.code());

    let pending = tokio::spawn({
        let session = session.clone();
        let never = never.clone();
        async move { session.query(Channel::StrobePulseWidth, 0x01, &never).await }
    });

    let request = peer.next().await.unwrap().unwrap();
    assert_eq!(request.command(), Command::StrbPwRd.code());
    peer.send(Packet::new(MASTER, Command::StrbPwRd.code(), 0x32))
        .await
        .unwrap();

    assert_eq!(pending.await.unwrap().unwrap(), 100);
    assert!(tokio::time::timeout(Duration::from_millis(50), peer.next())
        .await
        .is_err());
    assert!(!session.is_closed());
}

#[tokio::test]
async fn already_cancelled_query_is_not_sent() {
    let (session, sim) = simulated(&[0x01]);
    let cancelled = CancellationToken::new();
    cancelled.cancel();

    let err = session
        .query(Channel::StrobePulseWidth, 0x01, &cancelled)
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let never = CancellationToken::new();
    session
        .query(Channel::LampFirmwareVersion, 0x01, &never)
        .await
        .unwrap();
    assert_eq!(sim.received(), 1);
}

#[tokio::test]
async fn unexpected_reply_closes_the_session() {
    let (session, mut peer) = raw_peer();
    let never = CancellationToken::new();

    let pending = tokio::spawn({
        let session = session.clone();
        let never = never.clone();
        async move { session.query(Channel::StrobePulseWidth, 0x01, &never).await }
    });

    let request = peer.next().await.unwrap().unwrap();
    assert_eq!(request.command(), Command::StrbPwRd.code());
    peer.send(Packet::new(MASTER, Command::RdVersion.code(), 0x1d))
        .await
        .unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::ConnectionClosed));

    let terminal = session.closed().await.unwrap_err();
    assert!(matches!(
        terminal,
        SessionError::UnexpectedReply {
            expected: Command::StrbPwRd,
            ..
        }
    ));
    assert!(session.is_closed());

    let err = session
        .query(Channel::StrobePulseWidth, 0x01, &never)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ConnectionClosed));
}

#[tokio::test]
async fn write_is_verified_by_a_query() {
    let (session, sim) = simulated(&[0x01]);
    let mut events = session.subscribe();
    let never = CancellationToken::new();

    session
        .write(Message::write(0x01, Channel::StrobePulseDelay, 1024), &never)
        .await
        .unwrap();

    assert_eq!(sim.received(), 2);
    assert_eq!(sim.register(0x01, Channel::StrobePulseDelay), Some(0x04));

    let verified = events.recv().await.unwrap();
    assert_eq!(verified.address(), 0x01);
    assert_eq!(verified.id.target, Target::Channel(Channel::StrobePulseDelay));
    assert_eq!(verified.payload, Some(1024));
}

#[tokio::test]
async fn broadcast_bypasses_the_correlator() {
    let (session, sim) = simulated(&[0x01, 0x02]);
    let never = CancellationToken::new();

    session
        .write(Message::write(BROADCAST, Channel::StrobePulseWidth, 300), &never)
        .await
        .unwrap();
    let reply = session
        .send(Message::query(BROADCAST, Channel::StrobePulseWidth), &never)
        .await
        .unwrap();
    assert!(reply.is_none());

    let err = session
        .query(Channel::StrobePulseWidth, BROADCAST, &never)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::BroadcastQuery));

    // Round trip so the simulator has caught up.
    assert_eq!(
        session
            .query(Channel::StrobePulseWidth, 0x02, &never)
            .await
            .unwrap(),
        300
    );
    assert_eq!(sim.received(), 3);
    assert_eq!(sim.register(0x01, Channel::StrobePulseWidth), Some(0x96));
}

#[tokio::test]
async fn unsupported_write_is_discarded() {
    let (session, sim) = simulated(&[0x01]);
    let never = CancellationToken::new();

    // The write has no command; only its verification query goes out.
    session
        .write(Message::write(0x01, Channel::LampFirmwareVersion, 3), &never)
        .await
        .unwrap();
    assert_eq!(sim.received(), 1);

    let err = session
        .query(Channel::LampAddress, 0x01, &never)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::ChannelUnsupported {
            channel: Channel::LampAddress,
            ..
        }
    ));
}

#[tokio::test]
async fn out_of_range_write_is_rejected_before_sending() {
    let (session, sim) = simulated(&[0x01]);
    let never = CancellationToken::new();

    let err = session
        .write(Message::write(0x01, Channel::StrobePulseDelay, 0x10000), &never)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::OutOfRange { .. }));

    session
        .query(Channel::LampFirmwareVersion, 0x01, &never)
        .await
        .unwrap();
    assert_eq!(sim.received(), 1);
}

#[tokio::test]
async fn query_returns_logical_value() {
    let (session, sim) = simulated(&[0x01]);
    sim.set_register(0x01, Channel::StrobePulseDelay, 0x02);
    let never = CancellationToken::new();

    let value = session
        .query(Channel::StrobePulseDelay, 0x01, &never)
        .await
        .unwrap();
    assert_eq!(value, 512);

    let raw = session
        .query(Command::StrbDelayRd, 0x01, &never)
        .await
        .unwrap();
    assert_eq!(raw, 512);
}

#[tokio::test]
async fn out_of_range_reply_fails_only_that_query() {
    let (session, sim) = simulated(&[0x01]);
    sim.set_register(0x01, Channel::StrobePulseWidth, 0x00);
    let never = CancellationToken::new();

    let err = session
        .query(Channel::StrobePulseWidth, 0x01, &never)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::OutOfRange { value: 0, .. }));
    assert!(!session.is_closed());

    sim.set_register(0x01, Channel::StrobePulseWidth, 0x32);
    assert_eq!(
        session
            .query(Channel::StrobePulseWidth, 0x01, &never)
            .await
            .unwrap(),
        100
    );
}

#[tokio::test]
async fn shutdown_releases_pending_query() {
    let (session, mut peer) = raw_peer();
    let never = CancellationToken::new();

    let pending = tokio::spawn({
        let session = session.clone();
        let never = never.clone();
        async move { session.query(Channel::StrobePulseWidth, 0x01, &never).await }
    });
    peer.next().await.unwrap().unwrap();

    session.shutdown().await.unwrap();
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::ConnectionClosed));

    // Link closed on our side.
    assert!(peer.next().await.is_none());
}

#[tokio::test]
async fn inbound_messages_are_timestamped() {
    let (near, far) = BusStream::memory_pair("bus", DEFAULT_MEMORY_CAPACITY);
    let clock = Arc::new(ManualClock::new(1_000));
    let session = Session::open(
        near,
        SessionConfig {
            clock: clock.clone(),
            ..SessionConfig::default()
        },
    );
    let mut events = session.subscribe();
    let mut peer = Framed::new(far, PacketCodec::new());

    peer.send(Packet::new(0x03, Command::StrbPwRd.code(), 0x32))
        .await
        .unwrap();
    let message = events.recv().await.unwrap();
    assert_eq!(message.metadata.timestamp, Some(1_000));
    assert_eq!(message.address(), 0x03);
    assert_eq!(message.payload, Some(100));
}

#[tokio::test]
async fn undecodable_packets_are_dropped() {
    let (session, mut peer) = raw_peer();
    let mut events = session.subscribe();

    peer.send(Packet::new(0x03, 0x42, 0x00)).await.unwrap();
    peer.send(Packet::new(0x03, Command::ReadErrors.code(), 0x07))
        .await
        .unwrap();

    let message = events.recv().await.unwrap();
    assert_eq!(message.metadata.command, Some(Command::ReadErrors));
    assert_eq!(message.payload, Some(7));
    assert!(!session.is_closed());
}

#[tokio::test]
async fn wait_for_matches_predicate() {
    let (session, mut peer) = raw_peer();
    let never = CancellationToken::new();
    let waiter = session.reply_waiter();

    peer.send(Packet::new(0x03, Command::ReadErrors.code(), 0x00))
        .await
        .unwrap();
    peer.send(Packet::new(0x04, Command::ReadErrors.code(), 0x01))
        .await
        .unwrap();

    let message = waiter
        .wait(|message| message.address() == 0x04, &never)
        .await
        .unwrap();
    assert_eq!(message.payload, Some(1));
}
