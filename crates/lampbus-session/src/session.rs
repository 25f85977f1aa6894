//! Duplex session over one bus link.
//!
//! Outbound: channel abstraction → value codec → correlator → packet codec.
//! Inbound: framer → packet codec → correlator → value codec → subscribers.
//!
//! A background reader task owns the inbound half. Closing the session,
//! whether by [`Session::shutdown`], by dropping the last handle, or by the
//! reader hitting an error, cancels one token that every waiter selects on.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lampbus_frame::{
    packet, Clock, Message, MonotonicClock, Packet, PacketCodec, PacketDecoder, Target, BROADCAST,
};
use lampbus_transport::BusStream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::abstraction;
use crate::correlator::Correlator;
use crate::error::{Result, SessionError};
use crate::value;

/// Default capacity of the inbound event stream.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Default limit on a single packet write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inbound messages buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
    /// Upper bound on writing one packet to the link. `None` waits forever.
    pub write_timeout: Option<Duration>,
    /// Clock used to timestamp inbound messages.
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

type PacketSink = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, PacketCodec>;

/// State shared with the reader task.
struct Shared {
    correlator: Correlator,
    events: broadcast::Sender<Message>,
    closed: CancellationToken,
    decoder: PacketDecoder,
}

struct Inner {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<PacketSink>,
    reader: Mutex<Option<JoinHandle<Result<()>>>>,
    config: SessionConfig,
    link_id: String,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shared.closed.cancel();
    }
}

/// Handle to an open session. Clones share the same link.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("link_id", &self.inner.link_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Open a session on a bus link. Must be called inside a tokio runtime.
    pub fn open(link: BusStream, config: SessionConfig) -> Self {
        let link_id = link.identity().to_string();
        Self::with_stream(link, link_id, config)
    }

    /// Open a session on any duplex byte stream.
    pub fn with_stream<S>(stream: S, link_id: impl Into<String>, config: SessionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let link_id = link_id.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let shared = Arc::new(Shared {
            correlator: Correlator::new(),
            events,
            closed: CancellationToken::new(),
            decoder: PacketDecoder::new(config.clock.clone()),
        });

        let frames = FramedRead::new(read_half, PacketCodec::new());
        let reader = tokio::spawn(run_reader(frames, shared.clone(), link_id.clone()));
        let sink: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write_half);

        debug!(link = %link_id, "session opened");
        Self {
            inner: Arc::new(Inner {
                shared,
                writer: tokio::sync::Mutex::new(FramedWrite::new(sink, PacketCodec::new())),
                reader: Mutex::new(Some(reader)),
                config,
                link_id,
            }),
        }
    }

    /// Identity of the underlying link.
    pub fn link_id(&self) -> &str {
        &self.inner.link_id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shared.closed.is_cancelled()
    }

    /// Stream of every inbound message that made it through the pipeline.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.inner.shared.events.subscribe()
    }

    /// Subscribe now, wait later. Create the waiter before sending whatever
    /// provokes the message so it cannot be missed.
    pub fn reply_waiter(&self) -> ReplyWaiter {
        ReplyWaiter {
            events: self.subscribe(),
            closed: self.inner.shared.closed.clone(),
        }
    }

    /// Wait for the next inbound message matching `predicate`.
    pub async fn wait_for<F>(&self, predicate: F, cancel: &CancellationToken) -> Result<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        self.reply_waiter().wait(predicate, cancel).await
    }

    /// Run a message through the outbound pipeline.
    ///
    /// Returns the correlated reply for non-broadcast queries and `None` for
    /// everything else. A channel without a command in the message's
    /// direction is logged and discarded.
    pub async fn send(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>> {
        let message = match abstraction::resolve(message) {
            Ok(message) => message,
            Err(SessionError::ChannelUnsupported { channel, direction }) => {
                warn!(%channel, direction, "channel has no command for this direction; message discarded");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.dispatch(message, cancel).await
    }

    /// Write a channel and read it back.
    ///
    /// Unicast writes are followed by a verification query on the same
    /// channel; broadcast writes are sent alone.
    pub async fn write(&self, message: Message, cancel: &CancellationToken) -> Result<()> {
        for message in abstraction::expand(message) {
            self.send(message, cancel).await?;
        }
        Ok(())
    }

    /// Read the logical value of `target` at `address`.
    pub async fn query(
        &self,
        target: impl Into<Target>,
        address: u8,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        if address == BROADCAST {
            return Err(SessionError::BroadcastQuery);
        }
        let mut message = abstraction::resolve(Message::query(address, target))?;
        value::encode_message(&mut message)?;
        let reply = self.correlate(message, cancel).await?;
        Ok(reply.payload.unwrap_or(0))
    }

    /// Send without touching the correlator. The caller is responsible for
    /// picking up any reply from the event stream.
    pub async fn send_uncorrelated(
        &self,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut message = abstraction::resolve(message)?;
        value::encode_message(&mut message)?;
        self.transmit(&message, cancel).await
    }

    /// Wait until the session closes and report why.
    pub async fn closed(&self) -> Result<()> {
        self.inner.shared.closed.cancelled().await;
        self.join_reader().await
    }

    /// Close the session.
    ///
    /// Releases every waiter with `ConnectionClosed`, closes the link and
    /// returns the reader's terminal error, if it stopped on one.
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.shared.closed.cancel();
        {
            let mut writer = self.inner.writer.lock().await;
            if let Err(err) = writer.close().await {
                debug!(%err, "error closing link");
            }
        }
        self.join_reader().await
    }

    async fn join_reader(&self) -> Result<()> {
        let handle = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return Ok(());
        };
        match handle.await {
            Ok(result) => result,
            Err(err) => {
                error!(%err, "session reader task failed");
                Err(SessionError::ConnectionClosed)
            }
        }
    }

    async fn dispatch(
        &self,
        mut message: Message,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>> {
        value::encode_message(&mut message)?;
        if message.is_query() && !message.is_broadcast() {
            return self.correlate(message, cancel).await.map(Some);
        }
        self.transmit(&message, cancel).await?;
        Ok(None)
    }

    /// Send a resolved, encoded query and wait for its reply.
    async fn correlate(&self, query: Message, cancel: &CancellationToken) -> Result<Message> {
        let shared = &self.inner.shared;
        let permit = shared
            .correlator
            .acquire(query.id, cancel, &shared.closed)
            .await?;
        if cancel.is_cancelled() {
            return Err(SessionError::Timeout { id: query.id });
        }

        let reply = permit.arm(&query)?;
        self.transmit(&query, cancel).await?;

        let result = tokio::select! {
            biased;
            reply = reply => reply.unwrap_or(Err(SessionError::ConnectionClosed)),
            _ = cancel.cancelled() => Err(SessionError::Timeout { id: query.id }),
            _ = shared.closed.cancelled() => Err(SessionError::ConnectionClosed),
        };
        drop(permit);
        result
    }

    /// Write one packet to the link.
    ///
    /// `cancel` only stops the packet while it is still unsent. If the send is
    /// abandoned for any reason, bytes still buffered for it are discarded
    /// so they never go out in front of the next packet.
    async fn transmit(&self, message: &Message, cancel: &CancellationToken) -> Result<()> {
        let packet = packet::encode(message)?;
        let id = message.id;

        let send = async {
            let mut slot = WriteSlot::new(self.inner.writer.lock().await);
            if cancel.is_cancelled() {
                return Err(SessionError::Timeout { id });
            }
            slot.writer.send(packet).await?;
            slot.sent = true;
            Ok(())
        };
        let bounded = async {
            match self.inner.config.write_timeout {
                Some(limit) => tokio::time::timeout(limit, send)
                    .await
                    .unwrap_or(Err(SessionError::Timeout { id })),
                None => send.await,
            }
        };

        let shared = &self.inner.shared;
        tokio::select! {
            biased;
            _ = shared.closed.cancelled() => Err(SessionError::ConnectionClosed),
            result = bounded => {
                if result.is_ok() {
                    trace!(%packet, %id, "sent");
                }
                result
            }
            _ = cancel.cancelled() => Err(SessionError::Timeout { id }),
        }
    }
}

/// Exclusive use of the link writer for one packet.
struct WriteSlot<'a> {
    writer: tokio::sync::MutexGuard<'a, PacketSink>,
    sent: bool,
}

impl<'a> WriteSlot<'a> {
    fn new(writer: tokio::sync::MutexGuard<'a, PacketSink>) -> Self {
        Self {
            writer,
            sent: false,
        }
    }
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        if self.sent {
            return;
        }
        // A packet cut short on the wire is garbage to the lamp's framer.
        let unsent = self.writer.write_buffer().len();
        if unsent > 0 {
            self.writer.write_buffer_mut().clear();
            debug!(unsent, "discarded unsent bytes");
        }
    }
}

/// One-shot wait on the inbound event stream, independent of the
/// correlator.
#[derive(Debug)]
pub struct ReplyWaiter {
    events: broadcast::Receiver<Message>,
    closed: CancellationToken,
}

impl ReplyWaiter {
    /// Resolve with the first message matching `predicate`. Fails with
    /// `Cancelled` when `cancel` fires and `ConnectionClosed` when the
    /// session closes first.
    pub async fn wait<F>(mut self, mut predicate: F, cancel: &CancellationToken) -> Result<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        loop {
            let event = tokio::select! {
                biased;
                event = self.events.recv() => event,
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = self.closed.cancelled() => return Err(SessionError::ConnectionClosed),
            };
            match event {
                Ok(message) if predicate(&message) => return Ok(message),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "reply waiter fell behind the event stream");
                }
                Err(RecvError::Closed) => return Err(SessionError::ConnectionClosed),
            }
        }
    }
}

async fn run_reader<R>(
    frames: FramedRead<R, PacketCodec>,
    shared: Arc<Shared>,
    link_id: String,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let result = read_loop(frames, &shared).await;
    match &result {
        Ok(()) => debug!(link = %link_id, "session reader stopped"),
        Err(err) => error!(link = %link_id, %err, "session reader failed"),
    }
    shared.closed.cancel();
    shared.correlator.close();
    result
}

async fn read_loop<R>(mut frames: FramedRead<R, PacketCodec>, shared: &Shared) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let packet = tokio::select! {
            _ = shared.closed.cancelled() => return Ok(()),
            next = frames.next() => match next {
                Some(packet) => packet?,
                None => return Ok(()),
            },
        };
        shared.handle_packet(packet)?;
    }
}

impl Shared {
    /// Inbound pipeline for one packet. Only a correlator desync is fatal.
    fn handle_packet(&self, packet: Packet) -> Result<()> {
        let mut message = match self.decoder.decode(&packet) {
            Ok(message) => message,
            Err(err) => {
                warn!(%packet, %err, "dropping undecodable packet");
                return Ok(());
            }
        };

        let waiter = self.correlator.claim(&mut message)?;

        if let Err(err) = value::decode_message(&mut message) {
            warn!(id = %message.id, %err, "dropping inbound message");
            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(err));
            }
            return Ok(());
        }

        trace!(%message, "received");
        if let Some(waiter) = waiter {
            let _ = waiter.send(Ok(message.clone()));
        }
        // No subscribers is fine.
        let _ = self.events.send(message);
        Ok(())
    }
}
