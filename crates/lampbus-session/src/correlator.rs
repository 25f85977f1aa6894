//! Request/response correlation for a bus without request IDs.
//!
//! At most one non-broadcast query is in flight per session. The next query
//! waits for the gate, FIFO, until the previous one has been answered or has
//! given up. While a query is pending every inbound message must be its
//! reply; anything else means the correlator has lost track of the bus.

use std::sync::{Mutex, PoisonError};

use lampbus_frame::{Command, Message, MessageId, Target};
use tokio::sync::{oneshot, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::{Result, SessionError};

/// Completion handle for the pending query.
pub type ReplySender = oneshot::Sender<Result<Message>>;

struct Pending {
    command: Command,
    target: Target,
    address: u8,
    reply: ReplySender,
}

/// Single-flight lock plus the slot describing the pending query.
#[derive(Default)]
pub struct Correlator {
    gate: tokio::sync::Mutex<()>,
    slot: Mutex<Option<Pending>>,
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate. Fails with `Timeout` if `cancel` fires first and
    /// with `ConnectionClosed` if the session closes first.
    pub async fn acquire(
        &self,
        id: MessageId,
        cancel: &CancellationToken,
        closed: &CancellationToken,
    ) -> Result<QueryPermit<'_>> {
        let guard = tokio::select! {
            biased;
            _ = closed.cancelled() => return Err(SessionError::ConnectionClosed),
            _ = cancel.cancelled() => return Err(SessionError::Timeout { id }),
            guard = self.gate.lock() => guard,
        };
        Ok(QueryPermit {
            _guard: guard,
            correlator: self,
        })
    }

    /// True while a query is waiting for its reply.
    pub fn is_locked(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Match an inbound message against the pending query.
    ///
    /// With nothing pending the message passes through and `Ok(None)` is
    /// returned. A matching reply is rewritten to the address and target of
    /// the query (the master forwards replies under its own address) and the
    /// completion handle is returned. A mismatch is an `UnexpectedReply`.
    pub fn claim(&self, message: &mut Message) -> Result<Option<ReplySender>> {
        let mut slot = self.lock_slot();
        let Some(pending) = slot.as_ref() else {
            return Ok(None);
        };

        if message.metadata.command != Some(pending.command) {
            error!(
                expected = %pending.command,
                received = %message.id,
                "reply does not match pending query"
            );
            return Err(SessionError::UnexpectedReply {
                expected: pending.command,
                received: message.id,
            });
        }

        let Some(pending) = slot.take() else {
            return Ok(None);
        };
        message.id = MessageId::new(pending.address, pending.target);
        message.metadata.address = pending.address;
        message.metadata.channel = pending.target.channel();
        debug!(id = %message.id, "reply correlated");
        Ok(Some(pending.reply))
    }

    /// Drop the pending completion handle; its waiter sees the channel close.
    pub fn close(&self) {
        self.lock_slot().take();
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<Pending>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to have one query in flight.
///
/// Dropping the permit clears the pending slot and opens the gate for the
/// next waiter, whatever the outcome of the query was.
#[derive(Debug)]
pub struct QueryPermit<'a> {
    _guard: MutexGuard<'a, ()>,
    correlator: &'a Correlator,
}

impl QueryPermit<'_> {
    /// Record `query` as pending and return the receiver its reply lands on.
    /// The query must already have its command resolved.
    pub fn arm(&self, query: &Message) -> Result<oneshot::Receiver<Result<Message>>> {
        let command = query
            .metadata
            .command
            .ok_or_else(|| lampbus_frame::FrameError::UnresolvedCommand {
                id: query.id.to_string(),
            })?;
        let (tx, rx) = oneshot::channel();
        *self.correlator.lock_slot() = Some(Pending {
            command,
            target: query.id.target,
            address: query.address(),
            reply: tx,
        });
        Ok(rx)
    }
}

impl Drop for QueryPermit<'_> {
    fn drop(&mut self) {
        self.correlator.close();
    }
}
