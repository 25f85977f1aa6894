//! Device discovery.
//!
//! Walks the address space asking each address for its firmware version.
//! The first address that answers identifies the link; its [`DeviceId`] is
//! the firmware version plus a hash of the link identity.

use std::fmt;
use std::time::Duration;

use lampbus_frame::{Command, Message, MASTER};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{Result, SessionError};
use crate::session::Session;

/// Default number of sweeps over the address range.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Default per-address reply deadline.
pub const DEFAULT_PER_ADDRESS_TIMEOUT: Duration = Duration::from_millis(10);

/// Discovery configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Full sweeps before giving up.
    pub attempts: u32,
    /// First address probed in each sweep.
    pub first_address: u8,
    /// Last address probed in each sweep, inclusive.
    pub last_address: u8,
    /// How long to wait for a reply at each address.
    pub per_address_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            first_address: 0x01,
            last_address: 0xFE,
            per_address_timeout: DEFAULT_PER_ADDRESS_TIMEOUT,
        }
    }
}

/// Stable identity of a device: `"{firmware_version}-{link_hash:016x}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    firmware_version: i64,
    link_hash: u64,
}

impl DeviceId {
    pub fn new(firmware_version: i64, link_id: &str) -> Self {
        Self {
            firmware_version,
            link_hash: xxh3_64(link_id.as_bytes()),
        }
    }

    pub fn firmware_version(&self) -> i64 {
        self.firmware_version
    }

    pub fn link_hash(&self) -> u64 {
        self.link_hash
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:016x}", self.firmware_version, self.link_hash)
    }
}

/// Result of a completed discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Resolved(DeviceId),
    Exhausted,
}

impl ProbeOutcome {
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            ProbeOutcome::Resolved(id) => Some(id),
            ProbeOutcome::Exhausted => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Probing,
    Resolved,
    Exhausted,
}

/// One discovery run over a session.
#[derive(Debug)]
pub struct Probe<'a> {
    session: &'a Session,
    config: ProbeConfig,
    state: ProbeState,
    resolved: Option<DeviceId>,
    attempt: u32,
    address: u8,
    probes: u64,
}

impl<'a> Probe<'a> {
    pub fn new(session: &'a Session, config: ProbeConfig) -> Self {
        let address = config.first_address;
        Self {
            session,
            config,
            state: ProbeState::Probing,
            resolved: None,
            attempt: 0,
            address,
            probes: 0,
        }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// Current sweep, counting from zero.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Address probed most recently.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Version queries issued so far, including ones the link refused.
    pub fn probes(&self) -> u64 {
        self.probes
    }

    /// Sweep until an address answers, the attempts run out, or `cancel`
    /// fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<ProbeOutcome> {
        if let Some(id) = &self.resolved {
            return Ok(ProbeOutcome::Resolved(id.clone()));
        }

        for attempt in 0..self.config.attempts {
            self.attempt = attempt;
            for address in self.config.first_address..=self.config.last_address {
                if cancel.is_cancelled() {
                    return Err(SessionError::Cancelled);
                }
                self.address = address;
                self.probes += 1;

                if let Some(reply) = self.probe_address(address, cancel).await? {
                    return Ok(ProbeOutcome::Resolved(self.resolve(&reply)));
                }
            }
            debug!(attempt, "discovery sweep finished without a reply");
        }

        self.state = ProbeState::Exhausted;
        info!(link = self.session.link_id(), "discovery exhausted");
        Ok(ProbeOutcome::Exhausted)
    }

    /// First success wins; a second reply cannot change the identity.
    fn resolve(&mut self, reply: &Message) -> DeviceId {
        if let Some(id) = &self.resolved {
            return id.clone();
        }
        let id = DeviceId::new(reply.payload.unwrap_or(0), self.session.link_id());
        info!(
            probed = self.address,
            replied_from = reply.address(),
            device = %id,
            "device discovered"
        );
        self.state = ProbeState::Resolved;
        self.resolved = Some(id.clone());
        id
    }

    /// Ask one address for its version. The per-address deadline covers
    /// both the send and the wait for the reply.
    async fn probe_address(
        &self,
        address: u8,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>> {
        let token = cancel.child_token();
        let waiter = self.session.reply_waiter();

        let exchange = async {
            let request = Message::query(address, Command::RdVersion);
            if let Err(err) = self.session.send_uncorrelated(request, &token).await {
                if matches!(err, SessionError::ConnectionClosed) {
                    return Err(err);
                }
                debug!(address, %err, "probe not sent");
                return Ok(None);
            }
            waiter
                .wait(
                    |message| {
                        message.metadata.command == Some(Command::RdVersion)
                            && (message.address() == address || message.address() == MASTER)
                    },
                    &token,
                )
                .await
                .map(Some)
        };
        let result = tokio::time::timeout(self.config.per_address_timeout, exchange).await;
        token.cancel();

        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        match result {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(None),
        }
    }
}

/// Find the device behind `session`.
///
/// Replies are read from the event stream without the correlator, so no
/// correlated query may be in flight on the session while this runs.
pub async fn validate(
    session: &Session,
    cancel: &CancellationToken,
    config: &ProbeConfig,
) -> Result<ProbeOutcome> {
    Probe::new(session, config.clone()).run(cancel).await
}
