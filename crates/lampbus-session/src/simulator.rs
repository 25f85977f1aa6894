//! In-process strobe-lamp bus.
//!
//! Serves the wire protocol on any duplex stream the way a bus master with a
//! few lamps attached would: queries to a present lamp are answered, writes
//! update the lamp's registers, broadcast writes reach every lamp, and
//! nothing else ever gets a reply.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use lampbus_frame::{Channel, Command, Packet, PacketCodec, BROADCAST, MASTER};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::error::Result;

/// Firmware version reported by simulated lamps unless configured.
pub const DEFAULT_FIRMWARE_VERSION: u8 = 0x1d;

/// Simulated bus configuration.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Addresses of the lamps on the bus.
    pub lamps: Vec<u8>,
    /// Value answered to `CMD_RD_VERSION`.
    pub firmware_version: u8,
    /// Answer from the master address (`0x00`) like a real bus master does,
    /// instead of from the lamp's own address.
    pub reply_from_master: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            lamps: vec![0x01],
            firmware_version: DEFAULT_FIRMWARE_VERSION,
            reply_from_master: true,
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    lamps: BTreeSet<u8>,
    /// Register values keyed by lamp address and the command that reads them.
    registers: HashMap<(u8, Command), u8>,
}

/// A simulated bus. Clones share the same lamps and counters.
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulatorConfig,
    state: Arc<Mutex<BusState>>,
    received: Arc<AtomicU64>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let state = BusState {
            lamps: config.lamps.iter().copied().collect(),
            registers: HashMap::new(),
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Packets received so far, across every served stream.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Addresses currently answering on the bus.
    pub fn lamps(&self) -> Vec<u8> {
        self.lock().lamps.iter().copied().collect()
    }

    /// Raw register behind a channel, as the lamp would report it.
    pub fn register(&self, address: u8, channel: Channel) -> Option<u8> {
        let command = channel.read_command()?;
        let state = self.lock();
        state
            .lamps
            .contains(&address)
            .then(|| read_register(&state, address, command))
    }

    /// Preload a raw register value.
    pub fn set_register(&self, address: u8, channel: Channel, wire: u8) {
        if let Some(command) = channel.read_command() {
            self.lock().registers.insert((address, command), wire);
        }
    }

    /// Serve one connection until the peer closes it.
    pub async fn serve<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, PacketCodec::new());
        while let Some(packet) = framed.next().await {
            let packet = packet?;
            if let Some(reply) = self.respond(&packet) {
                framed.send(reply).await?;
            }
        }
        debug!(received = self.received(), "simulated bus connection closed");
        Ok(())
    }

    /// Process one packet and produce the reply, if any.
    pub fn respond(&self, packet: &Packet) -> Option<Packet> {
        self.received.fetch_add(1, Ordering::Relaxed);
        trace!(%packet, "simulator received");

        let Some(command) = Command::from_code(packet.command()) else {
            debug!(code = packet.command(), "simulator ignoring unknown command");
            return None;
        };

        let mut state = self.lock();
        let address = packet.address();
        if address == BROADCAST {
            if !command.is_query() {
                let lamps: Vec<u8> = state.lamps.iter().copied().collect();
                for lamp in lamps {
                    apply_write(&mut state, lamp, command, packet.data());
                }
            }
            return None;
        }
        if !state.lamps.contains(&address) {
            return None;
        }

        if !command.is_query() {
            apply_write(&mut state, address, command, packet.data());
            return None;
        }

        let value = match command {
            Command::RdVersion => self.config.firmware_version,
            _ => read_register(&state, address, command),
        };
        let from = if self.config.reply_from_master {
            MASTER
        } else {
            address
        };
        Some(Packet::new(from, command.code(), value))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_register(state: &BusState, address: u8, command: Command) -> u8 {
    state
        .registers
        .get(&(address, command))
        .copied()
        .unwrap_or(match command {
            // Shortest pulse the lamp supports.
            Command::StrbPwRd => 0x32,
            _ => 0x00,
        })
}

fn apply_write(state: &mut BusState, address: u8, command: Command, data: u8) {
    match command {
        Command::SetAddress => {
            if data == address || state.lamps.contains(&data) {
                return;
            }
            state.lamps.remove(&address);
            state.lamps.insert(data);
            let moved: Vec<(Command, u8)> = state
                .registers
                .iter()
                .filter(|((lamp, _), _)| *lamp == address)
                .map(|((_, command), value)| (*command, *value))
                .collect();
            for (command, value) in moved {
                state.registers.remove(&(address, command));
                state.registers.insert((data, command), value);
            }
        }
        Command::PulseAmpSet => {
            state.registers.insert((address, Command::PulseAmpTRd), data);
            state.registers.insert((address, Command::PulseAmpBRd), data);
        }
        Command::SetMode => {
            state.registers.insert((address, Command::RdMode), data);
        }
        _ => {
            if let Some(read) = Channel::from_command(command).and_then(Channel::read_command) {
                state.registers.insert((address, read), data);
            } else {
                debug!(address, %command, "simulated lamp acted on command");
            }
        }
    }
}
