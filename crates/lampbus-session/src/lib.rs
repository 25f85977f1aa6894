//! Session layer for the strobe-lamp bus.
//!
//! This is the "just works" layer: open a [`Session`] on a bus link, then
//! read and write lamp channels by name. The session takes care of value
//! scaling, write verification, and pairing each query with its reply on a
//! wire protocol that has no request IDs.

pub mod abstraction;
pub mod correlator;
pub mod discovery;
pub mod error;
pub mod session;
pub mod simulator;
pub mod value;

pub use correlator::{Correlator, QueryPermit};
pub use discovery::{validate, DeviceId, Probe, ProbeConfig, ProbeOutcome, ProbeState};
pub use error::{Result, SessionError};
pub use session::{ReplyWaiter, Session, SessionConfig};
pub use simulator::{Simulator, SimulatorConfig};
pub use value::ValueRange;
