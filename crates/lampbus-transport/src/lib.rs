//! Duplex byte links for the lamp bus.
//!
//! The protocol layers above only need something that reads and writes bytes
//! asynchronously. This crate provides that over:
//! - a serial character device (`/dev/ttyUSB0`, line settings applied externally)
//! - a TCP serial bridge (ser2net and friends)
//! - a Unix domain socket (Linux/macOS)
//! - an in-memory pair, used by tests and the bus simulator
//!
//! This is the lowest layer of lampbus. Everything else builds on top of
//! the [`BusStream`] type provided here.

pub mod error;
pub mod stream;

pub use error::{Result, TransportError};
pub use stream::{BusStream, DEFAULT_MEMORY_CAPACITY};
