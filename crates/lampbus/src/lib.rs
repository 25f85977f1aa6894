//! Host-side driver for strobe-lamp multi-drop buses.
//!
//! A bus master forwards five-byte packets between the host and up to 252
//! lamps. lampbus turns that into named channels with logical values: writes
//! are verified by reading back, queries are paired with their replies, and
//! a discovery probe finds the device behind a link.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte links (serial device, TCP bridge, Unix socket, in-memory)
//! - [`frame`]: Packet framing, command table and message model
//! - [`session`]: Value scaling, correlation, discovery and a bus simulator

/// Re-export transport types.
pub mod transport {
    pub use lampbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use lampbus_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use lampbus_session::*;
}
