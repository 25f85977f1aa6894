//! Value codec: linear scaling between logical channel values and the data
//! byte on the wire.
//!
//! Every channel declares a logical range and a wire range. Outbound values
//! are mapped logical → wire, inbound values wire → logical, both with
//! round-half-away-from-zero. Targets without a declared range pass through
//! unchanged within `0..=255`.

use lampbus_frame::{Channel, Message, Target};
use tracing::trace;

use crate::error::{Result, SessionError};

/// A pair of inclusive ranges mapped linearly onto each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    pub logical_min: i64,
    pub logical_max: i64,
    pub wire_min: u8,
    pub wire_max: u8,
}

impl ValueRange {
    /// Raw byte passthrough.
    pub const IDENTITY: ValueRange = ValueRange::new(0, 255, 0x00, 0xFF);

    pub const fn new(logical_min: i64, logical_max: i64, wire_min: u8, wire_max: u8) -> Self {
        Self {
            logical_min,
            logical_max,
            wire_min,
            wire_max,
        }
    }

    /// Declared range of a channel.
    pub const fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::LampAddress => Self::new(1, 252, 0x01, 0xFC),
            Channel::PulseIntensityBottomIr => Self::new(0, 100, 0x00, 0xFF),
            Channel::PulseIntensityTopWhite => Self::new(0, 100, 0x00, 0x1F),
            Channel::StrobePulseWidth => Self::new(100, 500, 0x32, 0xFA),
            Channel::StrobePulseDelay => Self::new(0, 65280, 0x00, 0xFF),
            Channel::Options => Self::new(0x00, 0x26, 0x00, 0x26),
            _ => Self::IDENTITY,
        }
    }

    /// Range for a message target; commands use their channel's range.
    pub const fn for_target(target: Target) -> Self {
        match target.channel() {
            Some(channel) => Self::for_channel(channel),
            None => Self::IDENTITY,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Map a logical value to its data byte.
    pub fn to_wire(&self, value: i64) -> Option<u8> {
        if value < self.logical_min || value > self.logical_max {
            return None;
        }
        let wire = scale(
            value,
            (self.logical_min, self.logical_max),
            (i64::from(self.wire_min), i64::from(self.wire_max)),
        );
        u8::try_from(wire).ok()
    }

    /// Map a data byte to its logical value.
    pub fn to_logical(&self, wire: u8) -> Option<i64> {
        if wire < self.wire_min || wire > self.wire_max {
            return None;
        }
        Some(scale(
            i64::from(wire),
            (i64::from(self.wire_min), i64::from(self.wire_max)),
            (self.logical_min, self.logical_max),
        ))
    }
}

fn scale(value: i64, from: (i64, i64), to: (i64, i64)) -> i64 {
    let (from_min, from_max) = from;
    let (to_min, to_max) = to;
    if from_max == from_min {
        return to_min;
    }
    let span = (to_max - to_min) as f64 / (from_max - from_min) as f64;
    // f64::round rounds half away from zero.
    ((value - from_min) as f64 * span + to_min as f64).round() as i64
}

/// Logical value → data byte for `target`.
pub fn encode_value(target: Target, value: i64) -> Result<u8> {
    let range = ValueRange::for_target(target);
    range.to_wire(value).ok_or(SessionError::OutOfRange {
        target,
        value,
        min: range.logical_min,
        max: range.logical_max,
    })
}

/// Data byte → logical value for `target`.
pub fn decode_value(target: Target, wire: u8) -> Result<i64> {
    let range = ValueRange::for_target(target);
    range.to_logical(wire).ok_or(SessionError::OutOfRange {
        target,
        value: i64::from(wire),
        min: i64::from(range.wire_min),
        max: i64::from(range.wire_max),
    })
}

/// Outbound step: queries always carry `0x00`, everything else is scaled.
/// A missing payload is sent as `0x00` as well.
pub fn encode_message(message: &mut Message) -> Result<()> {
    if message.is_query() {
        message.payload = Some(0);
        return Ok(());
    }
    if let Some(value) = message.payload {
        let wire = encode_value(message.id.target, value)?;
        trace!(id = %message.id, value, wire, "scaled outbound value");
        message.payload = Some(i64::from(wire));
    }
    Ok(())
}

/// Inbound step: scale the raw data byte to the channel's logical range.
pub fn decode_message(message: &mut Message) -> Result<()> {
    let Some(raw) = message.payload else {
        return Ok(());
    };
    let wire = u8::try_from(raw).map_err(|_| SessionError::OutOfRange {
        target: message.id.target,
        value: raw,
        min: 0x00,
        max: 0xFF,
    })?;
    message.payload = Some(decode_value(message.id.target, wire)?);
    Ok(())
}
