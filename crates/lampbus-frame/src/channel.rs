//! Application-level channels.
//!
//! A channel names a lamp setting independently of the read/write command
//! asymmetry on the wire. Each channel has at most one read command and at
//! most one write command; a missing direction means the setting is
//! write-only or read-only.

use std::fmt;

use crate::command::Command;

/// A stable, hardware-independent lamp setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    LampAddress,
    PulseIntensityBottomIr,
    PulseIntensityTopWhite,
    StrobePulseWidth,
    StrobePulseDelay,
    HealthStatus,
    TriggerStrobe,
    LampFirmwareVersion,
    JumpToBootloader,
    JumpToApplication,
    CalibrationOffset,
    CalibrationScale,
    EngineeringData,
    Options,
}

impl Channel {
    /// Every channel.
    pub const ALL: [Channel; 14] = [
        Channel::LampAddress,
        Channel::PulseIntensityBottomIr,
        Channel::PulseIntensityTopWhite,
        Channel::StrobePulseWidth,
        Channel::StrobePulseDelay,
        Channel::HealthStatus,
        Channel::TriggerStrobe,
        Channel::LampFirmwareVersion,
        Channel::JumpToBootloader,
        Channel::JumpToApplication,
        Channel::CalibrationOffset,
        Channel::CalibrationScale,
        Channel::EngineeringData,
        Channel::Options,
    ];

    /// Channel name, as used in message IDs.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::LampAddress => "lamp_address",
            Channel::PulseIntensityBottomIr => "pulse_intensity_bottom_ir",
            Channel::PulseIntensityTopWhite => "pulse_intensity_top_white",
            Channel::StrobePulseWidth => "strobe_pulse_width",
            Channel::StrobePulseDelay => "strobe_pulse_delay",
            Channel::HealthStatus => "health_status",
            Channel::TriggerStrobe => "trigger_strobe",
            Channel::LampFirmwareVersion => "lamp_firmware_version",
            Channel::JumpToBootloader => "jump_to_bootloader",
            Channel::JumpToApplication => "jump_to_application",
            Channel::CalibrationOffset => "calibration_offset",
            Channel::CalibrationScale => "calibration_scale",
            Channel::EngineeringData => "engineering_data",
            Channel::Options => "options",
        }
    }

    /// Look up a channel by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.name() == name)
    }

    /// Command used to read this channel, if it can be read.
    pub const fn read_command(self) -> Option<Command> {
        match self {
            Channel::LampAddress => None,
            Channel::PulseIntensityBottomIr => Some(Command::PulseAmpBRd),
            Channel::PulseIntensityTopWhite => Some(Command::PulseAmpTRd),
            Channel::StrobePulseWidth => Some(Command::StrbPwRd),
            Channel::StrobePulseDelay => Some(Command::StrbDelayRd),
            Channel::HealthStatus => Some(Command::ReadErrors),
            Channel::TriggerStrobe => None,
            Channel::LampFirmwareVersion => Some(Command::RdVersion),
            Channel::JumpToBootloader => None,
            Channel::JumpToApplication => None,
            Channel::CalibrationOffset => Some(Command::OffsetRd),
            Channel::CalibrationScale => Some(Command::ScaleRd),
            Channel::EngineeringData => Some(Command::EngrRd),
            Channel::Options => None,
        }
    }

    /// Command used to write this channel, if it can be written.
    pub const fn write_command(self) -> Option<Command> {
        match self {
            Channel::LampAddress => Some(Command::SetAddress),
            Channel::PulseIntensityBottomIr => Some(Command::PulseAmpBSet),
            Channel::PulseIntensityTopWhite => Some(Command::PulseAmpTSet),
            Channel::StrobePulseWidth => Some(Command::StrbPwSet),
            Channel::StrobePulseDelay => Some(Command::StrbDelaySet),
            Channel::HealthStatus => None,
            Channel::TriggerStrobe => Some(Command::TriggerNow),
            Channel::LampFirmwareVersion => None,
            Channel::JumpToBootloader => Some(Command::JmpBoot),
            Channel::JumpToApplication => Some(Command::JmpApp),
            Channel::CalibrationOffset => None,
            Channel::CalibrationScale => None,
            Channel::EngineeringData => None,
            Channel::Options => Some(Command::SetMode),
        }
    }

    /// Command for the given direction.
    pub const fn command(self, query: bool) -> Option<Command> {
        if query {
            self.read_command()
        } else {
            self.write_command()
        }
    }

    /// The channel a command belongs to, in either direction.
    ///
    /// Commands that no channel references (combined-intensity reads, mode
    /// read) return `None` and are only addressable by command name.
    pub const fn from_command(command: Command) -> Option<Self> {
        let channel = match command {
            Command::SetAddress => Channel::LampAddress,
            Command::PulseAmpBRd | Command::PulseAmpBSet => Channel::PulseIntensityBottomIr,
            Command::PulseAmpTRd | Command::PulseAmpTSet => Channel::PulseIntensityTopWhite,
            Command::StrbPwRd | Command::StrbPwSet => Channel::StrobePulseWidth,
            Command::StrbDelayRd | Command::StrbDelaySet => Channel::StrobePulseDelay,
            Command::ReadErrors => Channel::HealthStatus,
            Command::TriggerNow => Channel::TriggerStrobe,
            Command::RdVersion => Channel::LampFirmwareVersion,
            Command::JmpBoot => Channel::JumpToBootloader,
            Command::JmpApp => Channel::JumpToApplication,
            Command::OffsetRd => Channel::CalibrationOffset,
            Command::ScaleRd => Channel::CalibrationScale,
            Command::EngrRd => Channel::EngineeringData,
            Command::SetMode => Channel::Options,
            Command::PulseAmpRd | Command::PulseAmpTbRd | Command::RdMode | Command::PulseAmpSet => {
                return None
            }
        };
        Some(channel)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_maps_agree_with_reverse_map() {
        for channel in Channel::ALL {
            if let Some(read) = channel.read_command() {
                assert!(read.is_query(), "{channel} read command {read} is not a query");
                assert_eq!(Channel::from_command(read), Some(channel));
            }
            if let Some(write) = channel.write_command() {
                assert!(!write.is_query(), "{channel} write command {write} is a query");
                assert_eq!(Channel::from_command(write), Some(channel));
            }
        }
    }

    #[test]
    fn every_channel_has_a_direction() {
        for channel in Channel::ALL {
            assert!(channel.read_command().is_some() || channel.write_command().is_some());
        }
    }

    #[test]
    fn unmapped_commands_have_no_channel() {
        let unmapped: Vec<Command> = Command::ALL
            .into_iter()
            .filter(|c| Channel::from_command(*c).is_none())
            .collect();
        assert_eq!(
            unmapped,
            vec![
                Command::PulseAmpRd,
                Command::PulseAmpTbRd,
                Command::RdMode,
                Command::PulseAmpSet
            ]
        );
    }

    #[test]
    fn names_roundtrip_and_never_collide_with_commands() {
        for channel in Channel::ALL {
            assert_eq!(Channel::from_name(channel.name()), Some(channel));
            assert_eq!(Command::from_name(channel.name()), None);
        }
    }

    #[test]
    fn direction_lookup() {
        assert_eq!(Channel::StrobePulseWidth.command(true), Some(Command::StrbPwRd));
        assert_eq!(Channel::StrobePulseWidth.command(false), Some(Command::StrbPwSet));
        assert_eq!(Channel::LampAddress.command(true), None);
        assert_eq!(Channel::LampFirmwareVersion.command(false), None);
    }
}
