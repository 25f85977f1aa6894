//! The fixed command table.
//!
//! Every command byte the lamp firmware understands, with its symbolic name.
//! Read commands (`0x5_`) are queries: the device answers through the bus
//! master with the same command byte and the value in the data byte.

use std::fmt;

/// A command understood by the lamp controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    PulseAmpRd,
    PulseAmpTbRd,
    PulseAmpTRd,
    PulseAmpBRd,
    StrbPwRd,
    StrbDelayRd,
    RdMode,
    RdVersion,
    OffsetRd,
    ScaleRd,
    EngrRd,
    ReadErrors,
    PulseAmpSet,
    SetAddress,
    TriggerNow,
    JmpBoot,
    JmpApp,
    PulseAmpTSet,
    PulseAmpBSet,
    StrbPwSet,
    StrbDelaySet,
    SetMode,
}

impl Command {
    /// Every command, ordered by code.
    pub const ALL: [Command; 22] = [
        Command::PulseAmpRd,
        Command::PulseAmpTbRd,
        Command::PulseAmpTRd,
        Command::PulseAmpBRd,
        Command::StrbPwRd,
        Command::StrbDelayRd,
        Command::RdMode,
        Command::RdVersion,
        Command::OffsetRd,
        Command::ScaleRd,
        Command::EngrRd,
        Command::ReadErrors,
        Command::PulseAmpSet,
        Command::SetAddress,
        Command::TriggerNow,
        Command::JmpBoot,
        Command::JmpApp,
        Command::PulseAmpTSet,
        Command::PulseAmpBSet,
        Command::StrbPwSet,
        Command::StrbDelaySet,
        Command::SetMode,
    ];

    /// The wire byte for this command.
    pub const fn code(self) -> u8 {
        match self {
            Command::PulseAmpRd => 0x50,
            Command::PulseAmpTbRd => 0x51,
            Command::PulseAmpTRd => 0x52,
            Command::PulseAmpBRd => 0x53,
            Command::StrbPwRd => 0x54,
            Command::StrbDelayRd => 0x55,
            Command::RdMode => 0x56,
            Command::RdVersion => 0x57,
            Command::OffsetRd => 0x58,
            Command::ScaleRd => 0x59,
            Command::EngrRd => 0x5A,
            Command::ReadErrors => 0x5B,
            Command::PulseAmpSet => 0x83,
            Command::SetAddress => 0xA0,
            Command::TriggerNow => 0xA5,
            Command::JmpBoot => 0xB0,
            Command::JmpApp => 0xB1,
            Command::PulseAmpTSet => 0xC2,
            Command::PulseAmpBSet => 0xC3,
            Command::StrbPwSet => 0xC4,
            Command::StrbDelaySet => 0xC5,
            Command::SetMode => 0xC6,
        }
    }

    /// Look up a command by wire byte.
    pub const fn from_code(code: u8) -> Option<Self> {
        let command = match code {
            0x50 => Command::PulseAmpRd,
            0x51 => Command::PulseAmpTbRd,
            0x52 => Command::PulseAmpTRd,
            0x53 => Command::PulseAmpBRd,
            0x54 => Command::StrbPwRd,
            0x55 => Command::StrbDelayRd,
            0x56 => Command::RdMode,
            0x57 => Command::RdVersion,
            0x58 => Command::OffsetRd,
            0x59 => Command::ScaleRd,
            0x5A => Command::EngrRd,
            0x5B => Command::ReadErrors,
            0x83 => Command::PulseAmpSet,
            0xA0 => Command::SetAddress,
            0xA5 => Command::TriggerNow,
            0xB0 => Command::JmpBoot,
            0xB1 => Command::JmpApp,
            0xC2 => Command::PulseAmpTSet,
            0xC3 => Command::PulseAmpBSet,
            0xC4 => Command::StrbPwSet,
            0xC5 => Command::StrbDelaySet,
            0xC6 => Command::SetMode,
            _ => return None,
        };
        Some(command)
    }

    /// Symbolic name, as used in message IDs and logs.
    pub const fn name(self) -> &'static str {
        match self {
            Command::PulseAmpRd => "CMD_PULSE_AMP_RD",
            Command::PulseAmpTbRd => "CMD_PULSE_AMP_TB_RD",
            Command::PulseAmpTRd => "CMD_PULSE_AMP_T_RD",
            Command::PulseAmpBRd => "CMD_PULSE_AMP_B_RD",
            Command::StrbPwRd => "CMD_STRB_PW_RD",
            Command::StrbDelayRd => "CMD_STRB_DELAY_RD",
            Command::RdMode => "CMD_RD_MODE",
            Command::RdVersion => "CMD_RD_VERSION",
            Command::OffsetRd => "CMD_OFFSET_RD",
            Command::ScaleRd => "CMD_SCALE_RD",
            Command::EngrRd => "CMD_ENGR_RD",
            Command::ReadErrors => "CMD_READ_ERRORS",
            Command::PulseAmpSet => "CMD_PULSE_AMP_SET",
            Command::SetAddress => "CMD_SET_ADDRESS",
            Command::TriggerNow => "CMD_TRIGGER_NOW",
            Command::JmpBoot => "CMD_JMP_BOOT",
            Command::JmpApp => "CMD_JMP_APP",
            Command::PulseAmpTSet => "CMD_PULSE_AMP_T_SET",
            Command::PulseAmpBSet => "CMD_PULSE_AMP_B_SET",
            Command::StrbPwSet => "CMD_STRB_PW_SET",
            Command::StrbDelaySet => "CMD_STRB_DELAY_SET",
            Command::SetMode => "CMD_SET_MODE",
        }
    }

    /// Look up a command by symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    /// Returns true for read commands, which the device answers.
    pub const fn is_query(self) -> bool {
        matches!(
            self,
            Command::PulseAmpRd
                | Command::PulseAmpTbRd
                | Command::PulseAmpTRd
                | Command::PulseAmpBRd
                | Command::StrbPwRd
                | Command::StrbDelayRd
                | Command::RdMode
                | Command::RdVersion
                | Command::OffsetRd
                | Command::ScaleRd
                | Command::EngrRd
                | Command::ReadErrors
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
