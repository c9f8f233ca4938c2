// Focusrite Scarlett Gen 2/3 vendor protocol definitions
// Recovered from USBPcap captures of the Windows control panel

use std::fmt;

/// USB control requests that carry the vendor command channel
pub mod request {
    /// bmRequestType: host-to-device, class, interface
    pub const TYPE_CMD_WRITE: u8 = 0x21;
    /// bmRequestType: device-to-host, class, interface
    pub const TYPE_CMD_READ: u8 = 0xA1;

    /// bRequest used to submit a command
    pub const CMD_REQ: u8 = 0x02;
    /// bRequest used to fetch the command response
    pub const CMD_RESP: u8 = 0x03;
}

/// Vendor command opcodes (first field of every envelope)
pub mod cmd {
    pub const INIT1: u32 = 0x0000_0000;
    pub const INIT2: u32 = 0x0000_0002;
    pub const SAVE_CONFIG: u32 = 0x0000_0006;
    pub const GET_METERS: u32 = 0x0000_1001;
    pub const SET_MIX: u32 = 0x0000_2002;
    pub const SET_MUX: u32 = 0x0000_3002;
    pub const GET_DATA: u32 = 0x0080_0000;
    pub const SET_DATA: u32 = 0x0080_0001;
    pub const DATA_CMD: u32 = 0x0080_0002;
}

/// Decoded vendor opcode
///
/// Every 32-bit value maps to exactly one variant; values outside the known
/// table are carried verbatim in `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Init1,
    Init2,
    SaveConfig,
    GetMeters,
    SetMix,
    SetMux,
    GetData,
    SetData,
    DataCmd,
    Unknown(u32),
}

impl Opcode {
    pub const KNOWN: &'static [Opcode] = &[
        Opcode::Init1,
        Opcode::Init2,
        Opcode::SaveConfig,
        Opcode::GetMeters,
        Opcode::SetMix,
        Opcode::SetMux,
        Opcode::GetData,
        Opcode::SetData,
        Opcode::DataCmd,
    ];

    /// Raw 32-bit opcode value
    pub fn code(self) -> u32 {
        match self {
            Opcode::Init1 => cmd::INIT1,
            Opcode::Init2 => cmd::INIT2,
            Opcode::SaveConfig => cmd::SAVE_CONFIG,
            Opcode::GetMeters => cmd::GET_METERS,
            Opcode::SetMix => cmd::SET_MIX,
            Opcode::SetMux => cmd::SET_MUX,
            Opcode::GetData => cmd::GET_DATA,
            Opcode::SetData => cmd::SET_DATA,
            Opcode::DataCmd => cmd::DATA_CMD,
            Opcode::Unknown(code) => code,
        }
    }

    /// Symbolic name, `None` for unmapped opcodes
    pub fn name(self) -> Option<&'static str> {
        Some(match self {
            Opcode::Init1 => "INIT1",
            Opcode::Init2 => "INIT2",
            Opcode::SaveConfig => "SAVE_CONFIG",
            Opcode::GetMeters => "GET_METERS",
            Opcode::SetMix => "SET_MIX",
            Opcode::SetMux => "SET_MUX",
            Opcode::GetData => "GET_DATA",
            Opcode::SetData => "SET_DATA",
            Opcode::DataCmd => "DATA_CMD",
            Opcode::Unknown(_) => return None,
        })
    }

    /// Look up an opcode by symbolic name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::KNOWN
            .iter()
            .copied()
            .find(|op| op.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

impl From<u32> for Opcode {
    fn from(v: u32) -> Self {
        match v {
            cmd::INIT1 => Self::Init1,
            cmd::INIT2 => Self::Init2,
            cmd::SAVE_CONFIG => Self::SaveConfig,
            cmd::GET_METERS => Self::GetMeters,
            cmd::SET_MIX => Self::SetMix,
            cmd::SET_MUX => Self::SetMux,
            cmd::GET_DATA => Self::GetData,
            cmd::SET_DATA => Self::SetData,
            cmd::DATA_CMD => Self::DataCmd,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "UNKNOWN(0x{:x})", self.code()),
        }
    }
}
