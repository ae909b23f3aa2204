use thiserror::Error;

/// Unrecoverable conditions for the currently loaded ROM.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmuError {
    #[error("illegal opcode {opcode:#04X} at {pc:#06X}")]
    IllegalOpcode { opcode: u8, pc: u16 },

    #[error("ROM image is {len} bytes, too small to hold a cartridge header")]
    RomTooSmall { len: usize },

    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedCartridgeType(u8),

    #[error("unknown ROM size code {0:#04X}")]
    UnknownRomSize(u8),

    #[error("unknown RAM size code {0:#04X}")]
    UnknownRamSize(u8),

    #[error("unknown licensee code {0:#04X}")]
    UnknownLicensee(u8),

    #[error("unknown new licensee code {0:?}")]
    UnknownNewLicensee(String),
}

pub type Result<T> = std::result::Result<T, EmuError>;
