use std::sync::Arc;
use thiserror::Error;

/// Errors that can surface from the emulator core.
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("cartridge is invalid: {0}")]
    CartridgeInvalid(String),

    #[error("unsupported opcode {opcode:#04x} at pc={pc:#06x}")]
    UnsupportedOpcode { opcode: u8, pc: u16 },

    #[error("out of range access at address {0:#06x}")]
    OutOfRangeAccess(u16),

    #[error("failed to read ROM: {0}")]
    Io(#[from] std::io::Error),
}

pub type GBResult<T> = Result<T, EmulatorError>;

impl From<String> for EmulatorError {
    fn from(msg: String) -> Self {
        EmulatorError::CartridgeInvalid(msg)
    }
}

impl From<&str> for EmulatorError {
    fn from(msg: &str) -> Self {
        EmulatorError::CartridgeInvalid(msg.to_string())
    }
}

/// Thin alias used by cartridge ROM buffers, which are shared immutably
/// between the loaded cartridge and its bank controller.
pub type RomBytes = Arc<[u8]>;
