use crate::gb::cartridge::mbc1::MBC1;
use crate::gb::cartridge::nombc::NoMBC;
use crate::gb::cartridge::{CartridgeConfig, ControllerType};
use std::sync::Arc;

/// Mediates every ROM and cartridge RAM access. Each implementation owns
/// the banking registers for one MBC variant.
pub trait BankController: Send {
    /// Reads a byte from the given address.
    fn read(&self, address: u16) -> u8;

    /// Writes a byte to the given address. For ROM addresses this updates
    /// banking registers rather than the (read-only) ROM contents.
    fn write(&mut self, address: u16, value: u8);
}

/// Creates a new `BankController` for the given ROM and `CartridgeConfig`.
pub fn new(config: CartridgeConfig, rom: Arc<[u8]>) -> Box<dyn BankController> {
    match config.controller {
        ControllerType::NoMBC => Box::new(NoMBC::new(config, rom)),
        ControllerType::MBC1 => Box::new(MBC1::new(config, rom)),
    }
}
