use crate::gb::cartridge::controller::BankController;
use crate::gb::cartridge::{CartridgeConfig, RAM_BANK_SIZE, ROM_BANK_SIZE, bank_mask};
use crate::gb::constants::*;
use std::sync::Arc;

/// Before external RAM can be read or written, it must be enabled by
/// writing 0x0A to anywhere in this address space. Any value with 0x0A in
/// the lower 4 bits enables the RAM attached to the MBC, any other value
/// disables it.
const RAM_ENABLE_BEGIN: u16 = 0x0000;
const RAM_ENABLE_END: u16 = 0x1FFF;

/// This 5-bit register (range $01-$1F) selects the ROM bank number for the
/// 4000-7FFF region. Higher bits are discarded. If set to $00, it behaves
/// as if set to $01.
const ROM_BANK_NUMBER_BEGIN: u16 = 0x2000;
const ROM_BANK_NUMBER_END: u16 = 0x3FFF;

/// This 2-bit register selects a RAM bank in range $00-$03 (32 KiB RAM
/// carts only), or specifies the upper two bits of the ROM bank number
/// (1 MiB ROM or larger carts only).
const RAM_BANK_NUMBER_BEGIN: u16 = 0x4000;
const RAM_BANK_NUMBER_END: u16 = 0x5FFF;

/// This 1-bit register selects between the two MBC1 banking modes. If the
/// cart is not large enough to use the 2-bit register (<=8 KiB RAM and
/// <=512 KiB ROM) this mode select has no observable effect.
const BANKING_MODE_SELECT_BEGIN: u16 = 0x6000;
const BANKING_MODE_SELECT_END: u16 = 0x7FFF;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum BankingMode {
    Simple,
    Advanced,
}

/// In its default configuration, MBC1 supports up to 512 KiB ROM with up
/// to 32 KiB of banked RAM. Cartridges with 1 MiB of ROM or more wire the
/// 2-bit register as an extension of the ROM bank number instead, at the
/// cost of a fixed 8 KiB of RAM.
pub struct MBC1 {
    config: CartridgeConfig,
    rom: Arc<[u8]>,
    ram: Vec<u8>,
    low_rom_bank_offset: usize,
    high_rom_bank_offset: usize,
    ram_bank_offset: usize,
    has_ram_access: bool,
    bank_low_bits: u8,
    bank_high_bits: u8,
    banking_mode: BankingMode,
}

impl MBC1 {
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>) -> Self {
        Self {
            ram: vec![0; config.ram_size()],
            low_rom_bank_offset: 0,
            high_rom_bank_offset: ROM_HIGH_BANK_BEGIN as usize,
            ram_bank_offset: 0,
            has_ram_access: false,
            banking_mode: BankingMode::Simple,
            bank_low_bits: 0b0000_0001,
            bank_high_bits: 0b0000_0000,
            rom,
            config,
        }
    }

    /// Recomputes the ROM bank offsets for the current banking mode. If the
    /// ROM is smaller than 32 banks, the upper bits never come into play.
    fn update_rom_offsets(&mut self) {
        if self.config.rom_banks < 32 {
            self.low_rom_bank_offset = 0;
            self.bank_low_bits &= bank_mask(self.config.rom_banks);
            self.high_rom_bank_offset = ROM_BANK_SIZE * self.bank_low_bits as usize;
            return;
        }

        let low_bank_nr = match self.banking_mode {
            BankingMode::Simple => 0,
            BankingMode::Advanced => self.bank_high_bits << 5,
        } as usize;
        self.low_rom_bank_offset = ROM_BANK_SIZE * low_bank_nr;

        let high_bank_nr = (self.bank_high_bits << 5) as usize | self.bank_low_bits as usize;
        self.high_rom_bank_offset = ROM_BANK_SIZE * high_bank_nr;
    }

    /// Recomputes the RAM bank offset. Only cartridges with 4 RAM banks
    /// support RAM banking, and only while in advanced mode.
    fn update_ram_offset(&mut self) {
        if self.config.ram_banks == 4 && self.banking_mode == BankingMode::Advanced {
            self.ram_bank_offset = RAM_BANK_SIZE * self.bank_high_bits as usize;
        } else {
            self.ram_bank_offset = 0;
        }
    }
}

impl BankController for MBC1 {
    fn read(&self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_LOW_BANK_END => {
                self.rom[self.low_rom_bank_offset + (address - ROM_LOW_BANK_BEGIN) as usize]
            }
            ROM_HIGH_BANK_BEGIN..=ROM_HIGH_BANK_END => {
                self.rom[self.high_rom_bank_offset + (address - ROM_HIGH_BANK_BEGIN) as usize]
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END => {
                if self.has_ram_access && !self.ram.is_empty() {
                    self.ram[self.ram_bank_offset + (address - CRAM_BANK_BEGIN) as usize]
                } else {
                    UNDEFINED_READ
                }
            }
            _ => UNDEFINED_READ,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            RAM_ENABLE_BEGIN..=RAM_ENABLE_END => {
                self.has_ram_access = value & 0b1111 == 0b1010;
            }
            ROM_BANK_NUMBER_BEGIN..=ROM_BANK_NUMBER_END => {
                self.bank_low_bits = match value & 0b0001_1111 {
                    0 => 1,
                    n => n,
                };
                self.update_rom_offsets();
            }
            RAM_BANK_NUMBER_BEGIN..=RAM_BANK_NUMBER_END => {
                self.bank_high_bits = value & 0b11;
                self.update_rom_offsets();
                self.update_ram_offset();
            }
            BANKING_MODE_SELECT_BEGIN..=BANKING_MODE_SELECT_END => {
                self.banking_mode = match value & 0b1 {
                    0b0 => BankingMode::Simple,
                    _ => BankingMode::Advanced,
                };
                self.update_rom_offsets();
                self.update_ram_offset();
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END => {
                if self.has_ram_access && !self.ram.is_empty() {
                    self.ram[self.ram_bank_offset + (address - CRAM_BANK_BEGIN) as usize] = value;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::ControllerType;

    fn ctrl_with_banks(banks: u16, rom_size: u8, ram_size: u8) -> MBC1 {
        let config = CartridgeConfig::new(ControllerType::MBC1, rom_size, ram_size).unwrap();
        MBC1::new(
            config,
            (0u8..banks as u32 as u8).flat_map(|i| vec![i; ROM_BANK_SIZE]).collect(),
        )
    }

    #[test]
    fn test_ram_state() {
        let config = CartridgeConfig::new(ControllerType::MBC1, 0x03, 0x02).unwrap();
        let mut controller = MBC1::new(config, Arc::from(vec![0u8; ROM_BANK_SIZE * 16]));

        let addr = CRAM_BANK_BEGIN + 0x10;
        controller.write(addr, 0x42);
        assert_eq!(controller.read(addr), 0xFF, "RAM should be disabled");

        controller.write(RAM_ENABLE_BEGIN, 0x0A);
        assert_eq!(
            controller.read(addr),
            0x00,
            "First write should have been ignored"
        );

        controller.write(addr, 0x42);
        assert_eq!(controller.read(addr), 0x42, "RAM should be enabled");

        controller.write(RAM_ENABLE_BEGIN, 0xFF);
        assert_eq!(controller.read(addr), 0xFF, "RAM should be disabled");
    }

    #[test]
    fn test_rom_bank_lower_bits() {
        let config = CartridgeConfig::new(ControllerType::MBC1, 0x03, 0x02).unwrap();
        let mut ctrl = MBC1::new(config, Arc::from(vec![0u8; ROM_BANK_SIZE * 16]));

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x01);
        assert_eq!(ctrl.bank_low_bits, 0x01);
        assert_eq!(ctrl.high_rom_bank_offset, ROM_BANK_SIZE);

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x00);
        assert_eq!(ctrl.bank_low_bits, 0x01, "0x00 should be treated as 0x01");

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0xFF);
        assert_eq!(
            ctrl.high_rom_bank_offset,
            ROM_BANK_SIZE * 0x1F,
            "only the first 5 bits should be used"
        );
    }

    #[test]
    fn test_rom_bank_upper_bits() {
        let config = CartridgeConfig::new(ControllerType::MBC1, 0x03, 0x03).unwrap();
        let mut ctrl = MBC1::new(config, Arc::from(vec![0u8; ROM_BANK_SIZE * 16]));

        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b11);
        assert_eq!(
            ctrl.ram_bank_offset, 0,
            "RAM bank should be 0 in simple mode"
        );

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 0b1);
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b11);
        assert_eq!(ctrl.ram_bank_offset, RAM_BANK_SIZE * 3);
        assert_eq!(
            ctrl.high_rom_bank_offset, ROM_BANK_SIZE,
            "high ROM bank should not change, the cart only holds 16 banks"
        );
    }

    #[test]
    fn test_change_banking_mode() {
        let config = CartridgeConfig::new(ControllerType::MBC1, 0x03, 0x02).unwrap();
        let mut ctrl = MBC1::new(config, Arc::from(vec![0u8; ROM_BANK_SIZE * 16]));

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 0b1);
        assert_eq!(ctrl.banking_mode, BankingMode::Advanced);

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 0b1000);
        assert_eq!(ctrl.banking_mode, BankingMode::Simple);
    }

    #[test]
    fn test_rom_banking_simple() {
        let mut ctrl = ctrl_with_banks(64, 0x05, 0x02);

        assert_eq!(ctrl.read(ROM_LOW_BANK_BEGIN), 0);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 1);

        for i in 2..32 {
            ctrl.write(ROM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), i);
        }

        // Selecting bank 32 wraps to 0, which is overridden to bank 1.
        ctrl.write(ROM_BANK_NUMBER_BEGIN, 32);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 1);

        for i in 34..64 {
            ctrl.write(ROM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), i - 32);
        }
    }

    #[test]
    fn test_rom_banking_masked() {
        let mut ctrl = ctrl_with_banks(16, 0x02, 0x02);
        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0b1111_1001);
        assert_eq!(ctrl.bank_low_bits, 0b0000_1001);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 9);
    }

    #[test]
    fn test_rom_banking_advanced() {
        let mut ctrl = ctrl_with_banks(64, 0x05, 0x02);
        ctrl.write(BANKING_MODE_SELECT_BEGIN, 0b1);

        assert_eq!(ctrl.read(ROM_LOW_BANK_BEGIN), 0);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 1);

        ctrl.write(RAM_BANK_NUMBER_BEGIN, 1);

        // Any attempt to address ROM bank 32 selects bank 33 instead.
        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 33);
    }

    #[test]
    fn test_ram_banking() {
        let config = CartridgeConfig::new(ControllerType::MBC1, 0x00, 0x03).unwrap();
        let mut ctrl = MBC1::new(config, Arc::from(vec![0u8; ROM_BANK_SIZE * 2]));

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 1);
        ctrl.write(RAM_ENABLE_BEGIN, 0x0A);

        for i in 0u8..4 {
            ctrl.write(RAM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.ram_bank_offset, RAM_BANK_SIZE * i as usize);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 0);
            ctrl.write(CRAM_BANK_BEGIN, i + 1);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), i + 1);
        }

        for i in 0u8..4 {
            ctrl.write(RAM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), i + 1);
        }
    }
}
