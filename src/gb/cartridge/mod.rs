mod controller;
mod mbc1;
mod nombc;

use crate::gb::cartridge::controller::BankController;
use crate::gb::error::{EmulatorError, GBResult};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// This area of memory contains the Nintendo logo bitmap. The boot ROM
/// refuses to run a cartridge whose copy of it doesn't match.
const NINTENDO_LOGO_BEGIN: u16 = 0x0104;
const NINTENDO_LOGO_END: u16 = 0x0133;

#[rustfmt::skip]
const NINTENDO_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

/// This area of memory contains the cartridge title.
const CARTRIDGE_TITLE_BEGIN: u16 = 0x0134;
const CARTRIDGE_TITLE_END: u16 = 0x0142;

/// This address contains the cartridge type and what kind of hardware is present.
/// See https://gbdev.io/pandocs/The_Cartridge_Header.html#0147--cartridge-type
const CARTRIDGE_TYPE: u16 = 0x0147;

/// This byte indicates how much ROM is present on the cartridge.
const CARTRIDGE_ROM_SIZE: u16 = 0x0148;

/// This byte indicates how much RAM is present on the cartridge.
const CARTRIDGE_RAM_SIZE: u16 = 0x0149;

/// This byte contains an 8-bit checksum computed from header bytes 0x0134-0x014C.
/// The boot ROM hard-locks if this doesn't match, so we treat it the same way.
const CARTRIDGE_HEADER_CHECKSUM: u16 = 0x014D;

/// These bytes contain a 16-bit big-endian checksum over the whole ROM
/// (excluding these two bytes). Real hardware never verifies it; we only warn.
const CARTRIDGE_GLOBAL_CHECKSUM1: u16 = 0x014E;
const CARTRIDGE_GLOBAL_CHECKSUM2: u16 = 0x014F;

const ROM_BANK_SIZE: usize = 16384;
const RAM_BANK_SIZE: usize = 8192;

/// The controller type of the cartridge. Only the controllers a DMG ROM-only
/// board or an MBC1 board can expose are modeled here.
/// See https://gbdev.io/pandocs/The_Cartridge_Header.html#0147--cartridge-type
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum ControllerType {
    NoMBC,
    MBC1,
}

impl TryFrom<u8> for ControllerType {
    type Error = EmulatorError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let mode = match value {
            0x00 | 0x08 | 0x09 => ControllerType::NoMBC,
            0x01..=0x03 => ControllerType::MBC1,
            _ => {
                return Err(format!("cartridge type {value:#04x} is not supported").into());
            }
        };
        Ok(mode)
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerType::NoMBC => "NoMBC",
            ControllerType::MBC1 => "MBC1",
        };
        write!(f, "{name}")
    }
}

/// Contains the configuration of the cartridge: controller type, ROM size
/// and RAM size expressed in banks.
#[derive(Copy, Clone, Debug)]
pub struct CartridgeConfig {
    pub controller: ControllerType,
    pub rom_banks: u16,
    pub ram_banks: u16,
}

impl CartridgeConfig {
    pub fn new(controller: ControllerType, rom_size: u8, ram_size: u8) -> GBResult<Self> {
        let ram_banks = match ram_size {
            0x00 | 0x01 => 0,
            0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            0x05 => 8,
            value => return Err(format!("unsupported RAM size {value:#04x}").into()),
        };

        // Expressible as 2^(value + 1) up until 512 KiB.
        let rom_banks = match rom_size {
            0x00 => 2,
            0x01 => 4,
            0x02 => 8,
            0x03 => 16,
            0x04 => 32,
            0x05 => 64,
            0x06 => 128,
            0x07 => 256,
            0x08 => 512,
            value => return Err(format!("unsupported ROM size {value:#04x}").into()),
        };

        Ok(Self {
            controller,
            rom_banks,
            ram_banks,
        })
    }

    #[inline(always)]
    pub const fn ram_size(&self) -> usize {
        self.ram_banks as usize * RAM_BANK_SIZE
    }
}

/// Contains the cartridge header information.
/// See https://gbdev.io/pandocs/The_Cartridge_Header.html
#[derive(Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub config: CartridgeConfig,
}

impl TryFrom<&[u8]> for CartridgeHeader {
    type Error = EmulatorError;
    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() <= CARTRIDGE_HEADER_CHECKSUM as usize {
            return Err("ROM is too small to contain a header".into());
        }

        verify_logo(buf)?;
        verify_header_checksum(buf)?;

        let controller = ControllerType::try_from(buf[CARTRIDGE_TYPE as usize])?;
        let config = CartridgeConfig::new(
            controller,
            buf[CARTRIDGE_ROM_SIZE as usize],
            buf[CARTRIDGE_RAM_SIZE as usize],
        )?;
        let title = CartridgeHeader::parse_title(buf);
        Ok(Self { title, config })
    }
}

impl CartridgeHeader {
    /// Returns the cartridge title from the cartridge header.
    fn parse_title(buf: &[u8]) -> String {
        let title = buf[CARTRIDGE_TITLE_BEGIN as usize..=CARTRIDGE_TITLE_END as usize]
            .iter()
            .filter_map(|b| b.is_ascii_alphanumeric().then_some(char::from(*b)))
            .collect::<String>();
        match title.is_empty() {
            true => "Unnamed".to_string(),
            false => title,
        }
    }
}

impl fmt::Display for CartridgeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.config.controller)
    }
}

/// Holds all relevant cartridge information and owns the bank controller
/// that mediates every access to ROM and cartridge RAM.
pub struct Cartridge {
    pub header: CartridgeHeader,
    controller: Box<dyn BankController>,
}

impl TryFrom<Arc<[u8]>> for Cartridge {
    type Error = EmulatorError;

    fn try_from(rom: Arc<[u8]>) -> Result<Self, Self::Error> {
        if let Err(msg) = verify_global_checksum(rom.as_ref()) {
            log::warn!("{msg}");
        }
        let header = CartridgeHeader::try_from(rom.as_ref())?;
        let controller = controller::new(header.config, rom);
        Ok(Self { controller, header })
    }
}

impl TryFrom<&Path> for Cartridge {
    type Error = EmulatorError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let rom = std::fs::read(path)?;
        Cartridge::try_from(Arc::<[u8]>::from(rom.into_boxed_slice()))
    }
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

impl crate::gb::AddressSpace for Cartridge {
    #[inline]
    fn write(&mut self, address: u16, value: u8) {
        self.controller.write(address, value);
    }

    #[inline]
    fn read(&self, address: u16) -> u8 {
        self.controller.read(address)
    }
}

/// Rejects a ROM whose Nintendo logo bitmap doesn't match. Real hardware
/// hard-locks the boot ROM's comparison loop on mismatch.
fn verify_logo(buf: &[u8]) -> GBResult<()> {
    let logo = &buf[NINTENDO_LOGO_BEGIN as usize..=NINTENDO_LOGO_END as usize];
    if logo != NINTENDO_LOGO {
        return Err("Nintendo logo bitmap mismatch".into());
    }
    Ok(())
}

/// Validates the header checksum at 0x014D. A real DMG refuses to boot a
/// cartridge that fails this check, so we treat it as fatal too.
fn verify_header_checksum(buf: &[u8]) -> GBResult<()> {
    let expected = buf[CARTRIDGE_HEADER_CHECKSUM as usize];
    let calculated = calculate_header_checksum(buf);
    if expected != calculated {
        return Err(format!(
            "header checksum mismatch: expected {expected:#04x}, got {calculated:#04x}"
        )
        .into());
    }
    Ok(())
}

fn calculate_header_checksum(buf: &[u8]) -> u8 {
    let mut checksum: u8 = 0;
    for &byte in &buf[CARTRIDGE_TITLE_BEGIN as usize..CARTRIDGE_HEADER_CHECKSUM as usize] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    checksum
}

/// Validates the global checksum of the given buffer containing the whole
/// cartridge. Unlike the header checksum, no real hardware enforces this.
fn verify_global_checksum(buf: &[u8]) -> GBResult<()> {
    if buf.len() <= CARTRIDGE_GLOBAL_CHECKSUM2 as usize {
        return Err("cartridge is too small to calculate the global checksum".into());
    }

    let byte1 = buf[CARTRIDGE_GLOBAL_CHECKSUM1 as usize];
    let byte2 = buf[CARTRIDGE_GLOBAL_CHECKSUM2 as usize];
    let checksum = u16::from(byte1) << 8 | u16::from(byte2);
    let calculated = calculate_global_checksum(buf);

    if checksum == calculated {
        return Ok(());
    }

    Err(format!("global checksum mismatch: expected {calculated:#06x}, got {checksum:#06x}").into())
}

/// Calculates the global checksum by adding all bytes from the given
/// cartridge buffer except the two checksum bytes.
fn calculate_global_checksum(buf: &[u8]) -> u16 {
    buf.iter()
        .enumerate()
        .fold(0u16, |sum, (address, &byte)| {
            if address == CARTRIDGE_GLOBAL_CHECKSUM1 as usize || address == CARTRIDGE_GLOBAL_CHECKSUM2 as usize {
                sum
            } else {
                sum.wrapping_add(byte as u16)
            }
        })
}

/// Masks a requested ROM bank number down to the number of banks actually
/// present on the cartridge.
#[inline]
const fn bank_mask(rom_banks: u16) -> u8 {
    let mask = u16::BITS - rom_banks.leading_zeros();
    ((1u32 << mask) - 1) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(controller_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 0x150];
        buf[NINTENDO_LOGO_BEGIN as usize..=NINTENDO_LOGO_END as usize].copy_from_slice(&NINTENDO_LOGO);
        buf[CARTRIDGE_TITLE_BEGIN as usize..=CARTRIDGE_TITLE_END as usize][..4]
            .copy_from_slice(b"TEST");
        buf[CARTRIDGE_TYPE as usize] = controller_type;
        buf[CARTRIDGE_ROM_SIZE as usize] = rom_size;
        buf[CARTRIDGE_RAM_SIZE as usize] = ram_size;
        buf[CARTRIDGE_HEADER_CHECKSUM as usize] = calculate_header_checksum(&buf);
        buf
    }

    #[test]
    fn test_parse_valid_header() {
        let buf = sample_header(0x00, 0x00, 0x00);
        let header = CartridgeHeader::try_from(buf.as_slice()).unwrap();
        assert_eq!(header.title, "TEST");
        assert_eq!(header.config.controller, ControllerType::NoMBC);
        assert_eq!(header.config.rom_banks, 2);
    }

    #[test]
    fn test_bad_logo_is_rejected() {
        let mut buf = sample_header(0x00, 0x00, 0x00);
        buf[NINTENDO_LOGO_BEGIN as usize] = 0x00;
        assert!(CartridgeHeader::try_from(buf.as_slice()).is_err());
    }

    #[test]
    fn test_bad_header_checksum_is_rejected() {
        let mut buf = sample_header(0x00, 0x00, 0x00);
        buf[CARTRIDGE_HEADER_CHECKSUM as usize] ^= 0xFF;
        assert!(CartridgeHeader::try_from(buf.as_slice()).is_err());
    }

    #[test]
    fn test_mbc1_controller_type() {
        let buf = sample_header(0x01, 0x00, 0x00);
        let header = CartridgeHeader::try_from(buf.as_slice()).unwrap();
        assert_eq!(header.config.controller, ControllerType::MBC1);
    }

    #[test]
    fn test_bank_mask() {
        assert_eq!(bank_mask(2), 0b1);
        assert_eq!(bank_mask(16), 0b1111);
        assert_eq!(bank_mask(64), 0b11_1111);
    }

    #[test]
    fn test_global_checksum_ignores_only_the_real_checksum_bytes() {
        // A buffer larger than 64KiB has bytes at offsets that alias
        // 0x014E/0x014F modulo 0x10000; only the real header offsets may be
        // excluded from the sum, not every alias of them.
        let mut buf = vec![0x01u8; 0x20000];
        buf[0x1014E] = 0x02;
        buf[0x1014F] = 0x03;
        // sum = (len - 2) * 0x01 from the real excluded bytes, plus the
        // excess of 1 and 2 contributed by the two aliasing bytes above.
        let expected = ((buf.len() - 2) as u16).wrapping_add(1).wrapping_add(2);
        assert_eq!(calculate_global_checksum(&buf), expected);
    }
}
