use crate::gb::cartridge::Cartridge;
use crate::gb::constants::*;
use crate::gb::interrupt::InterruptRegister;
use crate::gb::joypad::{Joypad, JoypadInput};
use crate::gb::oam::OamDmaController;
use crate::gb::ppu::Ppu;
use crate::gb::timer::{Frequency, Timer};
use crate::gb::AddressSpace;

/// Wires together the cartridge, work/high RAM, the PPU, timer, joypad and
/// interrupt registers behind the single flat address space the CPU sees.
pub struct Mmu {
    pub cartridge: Cartridge,
    pub ppu: Ppu,
    pub joypad: Joypad,
    timer: Timer,
    divider: Timer,
    dma: OamDmaController,
    pub interrupt_enable: InterruptRegister,
    pub interrupt_flag: InterruptRegister,
    wram: [u8; WRAM_SIZE],
    hram: [u8; HRAM_SIZE],
    /// Inert backing store for the audio registers; sound is not emulated
    /// but games routinely read back what they wrote.
    audio: [u8; AUDIO_REGISTERS_SIZE],
    serial_data: u8,
    serial_ctrl: u8,
    boot_rom: Option<[u8; BOOT_SIZE]>,
    boot_rom_disabled: bool,
}

impl Mmu {
    pub fn new(cartridge: Cartridge, boot_rom: Option<[u8; BOOT_SIZE]>) -> Self {
        let mut divider = Timer::new(Frequency::Hz16384);
        divider.on = true;
        Self {
            cartridge,
            ppu: Ppu::new(),
            joypad: Joypad::default(),
            timer: Timer::new(Frequency::Hz4096),
            divider,
            dma: OamDmaController::default(),
            interrupt_enable: InterruptRegister::empty(),
            interrupt_flag: InterruptRegister::empty(),
            wram: [0; WRAM_SIZE],
            hram: [0; HRAM_SIZE],
            audio: [0; AUDIO_REGISTERS_SIZE],
            serial_data: 0,
            serial_ctrl: 0,
            boot_rom_disabled: boot_rom.is_none(),
            boot_rom,
        }
    }

    fn read_rom_low_bank(&self, address: u16) -> u8 {
        match self.boot_rom {
            Some(rom) if !self.boot_rom_disabled && address <= BOOT_END => rom[address as usize],
            _ => self.cartridge.read(address),
        }
    }

    pub fn handle_joypad_input(&mut self, input: JoypadInput) {
        self.joypad.handle_input(input);
    }

    /// Advances everything the MMU owns by `cycles` T-cycles: the divider
    /// and TIMA timers, pending OAM DMA, and the PPU. Returns whether the
    /// PPU entered V-Blank this step, for the frame-pacing loop.
    pub fn advance(&mut self, cycles: u16) -> bool {
        if self.timer.step(cycles) {
            self.interrupt_flag.insert(InterruptRegister::TIMER);
        }
        self.divider.step(cycles);
        self.step_dma(cycles);
        self.ppu.advance(u32::from(cycles), &mut self.interrupt_flag).entered_vblank
    }

    fn step_dma(&mut self, cycles: u16) {
        // A DMA request takes effect one M-cycle after the write; the
        // controller models this with a one-slot pending/start handoff.
        if let Some(requested) = self.dma.pending.take() {
            self.dma.start(requested);
        }
        if let Some(requested) = self.dma.requested.take() {
            self.dma.pending = Some(requested);
        }
        for _ in 0..cycles / 4 {
            if let Some(address) = self.dma.transfer() {
                let byte = self.read(address);
                self.ppu.dma_write_oam(address as u8, byte);
            }
        }
    }

    fn write_eram(&mut self, address: u16, value: u8) {
        self.wram[(address - ERAM_BEGIN) as usize] = value;
    }

    fn read_eram(&self, address: u16) -> u8 {
        self.wram[(address - ERAM_BEGIN) as usize]
    }

    fn write_io(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD => self.joypad.write(value, &mut self.interrupt_flag),
            SERIAL_TRANSFER_DATA => self.serial_data = value,
            SERIAL_TRANSFER_CTRL => self.serial_ctrl = value,
            TIMER_DIVIDER => self.divider.value = 0,
            TIMER_COUNTER => self.timer.value = value,
            TIMER_MODULO => self.timer.modulo = value,
            TIMER_CTRL => {
                self.timer.frequency = match value & 0b11 {
                    0b00 => Frequency::Hz4096,
                    0b01 => Frequency::Hz262144,
                    0b10 => Frequency::Hz65536,
                    0b11 => Frequency::Hz16384,
                    _ => unreachable!(),
                };
                self.timer.on = value & 0b100 != 0;
            }
            INTERRUPT_FLAG => self.interrupt_flag = InterruptRegister::from_bits_truncate(value),
            PPU_REGISTER_START..=PPU_REGISTER_END => self.ppu.write_register(address, value),
            0xFF46 => self.dma.request(value),
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => {
                self.audio[(address - AUDIO_REGISTERS_START) as usize] = value
            }
            // Write-once latch: once set, the boot ROM can never be re-mapped in.
            BOOT_ROM_OFF => self.boot_rom_disabled |= value & 0b1 != 0,
            _ => {}
        }
    }

    fn read_io(&self, address: u16) -> u8 {
        match address {
            JOYPAD => self.joypad.read(),
            SERIAL_TRANSFER_DATA => self.serial_data,
            SERIAL_TRANSFER_CTRL => self.serial_ctrl,
            TIMER_DIVIDER => (self.divider.value),
            TIMER_COUNTER => self.timer.value,
            TIMER_MODULO => self.timer.modulo,
            TIMER_CTRL => {
                let freq_bits = match self.timer.frequency {
                    Frequency::Hz4096 => 0b00,
                    Frequency::Hz262144 => 0b01,
                    Frequency::Hz65536 => 0b10,
                    Frequency::Hz16384 => 0b11,
                };
                0b1111_1000 | (u8::from(self.timer.on) << 2) | freq_bits
            }
            INTERRUPT_FLAG => self.interrupt_flag.bits() | 0xE0,
            PPU_REGISTER_START..=PPU_REGISTER_END => self.ppu.read_register(address),
            0xFF46 => self.dma.source,
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => {
                self.audio[(address - AUDIO_REGISTERS_START) as usize]
            }
            BOOT_ROM_OFF => 0xFE | u8::from(self.boot_rom_disabled),
            CGB_PREPARE_SPEED_SWITCH | CGB_WRAM_BANK | PCM_AMPLITUDES12 | PCM_AMPLITUDES34 => {
                UNDEFINED_READ
            }
            _ => UNDEFINED_READ,
        }
    }
}

impl AddressSpace for Mmu {
    fn write(&mut self, address: u16, value: u8) {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_HIGH_BANK_END => self.cartridge.write(address, value),
            VRAM_BEGIN..=VRAM_END => self.ppu.write_vram(address, value),
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self.cartridge.write(address, value),
            WRAM_BEGIN..=WRAM_END => self.wram[(address - WRAM_BEGIN) as usize] = value,
            ERAM_BEGIN..=ERAM_END => self.write_eram(address, value),
            OAM_BEGIN..=OAM_END => self.ppu.write_oam(address, value),
            UNUSED_BEGIN..=UNUSED_END => {}
            IO_BEGIN..=IO_END => self.write_io(address, value),
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize] = value,
            INTERRUPT_ENABLE => self.interrupt_enable = InterruptRegister::from_bits_truncate(value),
        }
    }

    fn read(&self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_LOW_BANK_END => self.read_rom_low_bank(address),
            ROM_HIGH_BANK_BEGIN..=ROM_HIGH_BANK_END => self.cartridge.read(address),
            VRAM_BEGIN..=VRAM_END => self.ppu.read_vram(address),
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self.cartridge.read(address),
            WRAM_BEGIN..=WRAM_END => self.wram[(address - WRAM_BEGIN) as usize],
            ERAM_BEGIN..=ERAM_END => self.read_eram(address),
            OAM_BEGIN..=OAM_END => self.ppu.read_oam(address),
            UNUSED_BEGIN..=UNUSED_END => UNDEFINED_READ,
            IO_BEGIN..=IO_END => self.read_io(address),
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize],
            INTERRUPT_ENABLE => self.interrupt_enable.bits() | 0xE0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::Cartridge;
    use std::sync::Arc;

    fn sample_rom() -> Arc<[u8]> {
        let mut buf = vec![0u8; 0x8000];
        #[rustfmt::skip]
        let logo: [u8; 48] = [
            0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
            0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
            0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
        ];
        buf[0x0104..=0x0133].copy_from_slice(&logo);
        let mut checksum: u8 = 0;
        for &byte in &buf[0x0134..0x014D] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        buf[0x014D] = checksum;
        Arc::<[u8]>::from(buf.into_boxed_slice())
    }

    fn mmu() -> Mmu {
        let cartridge = Cartridge::try_from(sample_rom()).unwrap();
        Mmu::new(cartridge, None)
    }

    #[test]
    fn test_boot_rom_overlays_low_rom_until_disabled() {
        let mut boot = [0u8; BOOT_SIZE];
        boot[0] = 0xAB;
        let cartridge = Cartridge::try_from(sample_rom()).unwrap();
        let mut mmu = Mmu::new(cartridge, Some(boot));
        assert_eq!(mmu.read(0x0000), 0xAB);
        mmu.write(BOOT_ROM_OFF, 0x01);
        assert_ne!(mmu.read(0x0000), 0xAB);
    }

    #[test]
    fn test_boot_rom_lock_is_write_once() {
        let mut boot = [0u8; BOOT_SIZE];
        boot[0] = 0xAB;
        let cartridge = Cartridge::try_from(sample_rom()).unwrap();
        let mut mmu = Mmu::new(cartridge, Some(boot));
        mmu.write(BOOT_ROM_OFF, 0x01);
        mmu.write(BOOT_ROM_OFF, 0x00);
        assert_ne!(mmu.read(0x0000), 0xAB, "the latch must not clear once set");
    }

    #[test]
    fn test_wram_round_trip() {
        let mut mmu = mmu();
        mmu.write(0xC010, 0x42);
        assert_eq!(mmu.read(0xC010), 0x42);
    }

    #[test]
    fn test_echo_ram_mirrors_wram() {
        let mut mmu = mmu();
        mmu.write(0xC010, 0x99);
        assert_eq!(mmu.read(0xE010), 0x99);
    }

    #[test]
    fn test_div_resets_on_any_write() {
        let mut mmu = mmu();
        mmu.divider.value = 0x80;
        mmu.write(TIMER_DIVIDER, 0xFF);
        assert_eq!(mmu.read(TIMER_DIVIDER), 0);
    }

    #[test]
    fn test_oam_dma_copies_160_bytes_after_delay() {
        let mut mmu = mmu();
        for i in 0..0xA0u16 {
            mmu.write(0xC000 + i, i as u8);
        }
        mmu.write(0xFF46, 0xC0);
        // One M-cycle for the write to latch, one for the transfer to start.
        mmu.advance(8);
        for _ in 0..0xA0 {
            mmu.advance(4);
        }
        for i in 0..0xA0u16 {
            assert_eq!(mmu.ppu.read_oam(0xFE00 + i), i as u8);
        }
    }
}
