use crate::gb::cartridge::Cartridge;
use crate::gb::constants::BOOT_SIZE;
use crate::gb::cpu::CPU;
use crate::gb::error::GBResult;
use crate::gb::interrupt::{self, InterruptRegister};
use crate::gb::joypad::JoypadInput;
use crate::gb::mmu::Mmu;
use crate::gb::ppu::palette::ColoredPixel;
use crate::gb::{AddressSpace, SCREEN_HEIGHT, SCREEN_WIDTH};
use std::path::Path;

/// Cost, in T-cycles, of servicing an interrupt: two idle machine cycles,
/// one to push each byte of PC, and one to load the vector.
const INTERRUPT_DISPATCH_CYCLES: u16 = 20;

/// Result of advancing the emulator through exactly one video frame.
pub struct FrameResult {
    pub cycles: u64,
}

/// Owns the whole DMG system and drives the fetch/decode/execute and
/// interrupt-dispatch loop that ties the CPU, MMU and PPU together.
pub struct GameBoy {
    pub cpu: CPU,
    pub mmu: Mmu,
    cycles: u64,
}

impl GameBoy {
    /// Powers on the system with the given cartridge loaded. If `boot_rom`
    /// is supplied, the CPU starts at the all-zero reset state and executes
    /// the boot ROM's startup sequence before reaching cartridge code;
    /// otherwise it starts directly at the post-boot state the real boot
    /// ROM would have left behind.
    pub fn power_on(cartridge: Cartridge, boot_rom: Option<[u8; BOOT_SIZE]>) -> Self {
        let cpu = match boot_rom {
            Some(_) => CPU::new_at_reset(),
            None => CPU::new(),
        };
        Self {
            cpu,
            mmu: Mmu::new(cartridge, boot_rom),
            cycles: 0,
        }
    }

    pub fn from_path(path: &Path, boot_rom: Option<[u8; BOOT_SIZE]>) -> GBResult<Self> {
        let cartridge = Cartridge::try_from(path)?;
        Ok(Self::power_on(cartridge, boot_rom))
    }

    pub fn handle_joypad_input(&mut self, input: JoypadInput) {
        self.mmu.handle_joypad_input(input);
    }

    pub fn framebuffer(&self) -> &[ColoredPixel; SCREEN_WIDTH * SCREEN_HEIGHT] {
        &self.mmu.ppu.framebuffer
    }

    /// Runs the system until a V-Blank boundary is crossed, then returns.
    pub fn step_frame(&mut self) -> GBResult<FrameResult> {
        let start = self.cycles;
        loop {
            let entered_vblank = self.step_instruction()?;
            if entered_vblank {
                break;
            }
        }
        Ok(FrameResult {
            cycles: self.cycles - start,
        })
    }

    /// Advances the system by one CPU instruction slot: applies any
    /// scheduled EI, dispatches a pending interrupt if IME allows it,
    /// otherwise executes (or idles through) one instruction. Returns
    /// whether the PPU crossed into V-Blank during this slot.
    pub fn step_instruction(&mut self) -> GBResult<bool> {
        self.cpu.apply_scheduled_ei();

        let pending = self.mmu.interrupt_enable & self.mmu.interrupt_flag;
        if !pending.is_empty() {
            self.cpu.wake();
        }

        let cycles = if self.cpu.ime && !pending.is_empty() {
            self.dispatch_interrupt(pending);
            INTERRUPT_DISPATCH_CYCLES
        } else if self.cpu.is_halted {
            4
        } else {
            let halt_bug_condition = !self.cpu.ime && !pending.is_empty();
            self.cpu.step(&mut self.mmu, halt_bug_condition)?
        };

        self.cycles += cycles as u64;
        Ok(self.mmu.advance(cycles))
    }

    fn dispatch_interrupt(&mut self, pending: InterruptRegister) {
        let irq = interrupt::highest_priority(self.mmu.interrupt_enable, pending)
            .expect("pending is non-empty");
        self.mmu.interrupt_flag.remove(irq);
        self.cpu.ime = false;
        let pc = self.cpu.pc;
        self.cpu.push(pc, &mut self.mmu);
        self.cpu.pc = interrupt::vector_for(irq);
    }

    pub fn shutdown(self) -> Cartridge {
        self.mmu.cartridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_rom(program: &[u8]) -> Arc<[u8]> {
        let mut buf = vec![0u8; 0x8000];
        #[rustfmt::skip]
        let logo: [u8; 48] = [
            0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
            0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
            0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
        ];
        buf[0x0104..=0x0133].copy_from_slice(&logo);
        buf[0x0100..0x0100 + program.len()].copy_from_slice(program);
        let mut checksum: u8 = 0;
        for &byte in &buf[0x0134..0x014D] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        buf[0x014D] = checksum;
        Arc::<[u8]>::from(buf.into_boxed_slice())
    }

    fn gameboy_with(program: &[u8]) -> GameBoy {
        let cartridge = Cartridge::try_from(sample_rom(program)).unwrap();
        GameBoy::power_on(cartridge, None)
    }

    #[test]
    fn test_interrupt_dispatches_when_enabled_and_pending() {
        let mut gb = gameboy_with(&[0x00]); // NOP
        gb.cpu.ime = true;
        gb.mmu.interrupt_enable.insert(InterruptRegister::VBLANK);
        gb.mmu.interrupt_flag.insert(InterruptRegister::VBLANK);
        gb.step_instruction().unwrap();
        assert_eq!(gb.cpu.pc, 0x40);
        assert!(!gb.cpu.ime);
        assert!(!gb.mmu.interrupt_flag.contains(InterruptRegister::VBLANK));
    }

    #[test]
    fn test_halted_cpu_wakes_on_pending_interrupt_even_with_ime_clear() {
        let mut gb = gameboy_with(&[0x76]); // HALT
        gb.step_instruction().unwrap();
        assert!(gb.cpu.is_halted);
        gb.mmu.interrupt_enable.insert(InterruptRegister::TIMER);
        gb.mmu.interrupt_flag.insert(InterruptRegister::TIMER);
        gb.step_instruction().unwrap();
        assert!(!gb.cpu.is_halted);
    }
}
