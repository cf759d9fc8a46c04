use bitflags::bitflags;

bitflags! {
    /// Represents the interrupt registers IE at 0xFFFF and IF at 0xFF0F.
    #[derive(Copy, Clone, PartialEq, Default)]
    pub struct InterruptRegister: u8 {
        const VBLANK = 0b0000_0001;
        const STAT   = 0b0000_0010;
        const TIMER  = 0b0000_0100;
        const SERIAL = 0b0000_1000;
        const JOYPAD = 0b0001_0000;
    }
}

/// Interrupt sources in dispatch priority order, highest first.
pub const PRIORITY: [InterruptRegister; 5] = [
    InterruptRegister::VBLANK,
    InterruptRegister::STAT,
    InterruptRegister::TIMER,
    InterruptRegister::SERIAL,
    InterruptRegister::JOYPAD,
];

/// Returns the interrupt vector address for a single-bit interrupt source.
pub fn vector_for(irq: InterruptRegister) -> u16 {
    match irq {
        InterruptRegister::VBLANK => 0x40,
        InterruptRegister::STAT => 0x48,
        InterruptRegister::TIMER => 0x50,
        InterruptRegister::SERIAL => 0x58,
        InterruptRegister::JOYPAD => 0x60,
        _ => unreachable!("not a single interrupt source"),
    }
}

/// Returns the highest priority interrupt that is both enabled and flagged.
pub fn highest_priority(enable: InterruptRegister, flag: InterruptRegister) -> Option<InterruptRegister> {
    PRIORITY.into_iter().find(|&irq| enable.contains(irq) && flag.contains(irq))
}
