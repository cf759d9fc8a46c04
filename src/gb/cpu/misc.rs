use crate::gb::AddressSpace;
use crate::gb::cpu::CPU;
use std::fmt;
use std::fmt::Formatter;

#[derive(Copy, Clone)]
pub enum Register {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl Register {
    #[inline]
    fn read(&self, cpu: &CPU) -> u8 {
        match *self {
            Register::A => cpu.r.a,
            Register::B => cpu.r.b,
            Register::C => cpu.r.c,
            Register::D => cpu.r.d,
            Register::E => cpu.r.e,
            Register::H => cpu.r.h,
            Register::L => cpu.r.l,
        }
    }

    #[inline]
    fn write(&self, cpu: &mut CPU, value: u8) {
        match *self {
            Register::A => cpu.r.a = value,
            Register::B => cpu.r.b = value,
            Register::C => cpu.r.c = value,
            Register::D => cpu.r.d = value,
            Register::E => cpu.r.e = value,
            Register::H => cpu.r.h = value,
            Register::L => cpu.r.l = value,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Register::A => write!(f, "A"),
            Register::B => write!(f, "B"),
            Register::C => write!(f, "C"),
            Register::D => write!(f, "D"),
            Register::E => write!(f, "E"),
            Register::H => write!(f, "H"),
            Register::L => write!(f, "L"),
        }
    }
}

#[derive(Copy, Clone)]
pub enum PairedRegister {
    AF,
    BC,
    DE,
    HL,
    SP,
}

impl PairedRegister {
    #[inline]
    pub fn read(&self, cpu: &CPU) -> u16 {
        match *self {
            PairedRegister::AF => cpu.r.get_af(),
            PairedRegister::BC => cpu.r.get_bc(),
            PairedRegister::DE => cpu.r.get_de(),
            PairedRegister::HL => cpu.r.get_hl(),
            PairedRegister::SP => cpu.sp,
        }
    }

    #[inline]
    pub fn write(&self, cpu: &mut CPU, value: u16) {
        match *self {
            PairedRegister::AF => cpu.r.set_af(value),
            PairedRegister::BC => cpu.r.set_bc(value),
            PairedRegister::DE => cpu.r.set_de(value),
            PairedRegister::HL => cpu.r.set_hl(value),
            PairedRegister::SP => cpu.sp = value,
        }
    }
}

impl fmt::Display for PairedRegister {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PairedRegister::AF => write!(f, "AF"),
            PairedRegister::BC => write!(f, "BC"),
            PairedRegister::DE => write!(f, "DE"),
            PairedRegister::HL => write!(f, "HL"),
            PairedRegister::SP => write!(f, "SP"),
        }
    }
}

/// A byte-wide operand that is both read and written back in place, used by
/// INC/DEC and the CB-prefixed bit-manipulation instructions.
#[derive(Copy, Clone)]
pub enum ByteTarget {
    R(Register),
    HLI,
}

impl ByteTarget {
    #[inline]
    pub fn read<T: AddressSpace>(&self, cpu: &CPU, bus: &T) -> u8 {
        match *self {
            ByteTarget::R(r) => r.read(cpu),
            ByteTarget::HLI => bus.read(cpu.r.get_hl()),
        }
    }

    #[inline]
    pub fn write<T: AddressSpace>(&self, cpu: &mut CPU, bus: &mut T, value: u8) {
        match *self {
            ByteTarget::R(r) => r.write(cpu, value),
            ByteTarget::HLI => bus.write(cpu.r.get_hl(), value),
        }
    }

    #[inline]
    pub fn is_indirect(&self) -> bool {
        matches!(self, ByteTarget::HLI)
    }
}

impl fmt::Display for ByteTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ByteTarget::R(r) => write!(f, "{r}"),
            ByteTarget::HLI => write!(f, "(HL)"),
        }
    }
}

/// A byte-wide operand read once, used by the accumulator-targeted ALU
/// instructions and LD sources. Immediates are captured at decode time.
#[derive(Copy, Clone)]
pub enum ByteSource {
    R(Register),
    D8(u8),
    HLI,
    BCI,
    DEI,
    D16I(u16),
    D8I(u8),
    CI,
}

impl ByteSource {
    #[inline]
    pub fn read<T: AddressSpace>(&self, cpu: &CPU, bus: &T) -> u8 {
        match *self {
            ByteSource::R(r) => r.read(cpu),
            ByteSource::D8(value) => value,
            ByteSource::HLI => bus.read(cpu.r.get_hl()),
            ByteSource::BCI => bus.read(cpu.r.get_bc()),
            ByteSource::DEI => bus.read(cpu.r.get_de()),
            ByteSource::D16I(address) => bus.read(address),
            ByteSource::D8I(low) => bus.read(0xFF00 | u16::from(low)),
            ByteSource::CI => bus.read(0xFF00 | u16::from(cpu.r.c)),
        }
    }

    #[inline]
    pub fn is_indirect_or_immediate(&self) -> bool {
        !matches!(self, ByteSource::R(_))
    }
}

impl fmt::Display for ByteSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::R(r) => write!(f, "{r}"),
            ByteSource::D8(value) => write!(f, "{value:#04x}"),
            ByteSource::HLI => write!(f, "(HL)"),
            ByteSource::BCI => write!(f, "(BC)"),
            ByteSource::DEI => write!(f, "(DE)"),
            ByteSource::D16I(addr) => write!(f, "({addr:#06x})"),
            ByteSource::D8I(low) => write!(f, "(0xFF00+{low:#04x})"),
            ByteSource::CI => write!(f, "(0xFF00+C)"),
        }
    }
}

#[derive(Copy, Clone)]
pub enum WordTarget {
    R(PairedRegister),
    D16I(u16),
}

impl fmt::Display for WordTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WordTarget::R(r) => write!(f, "{r}"),
            WordTarget::D16I(addr) => write!(f, "({addr:#06x})"),
        }
    }
}

#[derive(Copy, Clone)]
pub enum WordSource {
    R(PairedRegister),
    D16(u16),
}

impl WordSource {
    #[inline]
    pub fn read(&self, cpu: &CPU) -> u16 {
        match *self {
            WordSource::R(r) => r.read(cpu),
            WordSource::D16(value) => value,
        }
    }
}

impl fmt::Display for WordSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WordSource::R(r) => write!(f, "{r}"),
            WordSource::D16(value) => write!(f, "{value:#06x}"),
        }
    }
}

/// An indirect byte address used as the destination of a store.
#[derive(Copy, Clone)]
pub enum IndirectByteRef {
    BCI,
    DEI,
    HLI,
    D16I(u16),
    D8I(u8),
    CI,
}

impl IndirectByteRef {
    #[inline]
    pub fn address(&self, cpu: &CPU) -> u16 {
        match *self {
            IndirectByteRef::BCI => cpu.r.get_bc(),
            IndirectByteRef::DEI => cpu.r.get_de(),
            IndirectByteRef::HLI => cpu.r.get_hl(),
            IndirectByteRef::D16I(addr) => addr,
            IndirectByteRef::D8I(low) => 0xFF00 | u16::from(low),
            IndirectByteRef::CI => 0xFF00 | u16::from(cpu.r.c),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub enum JumpCondition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
    Always,
}

impl JumpCondition {
    #[inline]
    pub fn resolve(&self, cpu: &CPU) -> bool {
        match *self {
            JumpCondition::NotZero => !cpu.r.f.contains(super::registers::FlagsRegister::ZERO),
            JumpCondition::Zero => cpu.r.f.contains(super::registers::FlagsRegister::ZERO),
            JumpCondition::NotCarry => !cpu.r.f.contains(super::registers::FlagsRegister::CARRY),
            JumpCondition::Carry => cpu.r.f.contains(super::registers::FlagsRegister::CARRY),
            JumpCondition::Always => true,
        }
    }
}

impl fmt::Display for JumpCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JumpCondition::NotZero => write!(f, "NZ"),
            JumpCondition::Zero => write!(f, "Z"),
            JumpCondition::NotCarry => write!(f, "NC"),
            JumpCondition::Carry => write!(f, "C"),
            JumpCondition::Always => write!(f, ""),
        }
    }
}

#[derive(Copy, Clone)]
pub enum JumpTarget {
    D16(u16),
    HL,
}

impl JumpTarget {
    #[inline]
    pub fn resolve(&self, cpu: &CPU) -> u16 {
        match *self {
            JumpTarget::D16(addr) => addr,
            JumpTarget::HL => cpu.r.get_hl(),
        }
    }
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JumpTarget::D16(addr) => write!(f, "{addr:#06x}"),
            JumpTarget::HL => write!(f, "(HL)"),
        }
    }
}

#[derive(Copy, Clone)]
#[repr(u16)]
pub enum ResetCode {
    RST00 = 0x00,
    RST08 = 0x08,
    RST10 = 0x10,
    RST18 = 0x18,
    RST20 = 0x20,
    RST28 = 0x28,
    RST30 = 0x30,
    RST38 = 0x38,
}

impl ResetCode {
    #[inline]
    pub fn address(&self) -> u16 {
        *self as u16
    }
}

impl fmt::Display for ResetCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.address())
    }
}

#[derive(Copy, Clone)]
pub enum Load {
    Byte(ByteTarget, ByteSource),
    Word(WordTarget, WordSource),
    IndirectFrom(IndirectByteRef, ByteSource),
    IndirectFromAInc(IndirectByteRef),
    IndirectFromADec(IndirectByteRef),
    FromIndirectAInc(ByteSource),
    FromIndirectADec(ByteSource),
    IndirectFromWord(WordTarget, WordSource),
    IndirectFromSPi8(WordTarget, i8),
}

impl fmt::Display for Load {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Load::Byte(target, source) => write!(f, "{target}, {source}"),
            Load::Word(target, source) => write!(f, "{target}, {source}"),
            Load::IndirectFrom(_, source) => write!(f, "(..), {source}"),
            Load::IndirectFromAInc(_) => write!(f, "(HL+), A"),
            Load::IndirectFromADec(_) => write!(f, "(HL-), A"),
            Load::FromIndirectAInc(_) => write!(f, "A, (HL+)"),
            Load::FromIndirectADec(_) => write!(f, "A, (HL-)"),
            Load::IndirectFromWord(target, source) => write!(f, "{target}, {source}"),
            Load::IndirectFromSPi8(target, offset) => write!(f, "{target}, SP+{offset:#04x}"),
        }
    }
}
