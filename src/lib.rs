pub mod gb;
pub mod utils;

pub use gb::emulator::GameBoy;
