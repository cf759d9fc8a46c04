use clap::Parser;
use romoulade::gb::cartridge::Cartridge;
use romoulade::gb::constants::BOOT_SIZE;
use romoulade::gb::emulator::GameBoy;
use romoulade::gb::CPU_CLOCK_SPEED;
use std::path::PathBuf;

/// Headless harness that exercises the core end to end: loads a ROM (and an
/// optional boot ROM), then drives `power_on` and repeated `step_frame`
/// calls for a fixed number of frames, logging a heartbeat every N frames.
///
/// Owns no window, no SDL/egui dependency, and no renderer.
#[derive(Parser)]
#[command(name = "romoulade-core", version, about = "Game Boy (DMG) emulator core driver")]
struct Args {
    /// Path of the ROM to load
    rom: PathBuf,

    /// Optional 256-byte boot ROM image to run before cartridge code
    #[arg(long)]
    boot_rom: Option<PathBuf>,

    /// Number of frames to run before exiting
    #[arg(long, default_value_t = 60)]
    frames: u64,

    /// Emit a heartbeat log line every N frames
    #[arg(long, default_value_t = 60)]
    heartbeat: u64,
}

fn load_boot_rom(path: &PathBuf) -> Result<[u8; BOOT_SIZE], String> {
    let bytes = std::fs::read(path).map_err(|err| format!("failed to read boot ROM: {err}"))?;
    let array: [u8; BOOT_SIZE] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("boot ROM must be exactly {BOOT_SIZE} bytes, got {}", bytes.len()))?;
    Ok(array)
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    log::info!("loading cartridge {}", args.rom.display());
    let cartridge = match Cartridge::try_from(args.rom.as_path()) {
        Ok(cartridge) => cartridge,
        Err(err) => {
            log::error!("failed to load cartridge: {err}");
            std::process::exit(1);
        }
    };
    log::info!("loaded {cartridge}");

    let boot_rom = match args.boot_rom.as_ref().map(load_boot_rom) {
        Some(Ok(rom)) => Some(rom),
        Some(Err(err)) => {
            log::error!("{err}");
            std::process::exit(1);
        }
        None => None,
    };

    let mut gb = GameBoy::power_on(cartridge, boot_rom);
    for frame in 1..=args.frames {
        match gb.step_frame() {
            Ok(result) => {
                if frame % args.heartbeat == 0 {
                    log::info!("frame {frame}/{} ({} cycles)", args.frames, result.cycles);
                }
            }
            Err(err) => {
                log::error!("frame {frame}: {err}");
                std::process::exit(1);
            }
        }
    }
    log::info!("ran {} frames at {CPU_CLOCK_SPEED} Hz core clock", args.frames);
}
