#![doc = include_str!("../README.md")]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use watch4::emu::{
    emulator::{EmuState, Emulator},
    patch::parse_number,
    Region,
};

/// Emulator for a 4-bit watch/calculator microcontroller.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Internal (program) memory image, up to 6144 bytes.
    #[arg(long)]
    rom: Option<PathBuf>,
    /// External (data) memory image, up to 2048 bytes.
    #[arg(long)]
    ram: Option<PathBuf>,
    /// Speed relative to real time; 0 runs as fast as possible.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,
    /// Stop after this many base ticks.
    #[arg(long)]
    ticks: Option<u64>,
    /// Pause in the debugger when PC reaches this address. May be repeated.
    #[arg(long = "break", value_parser = parse_addr)]
    breakpoints: Vec<u32>,
    /// Start paused in the debugger.
    #[arg(long)]
    debug: bool,
    /// State patch applied before the first tick, e.g. "PC=0x10;SR{13:0xF}".
    #[arg(long)]
    patch: Option<String>,
    /// Print the LCD as text on exit.
    #[arg(long)]
    dump_lcd: bool,
    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

fn parse_addr(s: &str) -> Result<u32, String> {
    parse_number(s).ok_or_else(|| format!("not a decimal or 0x hex number: {s:?}"))
}

fn main() -> Result<()> {
    let args = Args::parse();
    TermLogger::init(
        args.log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let mut emu = Emulator::new(args.speed)?;
    for (region, path) in [(Region::Internal, &args.rom), (Region::External, &args.ram)] {
        if let Some(path) = path {
            if let Err(e) = emu.load(region, path) {
                log::warn!("{e}");
            }
        }
    }
    for addr in args.breakpoints {
        emu.add_breakpoint(addr)?;
    }
    if let Some(patch) = &args.patch {
        let rejected = emu.poke(patch);
        if !rejected.is_empty() {
            log::warn!("{} patch entries skipped", rejected.len());
        }
    }
    emu.tick_limit = args.ticks;
    if args.debug {
        emu.state = EmuState::Pause;
    }

    emu.run_while_continue()?;

    log::info!(
        "stopped at PC={:03X} after {} ticks ({} cycles retired)",
        emu.cpu.regs.pc(),
        emu.ticks(),
        emu.cpu.cycles()
    );
    if args.dump_lcd {
        print!("{}", emu.lcd.render_text());
    }
    Ok(())
}
