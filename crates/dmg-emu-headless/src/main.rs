mod screenshot;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{debug, error, info};

use dmg_emu_core::{
    GameBoy, RunConfig, frame_exchange::frame_exchange, header::Destination,
};

/// Run a Game Boy ROM without a window.
#[derive(Parser)]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Path to boot ROM file
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long, conflicts_with = "seconds")]
    frames: Option<u64>,

    /// Number of CPU cycles to run
    #[arg(long, conflicts_with = "seconds")]
    cycles: Option<u64>,

    /// Run in real time for this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Emulation speed for --seconds; 0 runs as fast as possible
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Print serial output when done
    #[arg(long)]
    serial: bool,

    /// Save the last frame as a PNG
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Enable debug logging of CPU state and serial output
    #[arg(long)]
    debug: bool,
}

const DEFAULT_FRAMES: u64 = 60;

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let rom = std::fs::read(&args.rom)
        .map_err(|e| format!("failed to read {}: {e}", args.rom.display()))?;
    let mut gb = GameBoy::from_rom(rom)?;

    if let Some(cart) = gb.mmu.cart() {
        let header = cart.header();
        info!(
            "{} ({}, {}), licensee {}",
            args.rom.display(),
            if header.destination == Destination::Japan {
                "Japan"
            } else {
                "overseas"
            },
            if header.cgb_supported() {
                "CGB-aware"
            } else {
                "DMG"
            },
            header.licensee
        );
    }

    if let Some(path) = &args.bootrom {
        let data = std::fs::read(path)
            .map_err(|e| format!("failed to read boot ROM {}: {e}", path.display()))?;
        gb.load_boot_rom(data);
    }

    match args.seconds {
        Some(secs) => run_realtime(&mut gb, secs, args.speed)?,
        None => run_batch(&mut gb, args.frames, args.cycles)?,
    }

    info!("{}", gb.snapshot());

    if args.serial {
        print_serial(&gb.take_serial());
    }
    if let Some(path) = &args.screenshot {
        screenshot::write_png(path, gb.framebuffer())?;
        info!("saved screenshot to {}", path.display());
    }
    Ok(())
}

/// Step frame by frame as fast as possible until a frame or cycle limit.
fn run_batch(
    gb: &mut GameBoy,
    frame_limit: Option<u64>,
    cycle_limit: Option<u64>,
) -> dmg_emu_core::Result<()> {
    let frame_limit = match (frame_limit, cycle_limit) {
        (None, None) => Some(DEFAULT_FRAMES),
        (frames, _) => frames,
    };

    let mut frame_count = 0u64;
    loop {
        gb.run_until_frame()?;
        frame_count += 1;

        if frame_count.is_multiple_of(60) {
            debug!("frame {frame_count}: {}", gb.cpu.debug_state());
        }
        if frame_limit.is_some_and(|max| frame_count >= max) {
            break;
        }
        if cycle_limit.is_some_and(|max| gb.cpu.cycles >= max) {
            break;
        }
    }
    Ok(())
}

/// Run paced to wall time on this thread while a second thread consumes
/// frames the way a display would.
fn run_realtime(gb: &mut GameBoy, secs: u64, speed: f64) -> dmg_emu_core::Result<()> {
    let (producer, mut consumer) = frame_exchange();
    gb.set_frame_sink(producer);

    let stop = AtomicBool::new(false);
    let config = RunConfig {
        speed,
        ..RunConfig::default()
    };

    thread::scope(|s| {
        let display = s.spawn(|| {
            let mut shown = 0u64;
            while !stop.load(Ordering::Relaxed) {
                if consumer.take().is_some() {
                    shown += 1;
                } else {
                    thread::sleep(Duration::from_millis(2));
                }
            }
            shown
        });
        s.spawn(|| {
            let deadline = Instant::now() + Duration::from_secs(secs);
            while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            stop.store(true, Ordering::Relaxed);
        });

        let result = gb.run(&config, &stop, |snap| debug!("{snap}"));
        stop.store(true, Ordering::Relaxed);
        if let Ok(shown) = display.join() {
            info!("displayed {shown} frames");
        }
        result
    })
}

fn print_serial(bytes: &[u8]) {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' || b == b'\n' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    println!("{out}");
}
