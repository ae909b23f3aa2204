use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info};

use crate::{
    cartridge::Cartridge,
    cpu::Cpu,
    error::Result,
    frame_exchange::FrameProducer,
    joypad::InputProvider,
    mmu::Mmu,
    snapshot::Snapshot,
};

/// T-cycles in one full LCD frame (154 lines of 456 cycles).
pub const CYCLES_PER_FRAME: u64 = 70_224;
pub const CPU_CLOCK_HZ: u64 = 4_194_304;

/// Pacing parameters for [`GameBoy::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub clock_hz: u64,
    /// Minimum wall time between observer callbacks.
    pub snapshot_interval: Duration,
    /// Sleep taken when emulation is ahead of the wall clock.
    pub idle_sleep: Duration,
    /// Multiplier on `clock_hz`. Zero or negative runs unthrottled.
    pub speed: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            clock_hz: CPU_CLOCK_HZ,
            snapshot_interval: Duration::from_millis(250),
            idle_sleep: Duration::from_millis(1),
            speed: 1.0,
        }
    }
}

impl RunConfig {
    /// T-cycles the machine should have executed after `elapsed` wall time,
    /// or `None` when unthrottled.
    fn cycle_budget(&self, elapsed: Duration) -> Option<u64> {
        if self.speed <= 0.0 {
            return None;
        }
        Some((elapsed.as_secs_f64() * self.clock_hz as f64 * self.speed) as u64)
    }
}

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    frame_sink: Option<FrameProducer>,
    frame_done: bool,
}

impl GameBoy {
    /// A machine in the state the boot ROM leaves behind, with no cartridge.
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
            frame_sink: None,
            frame_done: false,
        }
    }

    pub fn from_rom(rom: Vec<u8>) -> Result<Self> {
        let mut gb = Self::new();
        gb.load_cart(Cartridge::from_bytes(rom)?);
        Ok(gb)
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.mmu.load_cart(cart);
    }

    /// Reset to power-on state and map `data` over the start of ROM, so
    /// execution begins inside the boot ROM at 0x0000.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        self.cpu = Cpu::power_on();
        self.mmu.reset_power_on();
        self.mmu.load_boot_rom(data);
    }

    pub fn set_input_provider(&mut self, input: Box<dyn InputProvider>) {
        self.mmu.set_input_provider(input);
    }

    /// Every finished frame is published to `sink` from now on.
    pub fn set_frame_sink(&mut self, sink: FrameProducer) {
        self.frame_sink = Some(sink);
    }

    /// Execute one instruction (or one idle M-cycle while halted or stopped)
    /// and return the T-cycles spent.
    pub fn step(&mut self) -> Result<u32> {
        let cycles = self.cpu.step(&mut self.mmu)?;
        if self.mmu.ppu.take_frame_ready() {
            self.frame_done = true;
            if let Some(sink) = &mut self.frame_sink {
                sink.publish(self.mmu.ppu.framebuffer());
            }
        }
        Ok(cycles)
    }

    /// Run at least `cycles` T-cycles and return how many actually ran.
    pub fn run_for_cycles(&mut self, cycles: u64) -> Result<u64> {
        let mut spent = 0u64;
        while spent < cycles {
            spent += self.step()? as u64;
        }
        Ok(spent)
    }

    /// Run until the PPU finishes a frame. With the LCD off no frame ever
    /// completes, so this gives up after one frame's worth of cycles.
    pub fn run_until_frame(&mut self) -> Result<u64> {
        self.frame_done = false;
        let mut spent = 0u64;
        while !self.frame_done && spent < CYCLES_PER_FRAME {
            spent += self.step()? as u64;
        }
        Ok(spent)
    }

    /// Step until `done` returns true or `max_cycles` have run. Returns
    /// whether the predicate was satisfied.
    pub fn run_until(
        &mut self,
        max_cycles: u64,
        mut done: impl FnMut(&GameBoy) -> bool,
    ) -> Result<bool> {
        let mut spent = 0u64;
        while spent < max_cycles {
            if done(self) {
                return Ok(true);
            }
            spent += self.step()? as u64;
        }
        Ok(done(self))
    }

    /// Drive the machine in real time until `stop` is set.
    ///
    /// Emulated time tracks wall time through `config`. `observer` receives a
    /// [`Snapshot`] at most once per `snapshot_interval`. The first fatal CPU
    /// error ends the loop and is returned.
    pub fn run(
        &mut self,
        config: &RunConfig,
        stop: &AtomicBool,
        mut observer: impl FnMut(&Snapshot),
    ) -> Result<()> {
        let start = Instant::now();
        let mut executed = 0u64;
        let mut last_snapshot: Option<Instant> = None;
        info!(
            "emulation started ({} Hz, speed {})",
            config.clock_hz, config.speed
        );

        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            let target = config
                .cycle_budget(now.duration_since(start))
                .unwrap_or(executed + CYCLES_PER_FRAME);

            if executed < target {
                let batch = (target - executed).min(CYCLES_PER_FRAME);
                executed += self.run_for_cycles(batch).inspect_err(|e| {
                    error!("emulation halted: {e}");
                })?;
            } else {
                thread::sleep(config.idle_sleep);
            }

            if last_snapshot.is_none_or(|t| now.duration_since(t) >= config.snapshot_interval) {
                observer(&self.snapshot());
                last_snapshot = Some(now);
            }
        }

        info!(
            "emulation stopped after {} frames, {} cycles",
            self.frames(),
            self.cpu.cycles
        );
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.cpu, &self.mmu.ppu)
    }

    pub fn frames(&self) -> u64 {
        self.mmu.ppu.frames()
    }

    /// RGBA8888, row-major, 160x144.
    pub fn framebuffer(&self) -> &[u8] {
        self.mmu.ppu.framebuffer()
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.mmu.take_serial()
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
