use crate::interrupts::Interrupt;

/// Everything the CPU sees of the machine.
///
/// The CPU calls `tick_mcycle` after every memory access and internal delay,
/// so implementations advance their peripherals in lockstep with execution.
pub trait Bus {
    fn read(&mut self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, val: u8);

    /// Advance the rest of the machine by one M-cycle (4 T-cycles).
    fn tick_mcycle(&mut self);

    /// IE & IF, limited to the five interrupt sources.
    fn pending_interrupts(&self) -> u8;

    fn acknowledge_interrupt(&mut self, interrupt: Interrupt);

    /// Sample the input provider. Called once per CPU step.
    fn poll_input(&mut self) {}

    fn any_button_pressed(&self) -> bool {
        false
    }

    /// Executed by STOP.
    fn reset_div(&mut self) {}
}

/// 64 KiB of plain RAM with IE/IF at their usual addresses.
///
/// Used for instruction-level tests where no peripherals are wanted.
pub struct FlatBus {
    memory: Box<[u8]>,
    /// M-cycles ticked so far.
    pub ticks: u64,
}

impl FlatBus {
    pub fn new() -> Self {
        Self {
            memory: vec![0; 0x10000].into_boxed_slice(),
            ticks: 0,
        }
    }

    /// Copy `bytes` into memory starting at `addr`.
    pub fn load(&mut self, addr: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.memory[(addr as usize + i) & 0xFFFF] = b;
        }
    }

    pub fn peek(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }
}

impl Default for FlatBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for FlatBus {
    fn read(&mut self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.memory[addr as usize] = val;
    }

    fn tick_mcycle(&mut self) {
        self.ticks += 1;
    }

    fn pending_interrupts(&self) -> u8 {
        self.memory[0xFFFF] & self.memory[0xFF0F] & 0x1F
    }

    fn acknowledge_interrupt(&mut self, interrupt: Interrupt) {
        self.memory[0xFF0F] &= !interrupt.bit();
    }
}
