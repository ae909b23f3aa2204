use crate::interrupts::{Interrupt, InterruptController};

/// Post-boot phase of the internal divider on DMG revisions A-C.
pub const POST_BOOT_DIVIDER: u16 = 0xABCC;

/// T-cycles between TIMA overflow and the TMA reload.
const RELOAD_DELAY: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    Idle,
    /// TIMA overflowed and reads 0x00 until the reload lands.
    Pending(u8),
    /// The reload happened during the current M-cycle.
    Reloaded,
}

/// DIV/TIMA/TMA/TAC.
///
/// TIMA is clocked by the falling edge of `enabled && divider[bit]`, where the
/// bit is chosen by TAC. Resetting DIV or rewriting TAC can therefore produce
/// an extra increment, just like on hardware.
#[derive(Debug, Clone)]
pub struct Timer {
    /// 16-bit internal divider; DIV is the upper byte.
    divider: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    last_signal: bool,
    overflow: Overflow,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            divider: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            last_signal: false,
            overflow: Overflow::Idle,
        }
    }

    pub fn with_divider(divider: u16) -> Self {
        Self {
            divider,
            ..Self::new()
        }
    }

    pub fn divider(&self) -> u16 {
        self.divider
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.divider >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => match self.overflow {
                // The reload wins when both land on the same cycle.
                Overflow::Reloaded => {}
                // Writing during the delay cancels the pending reload.
                Overflow::Pending(_) => {
                    self.tima = val;
                    self.overflow = Overflow::Idle;
                }
                Overflow::Idle => self.tima = val,
            },
            0xFF06 => {
                self.tma = val;
                if self.overflow == Overflow::Reloaded {
                    self.tima = val;
                }
            }
            0xFF07 => {
                self.tac = val & 0x07;
                self.clock_edge();
            }
            _ => {}
        }
    }

    /// Advance by `cycles` T-cycles.
    pub fn step(&mut self, cycles: u32, ints: &mut InterruptController) {
        for _ in 0..cycles {
            self.advance_reload(ints);
            self.divider = self.divider.wrapping_add(1);
            self.clock_edge();
        }
    }

    /// Clear the divider. If the selected bit was high this produces a
    /// falling edge and clocks TIMA once.
    pub fn reset_div(&mut self) {
        self.divider = 0;
        if self.last_signal {
            self.last_signal = false;
            self.increment();
        }
    }

    fn advance_reload(&mut self, ints: &mut InterruptController) {
        self.overflow = match self.overflow {
            Overflow::Pending(1) => {
                self.tima = self.tma;
                ints.request(Interrupt::Timer);
                Overflow::Reloaded
            }
            Overflow::Pending(n) => Overflow::Pending(n - 1),
            Overflow::Reloaded | Overflow::Idle => Overflow::Idle,
        };
    }

    fn clock_edge(&mut self) {
        let signal = self.signal();
        if self.last_signal && !signal {
            self.increment();
        }
        self.last_signal = signal;
    }

    fn increment(&mut self) {
        let (next, overflowed) = self.tima.overflowing_add(1);
        self.tima = next;
        if overflowed {
            self.overflow = Overflow::Pending(RELOAD_DELAY);
        }
    }

    fn signal(&self) -> bool {
        if self.tac & 0x04 == 0 {
            return false;
        }
        // 4096 Hz, 262144 Hz, 65536 Hz, 16384 Hz
        let bit = match self.tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        (self.divider >> bit) & 1 != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
