use crate::interrupts::{Interrupt, InterruptController};

/// T-cycles per shifted bit with the internal 8192 Hz clock.
const CYCLES_PER_BIT: u32 = 512;

/// SB/SC serial port with no link partner attached.
///
/// Bytes sent with the internal clock are captured so test ROMs that print
/// over the link port can be observed. Incoming bits read as 1, so a finished
/// transfer leaves 0xFF in SB.
#[derive(Debug, Clone)]
pub struct Serial {
    sb: u8,
    sc: u8,
    bits_left: u8,
    bit_timer: u32,
    output: Vec<u8>,
}

impl Serial {
    pub fn new() -> Self {
        Self {
            sb: 0,
            sc: 0,
            bits_left: 0,
            bit_timer: 0,
            output: Vec::new(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val & 0x81;
                if val & 0x81 == 0x81 {
                    self.output.push(self.sb);
                    self.bits_left = 8;
                    self.bit_timer = CYCLES_PER_BIT;
                } else {
                    // External clock never ticks without a partner.
                    self.bits_left = 0;
                }
            }
            _ => {}
        }
    }

    pub fn step(&mut self, cycles: u32, ints: &mut InterruptController) {
        if self.bits_left == 0 {
            return;
        }
        let mut cycles = cycles;
        while cycles > 0 && self.bits_left > 0 {
            let run = cycles.min(self.bit_timer);
            cycles -= run;
            self.bit_timer -= run;
            if self.bit_timer == 0 {
                self.sb = (self.sb << 1) | 1;
                self.bits_left -= 1;
                self.bit_timer = CYCLES_PER_BIT;
                if self.bits_left == 0 {
                    self.sc &= 0x7F;
                    ints.request(Interrupt::Serial);
                }
            }
        }
    }

    /// Bytes sent so far, without draining them.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}

impl Default for Serial {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_clock_transfer_completes_after_eight_bits() {
        let mut ints = InterruptController::new();
        ints.write_ie(0xFF);
        let mut serial = Serial::new();
        serial.write(0xFF01, b'P');
        serial.write(0xFF02, 0x81);
        assert_eq!(serial.output(), b"P");
        assert_eq!(serial.read(0xFF02), 0xFF);

        serial.step(8 * CYCLES_PER_BIT - 1, &mut ints);
        assert!(!ints.any_pending());
        serial.step(1, &mut ints);

        assert_eq!(ints.highest_priority(), Some(Interrupt::Serial));
        assert_eq!(serial.read(0xFF01), 0xFF);
        assert_eq!(serial.read(0xFF02), 0x7F);
    }

    #[test]
    fn external_clock_captures_nothing() {
        let mut serial = Serial::new();
        serial.write(0xFF01, 0x42);
        serial.write(0xFF02, 0x80);
        assert!(serial.output().is_empty());
        assert_eq!(serial.take_output(), Vec::<u8>::new());
    }
}
