/// Interrupt sources in priority order (bit 0 is serviced first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    #[inline]
    pub fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Handler address (gbdev.io/pandocs/Interrupts.html).
    #[inline]
    pub fn vector(self) -> u16 {
        0x40 + 8 * self as u16
    }

    /// Highest-priority source whose bit is set in `mask`.
    pub fn highest(mask: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| mask & i.bit() != 0)
    }
}

/// IE/IF register pair. Holds state only; dispatch timing belongs to the CPU.
#[derive(Debug, Clone, Default)]
pub struct InterruptController {
    enabled: u8,
    requested: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.requested |= interrupt.bit();
    }

    pub fn clear(&mut self, interrupt: Interrupt) {
        self.requested &= !interrupt.bit();
    }

    /// Enabled and requested sources.
    #[inline]
    pub fn pending(&self) -> u8 {
        self.enabled & self.requested & 0x1F
    }

    pub fn any_pending(&self) -> bool {
        self.pending() != 0
    }

    pub fn highest_priority(&self) -> Option<Interrupt> {
        Interrupt::highest(self.pending())
    }

    /// IF as seen on the bus: the upper three bits read as set.
    pub fn read_if(&self) -> u8 {
        self.requested | 0xE0
    }

    pub fn write_if(&mut self, val: u8) {
        self.requested = val & 0x1F;
    }

    pub fn read_ie(&self) -> u8 {
        self.enabled
    }

    pub fn write_ie(&mut self, val: u8) {
        self.enabled = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_follow_bit_index() {
        assert_eq!(Interrupt::VBlank.vector(), 0x40);
        assert_eq!(Interrupt::LcdStat.vector(), 0x48);
        assert_eq!(Interrupt::Timer.vector(), 0x50);
        assert_eq!(Interrupt::Serial.vector(), 0x58);
        assert_eq!(Interrupt::Joypad.vector(), 0x60);
    }

    #[test]
    fn highest_priority_respects_enable_mask() {
        let mut ic = InterruptController::new();
        ic.request(Interrupt::Joypad);
        ic.request(Interrupt::Timer);
        assert!(!ic.any_pending());

        ic.write_ie(0x10);
        assert_eq!(ic.highest_priority(), Some(Interrupt::Joypad));

        ic.write_ie(0x1F);
        assert_eq!(ic.highest_priority(), Some(Interrupt::Timer));

        ic.clear(Interrupt::Timer);
        assert_eq!(ic.highest_priority(), Some(Interrupt::Joypad));
    }

    #[test]
    fn if_register_upper_bits_read_high() {
        let mut ic = InterruptController::new();
        ic.write_if(0xFF);
        assert_eq!(ic.read_if(), 0xFF);
        ic.write_if(0x01);
        assert_eq!(ic.read_if(), 0xE1);
        ic.write_ie(0xFF);
        assert_eq!(ic.pending(), 0x01);
    }
}
