// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

/// SM83 register file.
///
/// Register pairs are stored as 16-bit words; the 8-bit halves are views
/// computed by shifting and masking, so `A`/`F` and `AF` can never drift.
/// The low nibble of `F` always reads back as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    af: u16,
    bc: u16,
    de: u16,
    hl: u16,
    pub sp: u16,
    pub pc: u16,
}

macro_rules! pair_halves {
    ($pair:ident, $hi:ident, $set_hi:ident, $lo:ident, $set_lo:ident) => {
        #[inline]
        pub fn $hi(&self) -> u8 {
            (self.$pair >> 8) as u8
        }

        #[inline]
        pub fn $set_hi(&mut self, val: u8) {
            self.$pair = (self.$pair & 0x00FF) | ((val as u16) << 8);
        }

        #[inline]
        pub fn $lo(&self) -> u8 {
            self.$pair as u8
        }

        #[inline]
        pub fn $set_lo(&mut self, val: u8) {
            self.$pair = (self.$pair & 0xFF00) | val as u16;
        }
    };
}

impl Registers {
    /// DMG register contents after the boot ROM hands over control
    /// (gbdev.io/pandocs/Power_Up_State.html).
    pub fn post_boot() -> Self {
        Self {
            af: 0x01B0,
            bc: 0x0013,
            de: 0x00D8,
            hl: 0x014D,
            sp: 0xFFFE,
            pc: 0x0100,
        }
    }

    pair_halves!(bc, b, set_b, c, set_c);
    pair_halves!(de, d, set_d, e, set_e);
    pair_halves!(hl, h, set_h, l, set_l);

    #[inline]
    pub fn a(&self) -> u8 {
        (self.af >> 8) as u8
    }

    #[inline]
    pub fn set_a(&mut self, val: u8) {
        self.af = (self.af & 0x00FF) | ((val as u16) << 8);
    }

    #[inline]
    pub fn f(&self) -> u8 {
        self.af as u8
    }

    #[inline]
    pub fn set_f(&mut self, val: u8) {
        self.af = (self.af & 0xFF00) | (val & 0xF0) as u16;
    }

    #[inline]
    pub fn af(&self) -> u16 {
        self.af
    }

    #[inline]
    pub fn set_af(&mut self, val: u16) {
        self.af = val & 0xFFF0;
    }

    #[inline]
    pub fn bc(&self) -> u16 {
        self.bc
    }

    #[inline]
    pub fn set_bc(&mut self, val: u16) {
        self.bc = val;
    }

    #[inline]
    pub fn de(&self) -> u16 {
        self.de
    }

    #[inline]
    pub fn set_de(&mut self, val: u16) {
        self.de = val;
    }

    #[inline]
    pub fn hl(&self) -> u16 {
        self.hl
    }

    #[inline]
    pub fn set_hl(&mut self, val: u16) {
        self.hl = val;
    }

    #[inline]
    pub fn flag(&self, mask: u8) -> bool {
        self.f() & mask != 0
    }

    pub fn set_flag(&mut self, mask: u8, on: bool) {
        let f = if on { self.f() | mask } else { self.f() & !mask };
        self.set_f(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_alias_pairs() {
        let mut regs = Registers::default();
        regs.set_b(0x12);
        regs.set_c(0x34);
        assert_eq!(regs.bc(), 0x1234);

        regs.set_hl(0xBEEF);
        assert_eq!(regs.h(), 0xBE);
        assert_eq!(regs.l(), 0xEF);

        regs.set_a(0x7F);
        assert_eq!(regs.af() >> 8, 0x7F);
    }

    #[test]
    fn flag_low_nibble_is_always_clear() {
        let mut regs = Registers::default();
        regs.set_f(0xFF);
        assert_eq!(regs.f(), 0xF0);

        regs.set_af(0x12FF);
        assert_eq!(regs.a(), 0x12);
        assert_eq!(regs.f(), 0xF0);
    }

    #[test]
    fn set_flag_touches_one_bit() {
        let mut regs = Registers::default();
        regs.set_flag(FLAG_C, true);
        regs.set_flag(FLAG_Z, true);
        regs.set_flag(FLAG_Z, false);
        assert_eq!(regs.f(), FLAG_C);
        assert!(regs.flag(FLAG_C));
        assert!(!regs.flag(FLAG_H));
    }
}
