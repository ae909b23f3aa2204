use std::fmt;

use crate::cpu::{Cpu, RunState};
use crate::ppu::Ppu;

/// Point-in-time copy of the machine state for debug views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Register mnemonic to uppercase hex: A F B C D E H L, then AF BC DE HL
    /// SP PC.
    pub registers: Vec<(&'static str, String)>,
    pub lcdc: u8,
    pub stat: u8,
    pub ly: u8,
    pub ime: bool,
    pub state: RunState,
    pub cycles: u64,
    pub frames: u64,
}

impl Snapshot {
    pub fn capture(cpu: &Cpu, ppu: &Ppu) -> Self {
        let r = &cpu.regs;
        let bytes = [
            ("A", r.a()),
            ("F", r.f()),
            ("B", r.b()),
            ("C", r.c()),
            ("D", r.d()),
            ("E", r.e()),
            ("H", r.h()),
            ("L", r.l()),
        ];
        let words = [
            ("AF", r.af()),
            ("BC", r.bc()),
            ("DE", r.de()),
            ("HL", r.hl()),
            ("SP", r.sp),
            ("PC", r.pc),
        ];
        let registers = bytes
            .into_iter()
            .map(|(name, v)| (name, format!("{v:02X}")))
            .chain(words.into_iter().map(|(name, v)| (name, format!("{v:04X}"))))
            .collect();

        Self {
            registers,
            lcdc: ppu.lcdc(),
            stat: ppu.stat(),
            ly: ppu.ly(),
            ime: cpu.ime,
            state: cpu.state,
            cycles: cpu.cycles,
            frames: ppu.frames(),
        }
    }

    pub fn register(&self, name: &str) -> Option<&str> {
        self.registers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.registers {
            write!(f, "{name}:{value} ")?;
        }
        write!(
            f,
            "LCDC:{:02X} STAT:{:02X} LY:{:02X} IME:{} {:?}",
            self.lcdc, self.stat, self.ly, self.ime as u8, self.state
        )
    }
}
