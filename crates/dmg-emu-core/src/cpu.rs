use log::{error, trace};

use crate::alu;
use crate::bus::Bus;
use crate::error::{EmuError, Result};
use crate::interrupts::Interrupt;
use crate::registers::{FLAG_C, FLAG_Z, Registers};

/// Opcodes with no instruction behind them; executing one locks up the CPU.
const ILLEGAL_OPCODES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Running,
    /// Waiting in HALT for IE & IF to become non-zero.
    Halted,
    /// Waiting in STOP for a button press, or locked after a fatal error.
    Stopped,
}

/// SM83 interpreter.
///
/// Each memory access costs one M-cycle and ticks the bus right away, so
/// peripherals observe accesses at the cycle they happen.
#[derive(Debug, Clone)]
pub struct Cpu {
    pub regs: Registers,
    pub ime: bool,
    pub state: RunState,
    /// T-cycles executed since creation.
    pub cycles: u64,
    /// Set by EI; IME turns on after the following instruction.
    ei_pending: bool,
    /// Next opcode fetch does not advance PC.
    halt_bug: bool,
    fault: Option<EmuError>,
}

impl Cpu {
    /// CPU as the DMG boot ROM leaves it.
    pub fn new() -> Self {
        Self::with_registers(Registers::post_boot())
    }

    /// CPU at power-on, for running a boot ROM from 0x0000.
    pub fn power_on() -> Self {
        Self::with_registers(Registers::default())
    }

    fn with_registers(regs: Registers) -> Self {
        Self {
            regs,
            ime: false,
            state: RunState::Running,
            cycles: 0,
            ei_pending: false,
            halt_bug: false,
            fault: None,
        }
    }

    /// The error that stopped the CPU, if any.
    pub fn fault(&self) -> Option<&EmuError> {
        self.fault.as_ref()
    }

    pub fn halt_bug_pending(&self) -> bool {
        self.halt_bug
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} CY:{}",
            self.regs.af(),
            self.regs.bc(),
            self.regs.de(),
            self.regs.hl(),
            self.regs.pc,
            self.regs.sp,
            self.cycles
        )
    }

    #[inline(always)]
    fn tick<B: Bus>(&mut self, bus: &mut B) {
        bus.tick_mcycle();
        self.cycles += 4;
    }

    #[inline(always)]
    fn fetch8<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let val = bus.read(self.regs.pc);
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.regs.pc = self.regs.pc.wrapping_add(1);
        }
        self.tick(bus);
        val
    }

    #[inline(always)]
    fn fetch16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    #[inline(always)]
    fn read8<B: Bus>(&mut self, bus: &mut B, addr: u16) -> u8 {
        let val = bus.read(addr);
        self.tick(bus);
        val
    }

    #[inline(always)]
    fn write8<B: Bus>(&mut self, bus: &mut B, addr: u16, val: u8) {
        bus.write(addr, val);
        self.tick(bus);
    }

    fn push16<B: Bus>(&mut self, bus: &mut B, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(bus, self.regs.sp, (val >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write8(bus, self.regs.sp, val as u8);
    }

    fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.read8(bus, self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = self.read8(bus, self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// Operand index used by most opcodes: B C D E H L (HL) A.
    fn read_r8<B: Bus>(&mut self, bus: &mut B, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.regs.b(),
            1 => self.regs.c(),
            2 => self.regs.d(),
            3 => self.regs.e(),
            4 => self.regs.h(),
            5 => self.regs.l(),
            6 => self.read8(bus, self.regs.hl()),
            _ => self.regs.a(),
        }
    }

    fn write_r8<B: Bus>(&mut self, bus: &mut B, index: u8, val: u8) {
        match index & 0x07 {
            0 => self.regs.set_b(val),
            1 => self.regs.set_c(val),
            2 => self.regs.set_d(val),
            3 => self.regs.set_e(val),
            4 => self.regs.set_h(val),
            5 => self.regs.set_l(val),
            6 => self.write8(bus, self.regs.hl(), val),
            _ => self.regs.set_a(val),
        }
    }

    /// BC DE HL SP.
    fn r16(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn set_r16(&mut self, index: u8, val: u16) {
        match index & 0x03 {
            0 => self.regs.set_bc(val),
            1 => self.regs.set_de(val),
            2 => self.regs.set_hl(val),
            _ => self.regs.sp = val,
        }
    }

    /// NZ Z NC C.
    fn condition(&self, index: u8) -> bool {
        match index & 0x03 {
            0 => !self.regs.flag(FLAG_Z),
            1 => self.regs.flag(FLAG_Z),
            2 => !self.regs.flag(FLAG_C),
            _ => self.regs.flag(FLAG_C),
        }
    }

    /// ADD ADC SUB SBC AND XOR OR CP.
    fn alu_op(&mut self, op: u8, val: u8) {
        let a = self.regs.a();
        let carry = self.regs.flag(FLAG_C);
        let (res, flags) = match op & 0x07 {
            0 => alu::add(a, val, false),
            1 => alu::add(a, val, carry),
            2 => alu::sub(a, val, false),
            3 => alu::sub(a, val, carry),
            4 => alu::and(a, val),
            5 => alu::xor(a, val),
            6 => alu::or(a, val),
            _ => alu::sub(a, val, false),
        };
        if op & 0x07 != 7 {
            self.regs.set_a(res);
        }
        self.regs.set_f(flags);
    }

    /// Push PC and jump to the highest-priority pending interrupt. 20 cycles.
    fn dispatch_interrupt<B: Bus>(&mut self, bus: &mut B, pending: u8) {
        let Some(interrupt) = Interrupt::highest(pending) else {
            return;
        };
        self.ime = false;
        bus.acknowledge_interrupt(interrupt);
        self.tick(bus);
        self.tick(bus);
        self.push16(bus, self.regs.pc);
        self.regs.pc = interrupt.vector();
        self.tick(bus);
    }

    fn fail(&mut self, err: EmuError) -> EmuError {
        error!("{err}; CPU stopped ({})", self.debug_state());
        self.state = RunState::Stopped;
        self.fault = Some(err.clone());
        err
    }

    /// Run one instruction, one interrupt dispatch, or one idle M-cycle while
    /// halted or stopped. Returns the T-cycles spent.
    ///
    /// Interrupts are checked at the boundary between steps: one made
    /// pending by an instruction is dispatched as the whole of the next
    /// step, before any further opcode is fetched.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u32> {
        if let Some(err) = &self.fault {
            return Err(err.clone());
        }
        let start = self.cycles;
        bus.poll_input();

        match self.state {
            RunState::Running => {}
            RunState::Halted => {
                self.tick(bus);
                if bus.pending_interrupts() != 0 {
                    self.state = RunState::Running;
                }
                return Ok((self.cycles - start) as u32);
            }
            RunState::Stopped => {
                if !bus.any_button_pressed() {
                    self.tick(bus);
                    return Ok((self.cycles - start) as u32);
                }
                self.state = RunState::Running;
            }
        }

        let pending = bus.pending_interrupts();
        if self.ime && pending != 0 {
            self.dispatch_interrupt(bus, pending);
            return Ok((self.cycles - start) as u32);
        }

        let enable_after = self.ei_pending;
        let pc = self.regs.pc;
        let opcode = self.fetch8(bus);
        trace!("{pc:04X}: {opcode:02X}  {}", self.debug_state());
        self.execute(bus, opcode, pc)?;

        if enable_after && self.ei_pending {
            self.ime = true;
            self.ei_pending = false;
        }
        Ok((self.cycles - start) as u32)
    }

    fn execute<B: Bus>(&mut self, bus: &mut B, opcode: u8, pc: u16) -> Result<()> {
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = y >> 1;

        match opcode {
            0x00 => {}
            0x10 => {
                // STOP is followed by a padding byte.
                self.regs.pc = self.regs.pc.wrapping_add(1);
                bus.reset_div();
                self.state = RunState::Stopped;
            }
            0x76 => self.halt(bus),
            0x40..=0x7F => {
                let val = self.read_r8(bus, z);
                self.write_r8(bus, y, val);
            }
            0x80..=0xBF => {
                let val = self.read_r8(bus, z);
                self.alu_op(y, val);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let val = self.fetch8(bus);
                self.alu_op(y, val);
            }

            0x01 | 0x11 | 0x21 | 0x31 => {
                let val = self.fetch16(bus);
                self.set_r16(p, val);
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let (res, flags) = alu::add16(self.regs.hl(), self.r16(p), self.regs.f());
                self.regs.set_hl(res);
                self.regs.set_f(flags);
                self.tick(bus);
            }
            0x02 | 0x12 | 0x22 | 0x32 => {
                let addr = self.indirect_addr(p);
                self.write8(bus, addr, self.regs.a());
            }
            0x0A | 0x1A | 0x2A | 0x3A => {
                let addr = self.indirect_addr(p);
                let val = self.read8(bus, addr);
                self.regs.set_a(val);
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                self.set_r16(p, self.r16(p).wrapping_add(1));
                self.tick(bus);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                self.set_r16(p, self.r16(p).wrapping_sub(1));
                self.tick(bus);
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let val = self.read_r8(bus, y);
                let (res, flags) = alu::inc(val, self.regs.f());
                self.write_r8(bus, y, res);
                self.regs.set_f(flags);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let val = self.read_r8(bus, y);
                let (res, flags) = alu::dec(val, self.regs.f());
                self.write_r8(bus, y, res);
                self.regs.set_f(flags);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let val = self.fetch8(bus);
                self.write_r8(bus, y, val);
            }

            // Accumulator rotates always clear Z.
            0x07 | 0x0F | 0x17 | 0x1F => {
                let a = self.regs.a();
                let f = self.regs.f();
                let (res, flags) = match y {
                    0 => alu::rlc(a),
                    1 => alu::rrc(a),
                    2 => alu::rl(a, f),
                    _ => alu::rr(a, f),
                };
                self.regs.set_a(res);
                self.regs.set_f(flags & FLAG_C);
            }
            0x27 => {
                let (res, flags) = alu::daa(self.regs.a(), self.regs.f());
                self.regs.set_a(res);
                self.regs.set_f(flags);
            }
            0x2F => {
                let (res, flags) = alu::cpl(self.regs.a(), self.regs.f());
                self.regs.set_a(res);
                self.regs.set_f(flags);
            }
            0x37 => self.regs.set_f(alu::scf(self.regs.f())),
            0x3F => self.regs.set_f(alu::ccf(self.regs.f())),

            0x08 => {
                let addr = self.fetch16(bus);
                let sp = self.regs.sp;
                self.write8(bus, addr, sp as u8);
                self.write8(bus, addr.wrapping_add(1), (sp >> 8) as u8);
            }
            0x18 => {
                let offset = self.fetch8(bus) as i8;
                self.tick(bus);
                self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let offset = self.fetch8(bus) as i8;
                if self.condition(y - 4) {
                    self.tick(bus);
                    self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                }
            }

            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                self.tick(bus);
                if self.condition(y) {
                    self.regs.pc = self.pop16(bus);
                    self.tick(bus);
                }
            }
            0xC9 | 0xD9 => {
                self.regs.pc = self.pop16(bus);
                self.tick(bus);
                if opcode == 0xD9 {
                    self.ime = true;
                }
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let val = self.pop16(bus);
                match p {
                    0 => self.regs.set_bc(val),
                    1 => self.regs.set_de(val),
                    2 => self.regs.set_hl(val),
                    _ => self.regs.set_af(val),
                }
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let val = match p {
                    0 => self.regs.bc(),
                    1 => self.regs.de(),
                    2 => self.regs.hl(),
                    _ => self.regs.af(),
                };
                self.tick(bus);
                self.push16(bus, val);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xC3 => {
                let target = self.fetch16(bus);
                if opcode == 0xC3 || self.condition(y) {
                    self.tick(bus);
                    self.regs.pc = target;
                }
            }
            0xE9 => self.regs.pc = self.regs.hl(),
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xCD => {
                let target = self.fetch16(bus);
                if opcode == 0xCD || self.condition(y) {
                    self.tick(bus);
                    self.push16(bus, self.regs.pc);
                    self.regs.pc = target;
                }
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.tick(bus);
                self.push16(bus, self.regs.pc);
                self.regs.pc = (y as u16) * 8;
            }

            0xE0 => {
                let offset = self.fetch8(bus);
                self.write8(bus, 0xFF00 | offset as u16, self.regs.a());
            }
            0xF0 => {
                let offset = self.fetch8(bus);
                let val = self.read8(bus, 0xFF00 | offset as u16);
                self.regs.set_a(val);
            }
            0xE2 => self.write8(bus, 0xFF00 | self.regs.c() as u16, self.regs.a()),
            0xF2 => {
                let val = self.read8(bus, 0xFF00 | self.regs.c() as u16);
                self.regs.set_a(val);
            }
            0xEA => {
                let addr = self.fetch16(bus);
                self.write8(bus, addr, self.regs.a());
            }
            0xFA => {
                let addr = self.fetch16(bus);
                let val = self.read8(bus, addr);
                self.regs.set_a(val);
            }
            0xE8 => {
                let offset = self.fetch8(bus);
                let (res, flags) = alu::add_sp(self.regs.sp, offset);
                self.tick(bus);
                self.tick(bus);
                self.regs.sp = res;
                self.regs.set_f(flags);
            }
            0xF8 => {
                let offset = self.fetch8(bus);
                let (res, flags) = alu::add_sp(self.regs.sp, offset);
                self.tick(bus);
                self.regs.set_hl(res);
                self.regs.set_f(flags);
            }
            0xF9 => {
                self.regs.sp = self.regs.hl();
                self.tick(bus);
            }
            0xF3 => {
                self.ime = false;
                self.ei_pending = false;
            }
            0xFB => self.ei_pending = true,
            0xCB => {
                let cb = self.fetch8(bus);
                self.execute_cb(bus, cb);
            }

            _ => {
                debug_assert!(ILLEGAL_OPCODES.contains(&opcode));
                return Err(self.fail(EmuError::IllegalOpcode { opcode, pc }));
            }
        }
        Ok(())
    }

    /// (BC) (DE) (HL+) (HL-).
    fn indirect_addr(&mut self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            _ => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn halt<B: Bus>(&mut self, bus: &mut B) {
        let pending = bus.pending_interrupts() != 0;
        if self.ime || !pending {
            self.state = RunState::Halted;
        } else if self.ei_pending {
            // EI; HALT with an interrupt waiting: the handler returns to
            // the HALT, which then executes normally.
            self.regs.pc = self.regs.pc.wrapping_sub(1);
        } else {
            self.halt_bug = true;
        }
    }

    fn execute_cb<B: Bus>(&mut self, bus: &mut B, opcode: u8) {
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let val = self.read_r8(bus, z);
        match opcode >> 6 {
            0 => {
                let f = self.regs.f();
                let (res, flags) = match y {
                    0 => alu::rlc(val),
                    1 => alu::rrc(val),
                    2 => alu::rl(val, f),
                    3 => alu::rr(val, f),
                    4 => alu::sla(val),
                    5 => alu::sra(val),
                    6 => alu::swap(val),
                    _ => alu::srl(val),
                };
                self.write_r8(bus, z, res);
                self.regs.set_f(flags);
            }
            1 => self.regs.set_f(alu::test_bit(y, val, self.regs.f())),
            2 => self.write_r8(bus, z, val & !(1 << y)),
            _ => self.write_r8(bus, z, val | (1 << y)),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
