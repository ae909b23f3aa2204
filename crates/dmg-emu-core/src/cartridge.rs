use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::info;

use crate::error::Result;
use crate::header::{Header, MbcKind};
use crate::memory::BankedMemory;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;
const MBC2_RAM_MASK: usize = 0x01FF;
const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Wall-clock source for the MBC3 real-time clock.
pub trait Clock: Send + std::fmt::Debug {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let by = by.as_nanos().min(u64::MAX as u128) as u64;
        self.nanos.fetch_add(by, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    /// 9-bit day counter.
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control(&self) -> u8 {
        let mut out = (self.days >> 8) as u8 & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Mbc3Rtc {
    regs: RtcRegisters,
    latched: RtcRegisters,
    last_sync: SystemTime,
    subsecond_nanos: u32,
}

impl Mbc3Rtc {
    fn new(now: SystemTime) -> Self {
        Self {
            regs: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            last_sync: now,
            subsecond_nanos: 0,
        }
    }

    /// Fold the wall time elapsed since the last sync into the counters.
    fn sync(&mut self, now: SystemTime) {
        let elapsed = now.duration_since(self.last_sync).unwrap_or_default();
        self.last_sync = now;
        if self.regs.halt {
            return;
        }
        let total = self.subsecond_nanos as u128 + elapsed.as_nanos();
        self.subsecond_nanos = (total % NANOS_PER_SECOND) as u32;
        let seconds = total / NANOS_PER_SECOND;
        self.advance_seconds(seconds.min(u64::MAX as u128) as u64);
    }

    fn latch(&mut self, now: SystemTime) {
        self.sync(now);
        self.latched = self.regs;
    }

    fn read_latched(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds,
            0x09 => self.latched.minutes,
            0x0A => self.latched.hours,
            0x0B => self.latched.days as u8,
            0x0C => self.latched.control(),
            _ => 0xFF,
        }
    }

    fn write_register(&mut self, reg: u8, value: u8, now: SystemTime) {
        self.sync(now);
        match reg {
            0x08 => {
                self.regs.seconds = value & 0x3F;
                self.subsecond_nanos = 0;
            }
            0x09 => self.regs.minutes = value & 0x3F,
            0x0A => self.regs.hours = value & 0x1F,
            0x0B => self.regs.days = (self.regs.days & 0x0100) | value as u16,
            0x0C => {
                self.regs.days = (self.regs.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.regs.halt = value & 0x40 != 0;
                self.regs.carry = value & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            let until_minute = self.seconds_until_minute_tick();
            if seconds < until_minute {
                self.regs.seconds = ((self.regs.seconds as u64 + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute;
            self.regs.seconds = 0;
            self.minute_tick();
        }
    }

    /// Out-of-range values count up to 63 and wrap to 0 without carrying.
    fn seconds_until_minute_tick(&self) -> u64 {
        let sec = self.regs.seconds as u64;
        if sec <= 59 { 60 - sec } else { 64 - sec + 60 }
    }

    fn minute_tick(&mut self) {
        if self.regs.minutes == 59 {
            self.regs.minutes = 0;
            self.hour_tick();
        } else {
            self.regs.minutes = (self.regs.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.regs.hours == 23 {
            self.regs.hours = 0;
            self.day_tick();
        } else {
            self.regs.hours = (self.regs.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        if self.regs.days >= 0x01FF {
            self.regs.days = 0;
            self.regs.carry = true;
        } else {
            self.regs.days += 1;
        }
    }
}

#[derive(Debug, Clone)]
enum MbcState {
    NoMbc,
    Mbc1 {
        ram_enable: bool,
        /// Low five bits, never zero.
        rom_bank: u8,
        upper: u8,
        advanced_mode: bool,
    },
    Mbc2 {
        ram_enable: bool,
        rom_bank: u8,
    },
    Mbc3 {
        ram_enable: bool,
        rom_bank: u8,
        /// 0x00-0x03 selects a RAM bank, 0x08-0x0C an RTC register.
        ram_select: u8,
        latch_armed: bool,
        rtc: Option<Mbc3Rtc>,
    },
    Mbc5 {
        ram_enable: bool,
        rom_bank: u16,
        ram_bank: u8,
        rumble: bool,
        motor: bool,
    },
}

/// Cartridge image plus its bank controller.
#[derive(Debug)]
pub struct Cartridge {
    header: Header,
    rom: BankedMemory,
    ram: BankedMemory,
    mbc: MbcState,
    clock: Box<dyn Clock>,
}

impl Cartridge {
    pub fn from_bytes(rom: Vec<u8>) -> Result<Self> {
        Self::with_clock(rom, Box::new(SystemClock))
    }

    pub fn with_clock(rom: Vec<u8>, clock: Box<dyn Clock>) -> Result<Self> {
        let header = Header::parse(&rom)?;
        let kind = header.cart_type;
        let ram_size = if kind.ram { header.ram_size } else { 0 };

        let mbc = match kind.mbc {
            MbcKind::NoMbc => MbcState::NoMbc,
            MbcKind::Mbc1 => MbcState::Mbc1 {
                ram_enable: false,
                rom_bank: 1,
                upper: 0,
                advanced_mode: false,
            },
            MbcKind::Mbc2 => MbcState::Mbc2 {
                ram_enable: false,
                rom_bank: 1,
            },
            MbcKind::Mbc3 => MbcState::Mbc3 {
                ram_enable: false,
                rom_bank: 1,
                ram_select: 0,
                latch_armed: false,
                rtc: kind.rtc.then(|| Mbc3Rtc::new(clock.now())),
            },
            MbcKind::Mbc5 => MbcState::Mbc5 {
                ram_enable: false,
                rom_bank: 1,
                ram_bank: 0,
                rumble: kind.rumble,
                motor: false,
            },
        };

        info!(
            "loaded cartridge \"{}\": {:?}, {} KiB ROM, {} KiB RAM{}{}",
            header.title,
            kind.mbc,
            header.rom_size / 1024,
            ram_size / 1024,
            if kind.battery { ", battery" } else { "" },
            if kind.rtc { ", RTC" } else { "" },
        );

        Ok(Self {
            header,
            rom: BankedMemory::new(rom),
            ram: BankedMemory::zeroed(ram_size),
            mbc,
            clock,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn has_battery(&self) -> bool {
        self.header.cart_type.battery
    }

    /// External RAM contents, for persisting battery-backed saves.
    pub fn ram(&self) -> &[u8] {
        self.ram.as_slice()
    }

    pub fn load_ram(&mut self, data: &[u8]) {
        self.ram.load(data);
    }

    /// True while an MBC5 rumble cartridge has its motor bit set.
    pub fn rumble_active(&self) -> bool {
        matches!(self.mbc, MbcState::Mbc5 { motor: true, .. })
    }

    /// Current switchable ROM bank, as mapped at 0x4000-0x7FFF.
    pub fn rom_bank(&self) -> usize {
        let bank = match self.mbc {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 {
                rom_bank, upper, ..
            } => ((upper as usize) << 5) | rom_bank as usize,
            MbcState::Mbc2 { rom_bank, .. } | MbcState::Mbc3 { rom_bank, .. } => rom_bank as usize,
            MbcState::Mbc5 { rom_bank, .. } => rom_bank as usize,
        };
        bank % self.rom_bank_count()
    }

    fn rom_bank_count(&self) -> usize {
        self.rom.len().div_ceil(ROM_BANK_SIZE).max(1)
    }

    fn fixed_rom_bank(&self) -> usize {
        match self.mbc {
            MbcState::Mbc1 {
                upper,
                advanced_mode: true,
                ..
            } => ((upper as usize) << 5) % self.rom_bank_count(),
            _ => 0,
        }
    }

    /// 0x0000-0x7FFF.
    pub fn read_rom(&self, addr: u16) -> u8 {
        let addr = addr as usize & 0x7FFF;
        let bank = if addr < ROM_BANK_SIZE {
            self.fixed_rom_bank()
        } else {
            self.rom_bank()
        };
        self.rom.read(bank * ROM_BANK_SIZE + (addr & (ROM_BANK_SIZE - 1)))
    }

    /// Bank-control writes into 0x0000-0x7FFF.
    pub fn write_rom(&mut self, addr: u16, val: u8) {
        let now = self.clock.now();
        match &mut self.mbc {
            MbcState::NoMbc => {}
            MbcState::Mbc1 {
                ram_enable,
                rom_bank,
                upper,
                advanced_mode,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => *rom_bank = (val & 0x1F).max(1),
                0x4000..=0x5FFF => *upper = val & 0x03,
                _ => *advanced_mode = val & 0x01 != 0,
            },
            MbcState::Mbc2 {
                ram_enable,
                rom_bank,
            } => {
                if addr < 0x4000 {
                    if addr & 0x0100 == 0 {
                        *ram_enable = val & 0x0F == 0x0A;
                    } else {
                        *rom_bank = (val & 0x0F).max(1);
                    }
                }
            }
            MbcState::Mbc3 {
                ram_enable,
                rom_bank,
                ram_select,
                latch_armed,
                rtc,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => *rom_bank = (val & 0x7F).max(1),
                0x4000..=0x5FFF => *ram_select = val & 0x0F,
                _ => {
                    if *latch_armed && val == 0x01 {
                        if let Some(rtc) = rtc {
                            rtc.latch(now);
                        }
                    }
                    *latch_armed = val == 0x00;
                }
            },
            MbcState::Mbc5 {
                ram_enable,
                rom_bank,
                ram_bank,
                rumble,
                motor,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x100) | val as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8),
                0x4000..=0x5FFF => {
                    if *rumble {
                        *ram_bank = val & 0x07;
                        *motor = val & 0x08 != 0;
                    } else {
                        *ram_bank = val & 0x0F;
                    }
                }
                _ => {}
            },
        }
    }

    /// 0xA000-0xBFFF.
    pub fn read_ram(&self, addr: u16) -> u8 {
        let offset = addr as usize & (RAM_BANK_SIZE - 1);
        match &self.mbc {
            MbcState::NoMbc => self.ram.read(offset),
            MbcState::Mbc1 {
                ram_enable,
                upper,
                advanced_mode,
                ..
            } => {
                if !ram_enable {
                    return 0xFF;
                }
                let bank = if *advanced_mode { *upper as usize } else { 0 };
                self.ram.read(bank * RAM_BANK_SIZE + offset)
            }
            MbcState::Mbc2 { ram_enable, .. } => {
                if !ram_enable {
                    return 0xFF;
                }
                0xF0 | (self.ram.read(offset & MBC2_RAM_MASK) & 0x0F)
            }
            MbcState::Mbc3 {
                ram_enable,
                ram_select,
                rtc,
                ..
            } => {
                if !ram_enable {
                    return 0xFF;
                }
                match *ram_select {
                    0x00..=0x03 => self
                        .ram
                        .read(*ram_select as usize * RAM_BANK_SIZE + offset),
                    0x08..=0x0C => rtc
                        .as_ref()
                        .map_or(0xFF, |rtc| rtc.read_latched(*ram_select)),
                    _ => 0xFF,
                }
            }
            MbcState::Mbc5 {
                ram_enable,
                ram_bank,
                ..
            } => {
                if !ram_enable {
                    return 0xFF;
                }
                self.ram.read(*ram_bank as usize * RAM_BANK_SIZE + offset)
            }
        }
    }

    pub fn write_ram(&mut self, addr: u16, val: u8) {
        let offset = addr as usize & (RAM_BANK_SIZE - 1);
        let now = self.clock.now();
        match &mut self.mbc {
            MbcState::NoMbc => self.ram.write(offset, val),
            MbcState::Mbc1 {
                ram_enable: true,
                upper,
                advanced_mode,
                ..
            } => {
                let bank = if *advanced_mode { *upper as usize } else { 0 };
                self.ram.write(bank * RAM_BANK_SIZE + offset, val);
            }
            MbcState::Mbc2 {
                ram_enable: true, ..
            } => self.ram.write(offset & MBC2_RAM_MASK, val & 0x0F),
            MbcState::Mbc3 {
                ram_enable: true,
                ram_select,
                rtc,
                ..
            } => match *ram_select {
                0x00..=0x03 => self
                    .ram
                    .write(*ram_select as usize * RAM_BANK_SIZE + offset, val),
                reg @ 0x08..=0x0C => {
                    if let Some(rtc) = rtc {
                        rtc.write_register(reg, val, now);
                    }
                }
                _ => {}
            },
            MbcState::Mbc5 {
                ram_enable: true,
                ram_bank,
                ..
            } => self
                .ram
                .write(*ram_bank as usize * RAM_BANK_SIZE + offset, val),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_ticks_through_invalid_values() {
        let mut rtc = Mbc3Rtc::new(UNIX_EPOCH);

        rtc.regs.seconds = 59;
        rtc.regs.minutes = 60;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.seconds, 0);
        assert_eq!(rtc.regs.minutes, 61);

        rtc.regs.seconds = 63;
        rtc.regs.minutes = 5;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.seconds, 0);
        assert_eq!(rtc.regs.minutes, 5);

        rtc.regs.seconds = 59;
        rtc.regs.minutes = 59;
        rtc.regs.hours = 24;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.minutes, 0);
        assert_eq!(rtc.regs.hours, 25);
    }

    #[test]
    fn rtc_sync_keeps_subsecond_phase() {
        let start = UNIX_EPOCH;
        let mut rtc = Mbc3Rtc::new(start);
        rtc.sync(start + Duration::from_millis(700));
        assert_eq!(rtc.regs.seconds, 0);
        rtc.sync(start + Duration::from_millis(1400));
        assert_eq!(rtc.regs.seconds, 1);
        assert_eq!(rtc.subsecond_nanos, 400_000_000);
    }

    #[test]
    fn rtc_halt_freezes_time() {
        let start = UNIX_EPOCH;
        let mut rtc = Mbc3Rtc::new(start);
        rtc.write_register(0x0C, 0x40, start);
        rtc.sync(start + Duration::from_secs(30));
        assert_eq!(rtc.regs.seconds, 0);

        rtc.write_register(0x0C, 0x00, start + Duration::from_secs(30));
        rtc.sync(start + Duration::from_secs(35));
        assert_eq!(rtc.regs.seconds, 5);
    }

    #[test]
    fn rtc_seconds_write_resets_phase() {
        let start = UNIX_EPOCH;
        let mut rtc = Mbc3Rtc::new(start);
        rtc.sync(start + Duration::from_millis(750));

        rtc.write_register(0x09, 0x01, start + Duration::from_millis(760));
        assert_eq!(rtc.subsecond_nanos, 760_000_000);

        rtc.write_register(0x08, 0x02, start + Duration::from_millis(760));
        assert_eq!(rtc.subsecond_nanos, 0);
    }

    #[test]
    fn rtc_day_counter_sets_high_bit_then_carry() {
        let mut rtc = Mbc3Rtc::new(UNIX_EPOCH);
        rtc.regs.days = 0x00FF;
        rtc.regs.hours = 23;
        rtc.regs.minutes = 59;
        rtc.regs.seconds = 59;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.days, 0x0100);
        assert_eq!(rtc.regs.control() & 0x01, 0x01);
        assert!(!rtc.regs.carry);

        rtc.regs.days = 0x01FF;
        rtc.regs.hours = 23;
        rtc.regs.minutes = 59;
        rtc.regs.seconds = 59;
        rtc.advance_seconds(1);
        assert_eq!(rtc.regs.days, 0);
        assert_eq!(rtc.regs.control() & 0x81, 0x80);
    }
}
