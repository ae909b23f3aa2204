use log::info;

use crate::{
    bus::Bus,
    cartridge::Cartridge,
    interrupts::{Interrupt, InterruptController},
    joypad::{InputProvider, Joypad, NoInput},
    memory::Memory,
    ppu::Ppu,
    serial::Serial,
    timer::{POST_BOOT_DIVIDER, Timer},
};

const BOOT_ROM_END: u16 = 0x00FF;
const OAM_DMA_LENGTH: u8 = 0xA0;
/// M-cycles between the FF46 write and the first transferred byte,
/// counting the write cycle itself.
const OAM_DMA_DELAY: u8 = 2;

/// OAM DMA engine state.
#[derive(Debug, Default, Clone)]
struct OamDma {
    source: u16,
    delay: u8,
    index: u8,
    active: bool,
}

impl OamDma {
    fn start(&mut self, page: u8) {
        // Pages above 0xDF read from work RAM.
        let page = if page >= 0xE0 { page - 0x20 } else { page };
        self.source = (page as u16) << 8;
        self.delay = OAM_DMA_DELAY;
        self.index = 0;
    }

    /// Transfer or pending start.
    fn busy(&self) -> bool {
        self.active || self.delay > 0
    }
}

/// DMG memory map.
pub struct Mmu {
    wram: Memory<0x2000>,
    hram: Memory<0x80>,
    /// Backing store for I/O registers without a dedicated device.
    io: [u8; 0x80],
    cart: Option<Cartridge>,
    boot_rom: Option<Vec<u8>>,
    boot_mapped: bool,
    pub ints: InterruptController,
    pub timer: Timer,
    pub serial: Serial,
    pub ppu: Ppu,
    pub joypad: Joypad,
    input: Box<dyn InputProvider>,
    dma: OamDma,
}

impl Mmu {
    /// Hardware state as the boot ROM leaves it.
    pub fn new() -> Self {
        let mut mmu = Self::power_on();
        mmu.timer = Timer::with_divider(POST_BOOT_DIVIDER);
        mmu.ppu.apply_boot_state();
        mmu.ints.write_if(0x01);
        mmu.io[0x50] = 0x01;
        mmu
    }

    /// Hardware state at power-on, before any boot ROM has run.
    pub fn power_on() -> Self {
        Self {
            wram: Memory::new(),
            hram: Memory::new(),
            io: [0; 0x80],
            cart: None,
            boot_rom: None,
            boot_mapped: false,
            ints: InterruptController::new(),
            timer: Timer::new(),
            serial: Serial::new(),
            ppu: Ppu::new(),
            joypad: Joypad::new(),
            input: Box::new(NoInput),
            dma: OamDma::default(),
        }
    }

    /// Return every device to power-on state, keeping the cartridge and the
    /// input provider.
    pub fn reset_power_on(&mut self) {
        let cart = self.cart.take();
        let input = std::mem::replace(&mut self.input, Box::new(NoInput));
        *self = Self::power_on();
        self.cart = cart;
        self.input = input;
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn cart(&self) -> Option<&Cartridge> {
        self.cart.as_ref()
    }

    pub fn cart_mut(&mut self) -> Option<&mut Cartridge> {
        self.cart.as_mut()
    }

    /// Overlay `data` on 0x0000-0x00FF until 0xFF50 is written.
    pub fn load_boot_rom(&mut self, data: Vec<u8>) {
        info!("boot ROM mapped ({} bytes)", data.len());
        self.boot_rom = Some(data);
        self.boot_mapped = true;
        self.io[0x50] = 0x00;
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_mapped
    }

    pub fn set_input_provider(&mut self, input: Box<dyn InputProvider>) {
        self.input = input;
    }

    pub fn take_serial(&mut self) -> Vec<u8> {
        self.serial.take_output()
    }

    pub fn peek_serial(&self) -> &[u8] {
        self.serial.output()
    }

    pub fn dma_active(&self) -> bool {
        self.dma.busy()
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=BOOT_ROM_END if self.boot_mapped => self
                .boot_rom
                .as_ref()
                .and_then(|rom| rom.get(addr as usize).copied())
                .unwrap_or(0xFF),
            0x0000..=0x7FFF => self.cart.as_ref().map_or(0xFF, |c| c.read_rom(addr)),
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.read_vram(addr)
                } else {
                    0xFF
                }
            }
            0xA000..=0xBFFF => self.cart.as_ref().map_or(0xFF, |c| c.read_ram(addr)),
            0xC000..=0xFDFF => self.wram.read(addr),
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() && !self.dma.active {
                    self.ppu.read_oam(addr)
                } else {
                    0xFF
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.ints.read_if(),
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF00..=0xFF7F => self.io[(addr & 0x7F) as usize],
            0xFF80..=0xFFFE => self.hram.read(addr),
            0xFFFF => self.ints.read_ie(),
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(cart) = &mut self.cart {
                    cart.write_rom(addr, val);
                }
            }
            0x8000..=0x9FFF => {
                if self.ppu.vram_accessible() {
                    self.ppu.write_vram(addr, val);
                }
            }
            0xA000..=0xBFFF => {
                if let Some(cart) = &mut self.cart {
                    cart.write_ram(addr, val);
                }
            }
            0xC000..=0xFDFF => self.wram.write(addr, val),
            0xFE00..=0xFE9F => {
                if self.ppu.oam_accessible() && !self.dma.active {
                    self.ppu.write_oam(addr, val);
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write(val, &mut self.ints),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.ints.write_if(val),
            0xFF46 => {
                self.ppu.write_reg(addr, val);
                self.dma.start(val);
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            0xFF50 => {
                if self.boot_mapped {
                    info!("boot ROM unmapped");
                }
                self.boot_mapped = false;
                self.io[0x50] = val;
            }
            0xFF00..=0xFF7F => self.io[(addr & 0x7F) as usize] = val,
            0xFF80..=0xFFFE => self.hram.write(addr, val),
            0xFFFF => self.ints.write_ie(val),
        }
    }

    /// Source-side read for OAM DMA, ignoring PPU access restrictions.
    fn dma_read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xFE00..=0xFFFF => 0xFF,
            _ => self.read_byte(addr),
        }
    }

    fn dma_step(&mut self) {
        if self.dma.delay > 0 {
            self.dma.delay -= 1;
            if self.dma.delay == 0 {
                self.dma.active = true;
            }
            return;
        }
        if !self.dma.active {
            return;
        }
        let index = self.dma.index;
        let byte = self.dma_read_byte(self.dma.source + index as u16);
        self.ppu.write_oam(index as u16, byte);
        self.dma.index += 1;
        if self.dma.index == OAM_DMA_LENGTH {
            self.dma.active = false;
        }
    }

    /// Advance timer, serial port, PPU and OAM DMA by one M-cycle.
    pub fn tick(&mut self) {
        self.timer.step(4, &mut self.ints);
        self.serial.step(4, &mut self.ints);
        self.ppu.step(4, &mut self.ints);
        self.dma_step();
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for Mmu {
    fn read(&mut self, addr: u16) -> u8 {
        self.read_byte(addr)
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.write_byte(addr, val);
    }

    fn tick_mcycle(&mut self) {
        self.tick();
    }

    fn pending_interrupts(&self) -> u8 {
        self.ints.pending()
    }

    fn acknowledge_interrupt(&mut self, interrupt: Interrupt) {
        self.ints.clear(interrupt);
    }

    fn poll_input(&mut self) {
        self.joypad.poll(self.input.as_ref(), &mut self.ints);
    }

    fn any_button_pressed(&self) -> bool {
        self.joypad.any_pressed()
    }

    fn reset_div(&mut self) {
        self.timer.reset_div();
    }
}
