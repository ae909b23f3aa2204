use crate::interrupts::{Interrupt, InterruptController};
use crate::memory::Memory;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;
/// Bytes in one RGBA frame.
pub const FRAME_BYTES: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 4;

// Mode lengths in T-cycles.
const MODE0_CYCLES: u16 = 204; // HBlank
const MODE1_CYCLES: u16 = 456; // One line during VBlank
const MODE2_CYCLES: u16 = 80; // OAM scan
const MODE3_CYCLES: u16 = 172; // Pixel transfer

const VBLANK_LINES: u8 = 10;
const LAST_LINE: u8 = SCREEN_HEIGHT as u8 + VBLANK_LINES - 1;

const MAX_SPRITES_PER_LINE: usize = 10;
const TOTAL_SPRITES: usize = 40;
const OAM_SIZE: usize = 0xA0;

const WINDOW_X_MAX: u8 = 166;

const BG_MAP_0_BASE: u16 = 0x1800;
const BG_MAP_1_BASE: u16 = 0x1C00;
const SIGNED_TILE_BASE: i32 = 0x1000;

const LCDC_BG_ENABLE: u8 = 0x01;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_OBJ_TALL: u8 = 0x04;
const LCDC_BG_MAP: u8 = 0x08;
const LCDC_TILE_DATA: u8 = 0x10;
const LCDC_WINDOW_ENABLE: u8 = 0x20;
const LCDC_WINDOW_MAP: u8 = 0x40;
const LCDC_LCD_ENABLE: u8 = 0x80;

const MODE_HBLANK: u8 = 0;
const MODE_VBLANK: u8 = 1;
const MODE_OAM: u8 = 2;
const MODE_TRANSFER: u8 = 3;

/// Grayscale RGB value for each of the four DMG shades.
const DMG_SHADES: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

#[derive(Copy, Clone, Default, Debug)]
struct Sprite {
    x: i16,
    y: i16,
    tile: u8,
    flags: u8,
    oam_index: usize,
}

/// Scanline-based DMG picture processor.
///
/// Driven by T-cycles from the bus. Each line is rendered in one go when
/// pixel transfer ends, into a 160x144 RGBA framebuffer.
#[derive(Debug)]
pub struct Ppu {
    vram: Memory<0x2000>,
    oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    lyc_eq_ly: bool,
    dma: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    /// Internal window line counter
    win_line_counter: u8,

    mode_clock: u16,
    mode: u8,

    framebuffer: Vec<u8>,
    /// Latched sprites for the current scanline
    line_sprites: [Sprite; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    frame_ready: bool,
    stat_irq_line: bool,
    mode2_vblank_irq_pending: bool,
    frames: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            vram: Memory::new(),
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            lyc_eq_ly: false,
            dma: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            win_line_counter: 0,
            mode_clock: 0,
            mode: MODE_HBLANK,
            framebuffer: vec![0xFF; FRAME_BYTES],
            line_sprites: [Sprite::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            frame_ready: false,
            stat_irq_line: false,
            mode2_vblank_irq_pending: false,
            frames: 0,
        }
    }

    /// Register state left behind by the DMG boot ROM.
    pub fn apply_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.dma = 0xFF;
        self.bgp = 0xFC;
        self.stat = 0x00;
        self.ly = 0;
        self.mode = MODE_OAM;
        self.mode_clock = 0;
        self.win_line_counter = 0;
        self.lyc_eq_ly = self.ly == self.lyc;
        self.stat_irq_line = false;
        self.mode2_vblank_irq_pending = false;
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_LCD_ENABLE != 0
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcdc(&self) -> u8 {
        self.lcdc
    }

    pub fn stat(&self) -> u8 {
        self.read_reg(0xFF41)
    }

    pub fn window_line_counter(&self) -> u8 {
        self.win_line_counter
    }

    /// Frames completed since power-on.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// RGBA pixels, row-major, `FRAME_BYTES` long.
    pub fn framebuffer(&self) -> &[u8] {
        &self.framebuffer
    }

    /// Returns true once per completed frame.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    /// CPU access to VRAM is cut off during pixel transfer.
    pub fn vram_accessible(&self) -> bool {
        !self.lcd_enabled() || self.mode != MODE_TRANSFER
    }

    /// CPU access to OAM is cut off during OAM scan and pixel transfer.
    pub fn oam_accessible(&self) -> bool {
        !self.lcd_enabled() || matches!(self.mode, MODE_HBLANK | MODE_VBLANK)
    }

    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram.read(addr)
    }

    pub fn write_vram(&mut self, addr: u16, val: u8) {
        self.vram.write(addr, val);
    }

    /// `addr` may be absolute (0xFE00-0xFE9F) or a 0-based OAM index.
    pub fn read_oam(&self, addr: u16) -> u8 {
        self.oam
            .get(addr as usize & 0xFF)
            .copied()
            .unwrap_or(0xFF)
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        if let Some(slot) = self.oam.get_mut(addr as usize & 0xFF) {
            *slot = val;
        }
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let mode = if self.lcd_enabled() { self.mode } else { 0 };
                (self.stat & 0x78) | 0x80 | mode | if self.lyc_eq_ly { 0x04 } else { 0 }
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF46 => self.dma,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.lcdc = val;
                if was_on && !self.lcd_enabled() {
                    self.mode = MODE_HBLANK;
                    self.mode_clock = 0;
                    self.win_line_counter = 0;
                    self.ly = 0;
                    self.stat_irq_line = false;
                } else if !was_on && self.lcd_enabled() {
                    self.mode = MODE_OAM;
                    self.mode_clock = 0;
                    self.update_lyc_compare();
                }
            }
            0xFF41 => self.stat = (self.stat & 0x07) | (val & 0x78),
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            // LY is read-only.
            0xFF44 => {}
            0xFF45 => {
                self.lyc = val;
                self.update_lyc_compare();
            }
            0xFF46 => self.dma = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    /// Advance by `cycles` T-cycles. Requests VBlank/STAT interrupts and
    /// flags a finished frame on VBlank entry.
    pub fn step(&mut self, cycles: u32, ints: &mut InterruptController) {
        let mut remaining = cycles;
        while remaining > 0 {
            let increment = remaining.min(4);
            remaining -= increment;
            if !self.lcd_enabled() {
                continue;
            }

            self.mode_clock += increment as u16;

            match self.mode {
                MODE_HBLANK => {
                    if self.mode_clock >= MODE0_CYCLES {
                        self.mode_clock -= MODE0_CYCLES;
                        self.ly += 1;
                        if self.ly == SCREEN_HEIGHT as u8 {
                            self.mode = MODE_VBLANK;
                            self.frame_ready = true;
                            self.frames = self.frames.wrapping_add(1);
                            self.mode2_vblank_irq_pending = true;
                            ints.request(Interrupt::VBlank);
                        } else {
                            self.mode = MODE_OAM;
                        }
                    }
                }
                MODE_VBLANK => {
                    if self.mode_clock >= MODE1_CYCLES {
                        self.mode_clock -= MODE1_CYCLES;
                        self.ly += 1;
                        if self.ly > LAST_LINE {
                            self.ly = 0;
                            self.win_line_counter = 0;
                            self.mode = MODE_OAM;
                        }
                    }
                }
                MODE_OAM => {
                    if self.mode_clock >= MODE2_CYCLES {
                        self.mode_clock -= MODE2_CYCLES;
                        self.oam_scan();
                        self.mode = MODE_TRANSFER;
                    }
                }
                _ => {
                    if self.mode_clock >= MODE3_CYCLES {
                        self.mode_clock -= MODE3_CYCLES;
                        self.render_scanline();
                        self.mode = MODE_HBLANK;
                    }
                }
            }

            self.update_lyc_compare();
            self.update_stat_irq(ints);
        }
    }

    fn update_lyc_compare(&mut self) {
        if self.lcd_enabled() {
            self.lyc_eq_ly = self.ly == self.lyc;
        }
    }

    /// All STAT sources share one line; only its rising edge interrupts.
    fn update_stat_irq(&mut self, ints: &mut InterruptController) {
        let coincidence = self.lyc_eq_ly && self.stat & 0x40 != 0;
        let mode_signal = match self.mode {
            MODE_HBLANK => self.stat & 0x08 != 0,
            MODE_VBLANK => self.stat & 0x10 != 0,
            MODE_OAM => self.stat & 0x20 != 0,
            _ => false,
        };
        // Entering VBlank also fires the mode 2 source on DMG.
        let glitch = std::mem::take(&mut self.mode2_vblank_irq_pending) && self.stat & 0x20 != 0;
        let current = coincidence || mode_signal || glitch;
        if current && !self.stat_irq_line {
            ints.request(Interrupt::LcdStat);
        }
        self.stat_irq_line = current;
    }

    /// Collect up to 10 sprites on the current line, ordered by drawing
    /// priority: lower X first, then lower OAM index.
    fn oam_scan(&mut self) {
        let height = self.sprite_height();
        let ly = self.ly as i16;
        self.sprite_count = 0;
        for i in 0..TOTAL_SPRITES {
            if self.sprite_count >= MAX_SPRITES_PER_LINE {
                break;
            }
            let base = i * 4;
            let y = self.oam[base] as i16 - 16;
            if ly >= y && ly < y + height {
                self.line_sprites[self.sprite_count] = Sprite {
                    x: self.oam[base + 1] as i16 - 8,
                    y,
                    tile: self.oam[base + 2],
                    flags: self.oam[base + 3],
                    oam_index: i,
                };
                self.sprite_count += 1;
            }
        }
        self.line_sprites[..self.sprite_count].sort_by_key(|s| (s.x, s.oam_index));
    }

    fn sprite_height(&self) -> i16 {
        if self.lcdc & LCDC_OBJ_TALL != 0 { 16 } else { 8 }
    }

    #[inline(always)]
    fn shade(palette: u8, color_id: u8) -> u8 {
        (palette >> (color_id * 2)) & 0x03
    }

    /// VRAM offset of row `row` of a background/window tile.
    fn bg_tile_row(&self, tile_index: u8, row: u16) -> u16 {
        let base = if self.lcdc & LCDC_TILE_DATA != 0 {
            tile_index as u16 * 16
        } else {
            (SIGNED_TILE_BASE + tile_index as i8 as i32 * 16) as u16
        };
        base + row * 2
    }

    fn color_id(&self, row_addr: u16, bit: u8) -> u8 {
        let lo = self.vram.read(row_addr);
        let hi = self.vram.read(row_addr + 1);
        (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
    }

    fn render_scanline(&mut self) {
        let ly = self.ly as usize;
        if ly >= SCREEN_HEIGHT {
            return;
        }

        // With LCDC bit 0 clear the line shows BGP colour 0 and sprites see
        // colour 0 underneath them.
        let mut shades = [Self::shade(self.bgp, 0); SCREEN_WIDTH];
        let mut bg_ids = [0u8; SCREEN_WIDTH];

        if self.lcdc & LCDC_BG_ENABLE != 0 {
            self.render_background(&mut shades, &mut bg_ids);
            if self.lcdc & LCDC_WINDOW_ENABLE != 0 && self.ly >= self.wy && self.wx <= WINDOW_X_MAX
            {
                self.render_window(&mut shades, &mut bg_ids);
                self.win_line_counter = self.win_line_counter.wrapping_add(1);
            }
        }

        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            self.render_sprites(&mut shades, &bg_ids);
        }

        let row = &mut self.framebuffer[ly * SCREEN_WIDTH * 4..(ly + 1) * SCREEN_WIDTH * 4];
        for (px, &shade) in row.chunks_exact_mut(4).zip(shades.iter()) {
            let v = DMG_SHADES[shade as usize];
            px.copy_from_slice(&[v, v, v, 0xFF]);
        }
    }

    fn render_background(&self, shades: &mut [u8; SCREEN_WIDTH], bg_ids: &mut [u8; SCREEN_WIDTH]) {
        let map_base = if self.lcdc & LCDC_BG_MAP != 0 {
            BG_MAP_1_BASE
        } else {
            BG_MAP_0_BASE
        };
        let y = self.ly.wrapping_add(self.scy) as u16;
        for x in 0..SCREEN_WIDTH {
            let px = (x as u8).wrapping_add(self.scx) as u16;
            let tile_index = self.vram.read(map_base + (y / 8) * 32 + px / 8);
            let row = self.bg_tile_row(tile_index, y % 8);
            let color_id = self.color_id(row, 7 - (px % 8) as u8);
            shades[x] = Self::shade(self.bgp, color_id);
            bg_ids[x] = color_id;
        }
    }

    fn render_window(&self, shades: &mut [u8; SCREEN_WIDTH], bg_ids: &mut [u8; SCREEN_WIDTH]) {
        let map_base = if self.lcdc & LCDC_WINDOW_MAP != 0 {
            BG_MAP_1_BASE
        } else {
            BG_MAP_0_BASE
        };
        let start = self.wx as i16 - 7;
        let y = self.win_line_counter as u16;
        for x in start.max(0) as usize..SCREEN_WIDTH {
            let wx = (x as i16 - start) as u16;
            let tile_index = self.vram.read(map_base + (y / 8) * 32 + wx / 8);
            let row = self.bg_tile_row(tile_index, y % 8);
            let color_id = self.color_id(row, 7 - (wx % 8) as u8);
            shades[x] = Self::shade(self.bgp, color_id);
            bg_ids[x] = color_id;
        }
    }

    fn render_sprites(&self, shades: &mut [u8; SCREEN_WIDTH], bg_ids: &[u8; SCREEN_WIDTH]) {
        let height = self.sprite_height();
        // Pixels already claimed by a higher-priority sprite.
        let mut claimed = [false; SCREEN_WIDTH];
        for s in &self.line_sprites[..self.sprite_count] {
            let mut tile = s.tile;
            if height == 16 {
                tile &= 0xFE;
            }
            let mut line = self.ly as i16 - s.y;
            if s.flags & 0x40 != 0 {
                line = height - 1 - line;
            }
            // OBJ size may have changed since the OAM scan picked this sprite.
            let line = (line & (height - 1)) as u16;
            let row = (tile as u16)
                .wrapping_add(line >> 3)
                .wrapping_mul(16)
                .wrapping_add((line & 7) * 2);
            let palette = if s.flags & 0x10 != 0 {
                self.obp1
            } else {
                self.obp0
            };
            for px in 0..8u8 {
                let sx = s.x + px as i16;
                if !(0..SCREEN_WIDTH as i16).contains(&sx) || claimed[sx as usize] {
                    continue;
                }
                let bit = if s.flags & 0x20 != 0 { px } else { 7 - px };
                let color_id = self.color_id(row, bit);
                if color_id == 0 {
                    continue;
                }
                let sx = sx as usize;
                claimed[sx] = true;
                if s.flags & 0x80 != 0 && bg_ids[sx] != 0 {
                    continue;
                }
                shades[sx] = Self::shade(palette, color_id);
            }
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}
