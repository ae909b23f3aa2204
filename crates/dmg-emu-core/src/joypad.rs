use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::interrupts::{Interrupt, InterruptController};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Button {
    pub const ALL: [Button; 8] = [
        Button::Right,
        Button::Left,
        Button::Up,
        Button::Down,
        Button::A,
        Button::B,
        Button::Select,
        Button::Start,
    ];

    /// Bit in the internal pressed mask: d-pad in the low nibble, action
    /// buttons in the high nibble, each in P1 line order.
    #[inline]
    fn mask(self) -> u8 {
        match self {
            Button::Right => 0x01,
            Button::Left => 0x02,
            Button::Up => 0x04,
            Button::Down => 0x08,
            Button::A => 0x10,
            Button::B => 0x20,
            Button::Select => 0x40,
            Button::Start => 0x80,
        }
    }
}

/// Source of button state, queried once per CPU step.
pub trait InputProvider: Send {
    fn is_button_pressed(&self, button: Button) -> bool;
}

/// Provider with every button released.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputProvider for NoInput {
    fn is_button_pressed(&self, _button: Button) -> bool {
        false
    }
}

/// Button state shared between a frontend thread and the emulator.
#[derive(Debug, Default, Clone)]
pub struct SharedButtons {
    state: Arc<AtomicU8>,
}

impl SharedButtons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, button: Button, pressed: bool) {
        if pressed {
            self.state.fetch_or(button.mask(), Ordering::Relaxed);
        } else {
            self.state.fetch_and(!button.mask(), Ordering::Relaxed);
        }
    }

    pub fn press(&self, button: Button) {
        self.set(button, true);
    }

    pub fn release(&self, button: Button) {
        self.set(button, false);
    }
}

impl InputProvider for SharedButtons {
    fn is_button_pressed(&self, button: Button) -> bool {
        self.state.load(Ordering::Relaxed) & button.mask() != 0
    }
}

/// P1/JOYP register (0xFF00).
#[derive(Debug, Clone)]
pub struct Joypad {
    /// Bits 4-5 as last written; a 0 bit selects that button group.
    select: u8,
    pressed: u8,
    /// Low-active input lines seen at the last update.
    lines: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            pressed: 0,
            lines: 0x0F,
        }
    }

    /// Sample `input` and raise the joypad interrupt on any high-to-low
    /// transition of a selected line.
    pub fn poll(&mut self, input: &dyn InputProvider, ints: &mut InterruptController) {
        self.pressed = Button::ALL
            .into_iter()
            .filter(|&b| input.is_button_pressed(b))
            .fold(0, |acc, b| acc | b.mask());
        self.update_lines(ints);
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.lines
    }

    pub fn write(&mut self, val: u8, ints: &mut InterruptController) {
        self.select = val & 0x30;
        self.update_lines(ints);
    }

    pub fn any_pressed(&self) -> bool {
        self.pressed != 0
    }

    fn update_lines(&mut self, ints: &mut InterruptController) {
        let mut active = 0u8;
        if self.select & 0x10 == 0 {
            active |= self.pressed & 0x0F;
        }
        if self.select & 0x20 == 0 {
            active |= self.pressed >> 4;
        }
        let lines = !active & 0x0F;
        if self.lines & !lines != 0 {
            ints.request(Interrupt::Joypad);
        }
        self.lines = lines;
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}
