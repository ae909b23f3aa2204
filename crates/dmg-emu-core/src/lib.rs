//! Original Game Boy (DMG) emulation core.
//!
//! The CPU advances the rest of the machine one M-cycle at a time through the
//! [`bus::Bus`] trait. Frontends drive everything through the [`gameboy`]
//! facade and receive finished frames over a [`frame_exchange`] triple buffer.

/// Pure SM83 arithmetic and bit operations.
pub mod alu;

/// The CPU's view of memory and peripherals.
pub mod bus;

/// Cartridge mappers (MBC1/2/3/5) and the MBC3 real-time clock.
pub mod cartridge;

/// SM83 CPU core.
pub mod cpu;

/// Error type shared across the crate.
pub mod error;

/// Lock-free handoff of finished frames to a display thread.
pub mod frame_exchange;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Cartridge header parsing.
pub mod header;

/// Interrupt sources and the IE/IF registers.
pub mod interrupts;

/// Joypad register, button state and input providers.
pub mod joypad;

/// Fixed and banked byte stores.
pub mod memory;

/// Memory map, I/O decode and OAM DMA.
pub mod mmu;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// CPU register file.
pub mod registers;

/// Serial port, captured to a byte buffer.
pub mod serial;

/// Debug snapshots of CPU and LCD state.
pub mod snapshot;

/// Divider/timer unit.
pub mod timer;

pub use error::{EmuError, Result};
pub use gameboy::{GameBoy, RunConfig};
