mod common;

use std::time::Duration;

use dmg_emu_core::{
    EmuError,
    cartridge::{Cartridge, ManualClock},
    header::MbcKind,
};

fn bank_at_4000(cart: &Cartridge) -> usize {
    cart.read_rom(0x4000) as usize | (cart.read_rom(0x4001) as usize) << 8
}

#[test]
fn rom_only_maps_both_banks_and_ignores_writes() {
    let mut rom = common::build_banked_rom(0x00, 0x00, 0x00);
    rom[0x0000] = 0x42;
    rom[0x014D] = dmg_emu_core::header::checksum(&rom);
    let mut cart = Cartridge::from_bytes(rom).unwrap();

    assert_eq!(cart.header().mbc(), MbcKind::NoMbc);
    assert_eq!(cart.read_rom(0x0000), 0x42);
    assert_eq!(bank_at_4000(&cart), 1);
    cart.write_rom(0x2000, 0x05);
    assert_eq!(bank_at_4000(&cart), 1);
    // No RAM declared.
    assert_eq!(cart.read_ram(0xA000), 0xFF);
}

#[test]
fn unsupported_cartridge_type_is_rejected() {
    let rom = common::build_rom(0x22, 0x00, 0x00, &[]);
    assert_eq!(
        Cartridge::from_bytes(rom).unwrap_err(),
        EmuError::UnsupportedCartridgeType(0x22)
    );
}

#[test]
fn truncated_image_is_rejected() {
    assert_eq!(
        Cartridge::from_bytes(vec![0; 0x100]).unwrap_err(),
        EmuError::RomTooSmall { len: 0x100 }
    );
}

#[test]
fn mbc1_bank_zero_maps_to_one() {
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x01, 0x02, 0x00)).unwrap();
    cart.write_rom(0x2000, 0x00);
    assert_eq!(bank_at_4000(&cart), 1);
    cart.write_rom(0x2000, 0x05);
    assert_eq!(bank_at_4000(&cart), 5);
    // Bank number wraps to the ROM size (8 banks).
    cart.write_rom(0x2000, 0x0B);
    assert_eq!(bank_at_4000(&cart), 3);
}

#[test]
fn mbc1_upper_bits_and_advanced_mode() {
    // 1 MiB, 64 banks.
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x01, 0x05, 0x00)).unwrap();
    cart.write_rom(0x2000, 0x00);
    cart.write_rom(0x4000, 0x01);
    assert_eq!(bank_at_4000(&cart), 0x21);

    // Mode 0: bank 0 area stays on bank 0.
    assert_eq!(cart.read_rom(0x0000), 0x00);
    cart.write_rom(0x6000, 0x01);
    // Mode 1: the upper bits also select the 0x0000 bank.
    assert_eq!(cart.read_rom(0x0000), 0x20);
}

#[test]
fn mbc1_ram_enable_and_banking() {
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x03, 0x05, 0x03)).unwrap();
    assert!(cart.has_battery());

    cart.write_ram(0xA000, 0x11);
    assert_eq!(cart.read_ram(0xA000), 0xFF, "RAM disabled by default");

    cart.write_rom(0x0000, 0x0A);
    cart.write_ram(0xA000, 0x11);
    assert_eq!(cart.read_ram(0xA000), 0x11);

    cart.write_rom(0x6000, 0x01);
    cart.write_rom(0x4000, 0x02);
    assert_eq!(cart.read_ram(0xA000), 0x00);
    cart.write_ram(0xA000, 0x22);

    cart.write_rom(0x4000, 0x00);
    assert_eq!(cart.read_ram(0xA000), 0x11);
    assert_eq!(cart.ram()[2 * 0x2000], 0x22);

    cart.write_rom(0x0000, 0x00);
    assert_eq!(cart.read_ram(0xA000), 0xFF);
}

#[test]
fn mbc2_nibble_ram_and_address_bit_8() {
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x06, 0x03, 0x00)).unwrap();

    // Bit 8 set: ROM bank select.
    cart.write_rom(0x2100, 0x03);
    assert_eq!(bank_at_4000(&cart), 3);
    cart.write_rom(0x2100, 0x00);
    assert_eq!(bank_at_4000(&cart), 1);

    // Bit 8 clear: RAM enable.
    cart.write_rom(0x0000, 0x0A);
    cart.write_ram(0xA000, 0xAB);
    assert_eq!(cart.read_ram(0xA000), 0xFB);
    // 512 half-bytes, mirrored across the window.
    assert_eq!(cart.read_ram(0xA200), 0xFB);
    assert_eq!(cart.read_ram(0xBE00), 0xFB);
}

#[test]
fn mbc3_rom_and_ram_banks() {
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x13, 0x06, 0x03)).unwrap();
    cart.write_rom(0x2000, 0x7F);
    assert_eq!(bank_at_4000(&cart), 0x7F);
    cart.write_rom(0x2000, 0x00);
    assert_eq!(bank_at_4000(&cart), 1);

    cart.write_rom(0x0000, 0x0A);
    for bank in 0..4u8 {
        cart.write_rom(0x4000, bank);
        cart.write_ram(0xA123, 0x10 + bank);
    }
    for bank in 0..4u8 {
        cart.write_rom(0x4000, bank);
        assert_eq!(cart.read_ram(0xA123), 0x10 + bank);
    }
}

fn rtc_cart(clock: &ManualClock) -> Cartridge {
    let rom = common::build_rom(0x10, 0x00, 0x03, &[]);
    let mut cart = Cartridge::with_clock(rom, Box::new(clock.clone())).unwrap();
    cart.write_rom(0x0000, 0x0A);
    cart
}

fn latch(cart: &mut Cartridge) {
    cart.write_rom(0x6000, 0x00);
    cart.write_rom(0x6000, 0x01);
}

fn read_rtc(cart: &mut Cartridge, reg: u8) -> u8 {
    cart.write_rom(0x4000, reg);
    cart.read_ram(0xA000)
}

#[test]
fn mbc3_rtc_counts_wall_time_after_latch() {
    let clock = ManualClock::new();
    let mut cart = rtc_cart(&clock);

    clock.advance(Duration::from_secs(90_061));
    assert_eq!(read_rtc(&mut cart, 0x08), 0, "not latched yet");

    latch(&mut cart);
    assert_eq!(read_rtc(&mut cart, 0x08), 1);
    assert_eq!(read_rtc(&mut cart, 0x09), 1);
    assert_eq!(read_rtc(&mut cart, 0x0A), 1);
    assert_eq!(read_rtc(&mut cart, 0x0B), 1);
    assert_eq!(read_rtc(&mut cart, 0x0C), 0x00);

    // The latched copy stays put until the next 0 -> 1 sequence.
    clock.advance(Duration::from_secs(5));
    assert_eq!(read_rtc(&mut cart, 0x08), 1);
    cart.write_rom(0x6000, 0x01);
    assert_eq!(read_rtc(&mut cart, 0x08), 1);
    latch(&mut cart);
    assert_eq!(read_rtc(&mut cart, 0x08), 6);
}

#[test]
fn mbc3_rtc_halt_and_day_carry() {
    let clock = ManualClock::new();
    let mut cart = rtc_cart(&clock);

    cart.write_rom(0x4000, 0x0C);
    cart.write_ram(0xA000, 0x40);
    clock.advance(Duration::from_secs(3_600));
    latch(&mut cart);
    assert_eq!(read_rtc(&mut cart, 0x0A), 0, "halted clock does not advance");
    assert_eq!(read_rtc(&mut cart, 0x0C), 0x40);

    // Day 511, 23:59:59, running.
    cart.write_rom(0x4000, 0x0A);
    cart.write_ram(0xA000, 23);
    cart.write_rom(0x4000, 0x09);
    cart.write_ram(0xA000, 59);
    cart.write_rom(0x4000, 0x08);
    cart.write_ram(0xA000, 59);
    cart.write_rom(0x4000, 0x0B);
    cart.write_ram(0xA000, 0xFF);
    cart.write_rom(0x4000, 0x0C);
    cart.write_ram(0xA000, 0x01);

    clock.advance(Duration::from_secs(1));
    latch(&mut cart);
    assert_eq!(read_rtc(&mut cart, 0x08), 0);
    assert_eq!(read_rtc(&mut cart, 0x0A), 0);
    assert_eq!(read_rtc(&mut cart, 0x0B), 0);
    assert_eq!(read_rtc(&mut cart, 0x0C), 0x80, "day counter overflow sets carry");
}

#[test]
fn mbc5_nine_bit_bank_and_bank_zero() {
    // 8 MiB, 512 banks.
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x19, 0x08, 0x00)).unwrap();
    cart.write_rom(0x2000, 0x00);
    assert_eq!(bank_at_4000(&cart), 0, "MBC5 can map bank 0 high");
    cart.write_rom(0x2000, 0x23);
    cart.write_rom(0x3000, 0x01);
    assert_eq!(bank_at_4000(&cart), 0x123);
    assert_eq!(cart.rom_bank(), 0x123);
}

#[test]
fn mbc5_rumble_bit_drives_motor() {
    let mut cart = Cartridge::from_bytes(common::build_banked_rom(0x1D, 0x01, 0x03)).unwrap();
    cart.write_rom(0x0000, 0x0A);

    cart.write_rom(0x4000, 0x09);
    assert!(cart.rumble_active());
    cart.write_ram(0xA000, 0x5A);

    // Motor bit is not part of the RAM bank number.
    cart.write_rom(0x4000, 0x01);
    assert!(!cart.rumble_active());
    assert_eq!(cart.read_ram(0xA000), 0x5A);
}

#[test]
fn battery_ram_round_trips_through_load_ram() {
    let rom = common::build_rom(0x1B, 0x00, 0x02, &[]);
    let mut cart = Cartridge::from_bytes(rom.clone()).unwrap();
    cart.write_rom(0x0000, 0x0A);
    cart.write_ram(0xA010, 0x77);
    let saved = cart.ram().to_vec();

    let mut restored = Cartridge::from_bytes(rom).unwrap();
    restored.load_ram(&saved);
    restored.write_rom(0x0000, 0x0A);
    assert_eq!(restored.read_ram(0xA010), 0x77);
}
