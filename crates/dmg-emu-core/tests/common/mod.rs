use once_cell::sync::OnceCell;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use dmg_emu_core::header::checksum;

static INIT: OnceCell<()> = OnceCell::new();

fn ensure_test_roms() {
    INIT.get_or_init(|| {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_roms");
        fs::create_dir_all(&dir).expect("failed to create test_roms directory");
        ensure_c_sp_test_rom_bundle(&dir);
    });
}

fn ensure_c_sp_test_rom_bundle(dir: &Path) {
    // ROM binaries are not checked in; fetch the bundle once per checkout.
    if dir.join("blargg").exists() && dir.join("dmg-acid2").exists() {
        return;
    }

    let url = "https://github.com/c-sp/game-boy-test-roms/releases/download/v7.0/game-boy-test-roms-v7.0.zip";
    let resp = reqwest::blocking::get(url).expect("failed to download test roms");
    let status = resp.status();
    if !status.is_success() {
        panic!("failed to download test roms: {status}");
    }
    let bytes = resp.bytes().expect("failed to read rom bytes");
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader).expect("failed to open zip archive");
    archive.extract(dir).expect("failed to extract test roms");
}

#[allow(dead_code)]
pub fn rom_path<P: AsRef<Path>>(relative: P) -> PathBuf {
    ensure_test_roms();
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("test_roms")
        .join(relative)
}

/// Decode a reference screenshot into RGB triples.
#[allow(dead_code)]
pub fn load_png_rgb<P: AsRef<Path>>(path: P) -> (u32, u32, Vec<[u8; 3]>) {
    let file = File::open(path).expect("failed to open png");
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().expect("failed to read png info");
    let buffer_size = reader
        .output_buffer_size()
        .expect("failed to get png output buffer size");
    let mut buf = vec![0; buffer_size];
    let info = reader
        .next_frame(&mut buf)
        .expect("failed to decode png frame");
    let data = &buf[..info.buffer_size()];

    let pixels = match info.color_type {
        png::ColorType::Rgb => data
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
        png::ColorType::Rgba => data
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2]])
            .collect(),
        png::ColorType::Grayscale => data.iter().map(|&g| [g, g, g]).collect(),
        png::ColorType::GrayscaleAlpha => {
            data.chunks_exact(2).map(|c| [c[0], c[0], c[0]]).collect()
        }
        png::ColorType::Indexed => panic!("palette should have been expanded"),
    };
    (info.width, info.height, pixels)
}

/// True once "Passed" or "Failed" shows up in the serial stream. Only the
/// bytes added since the previous call (plus a marker-sized overlap) are
/// scanned.
#[allow(dead_code)]
pub fn serial_contains_result(serial: &[u8], checked_up_to: &mut usize) -> bool {
    const PASSED: &[u8] = b"Passed";
    const FAILED: &[u8] = b"Failed";

    let lookbehind = PASSED.len().max(FAILED.len()) - 1;
    let start = checked_up_to.saturating_sub(lookbehind).min(serial.len());
    let window = &serial[start..];

    let found = window.windows(PASSED.len()).any(|chunk| chunk == PASSED)
        || window.windows(FAILED.len()).any(|chunk| chunk == FAILED);

    *checked_up_to = serial.len();
    found
}

/// First byte after the cartridge header.
#[allow(dead_code)]
pub const MAIN: u16 = 0x0150;

/// A cartridge image with a valid header: `cart_type`, `rom_size` and
/// `ram_size` are the raw header codes. `code` is placed at 0x0100 and must
/// end before the header at 0x0134.
#[allow(dead_code)]
pub fn build_rom(cart_type: u8, rom_size: u8, ram_size: u8, code: &[u8]) -> Vec<u8> {
    assert!(
        0x0100 + code.len() <= 0x0134,
        "entry code overlaps the header; use build_rom_with_main"
    );
    let mut rom = vec![0u8; 0x8000 << rom_size];
    rom[0x0100..0x0100 + code.len()].copy_from_slice(code);
    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_size;
    rom[0x0149] = ram_size;
    rom[0x014D] = checksum(&rom);
    rom
}

/// A 32 KiB ROM-only image that jumps from the entry point to `code`
/// placed at [`MAIN`].
#[allow(dead_code)]
pub fn build_rom_with_main(code: &[u8]) -> Vec<u8> {
    let mut rom = build_rom(0x00, 0x00, 0x00, &[0xC3, MAIN as u8, (MAIN >> 8) as u8]);
    let start = MAIN as usize;
    rom[start..start + code.len()].copy_from_slice(code);
    rom
}

/// Like [`build_rom`], with every 16 KiB bank's first byte set to its bank
/// number so bank switching is observable.
#[allow(dead_code)]
pub fn build_banked_rom(cart_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
    let mut rom = build_rom(cart_type, rom_size, ram_size, &[]);
    for (bank, chunk) in rom.chunks_mut(0x4000).enumerate().skip(1) {
        chunk[0] = bank as u8;
        chunk[1] = (bank >> 8) as u8;
    }
    rom
}
