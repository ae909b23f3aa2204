use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use dmg_emu_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

/// Save an RGBA8888 frame as a PNG.
pub fn write_png(path: &Path, rgba: &[u8]) -> Result<(), png::EncodingError> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    writer.finish()
}
