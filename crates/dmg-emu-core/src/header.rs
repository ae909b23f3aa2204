//! Cartridge header parsing (gbdev.io/pandocs/The_Cartridge_Header.html).

use log::warn;

use crate::error::{EmuError, Result};

pub const HEADER_END: usize = 0x0150;

const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0144;
const CGB_FLAG: usize = 0x0143;
const NEW_LICENSEE: usize = 0x0144;
const SGB_FLAG: usize = 0x0146;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const DESTINATION: usize = 0x014A;
const OLD_LICENSEE: usize = 0x014B;
const HEADER_CHECKSUM: usize = 0x014D;

/// Old licensee byte meaning "look at the new licensee code instead".
const USE_NEW_LICENSEE: u8 = 0x33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    NoMbc,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// Decoded cartridge-type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartridgeType {
    pub code: u8,
    pub mbc: MbcKind,
    pub ram: bool,
    pub battery: bool,
    pub rtc: bool,
    pub rumble: bool,
}

impl CartridgeType {
    pub fn from_code(code: u8) -> Result<Self> {
        use MbcKind::*;
        // (mbc, ram, battery, rtc, rumble)
        let (mbc, ram, battery, rtc, rumble) = match code {
            0x00 => (NoMbc, false, false, false, false),
            0x01 => (Mbc1, false, false, false, false),
            0x02 => (Mbc1, true, false, false, false),
            0x03 => (Mbc1, true, true, false, false),
            0x05 => (Mbc2, true, false, false, false),
            0x06 => (Mbc2, true, true, false, false),
            0x08 => (NoMbc, true, false, false, false),
            0x09 => (NoMbc, true, true, false, false),
            0x0F => (Mbc3, false, true, true, false),
            0x10 => (Mbc3, true, true, true, false),
            0x11 => (Mbc3, false, false, false, false),
            0x12 => (Mbc3, true, false, false, false),
            0x13 => (Mbc3, true, true, false, false),
            0x19 => (Mbc5, false, false, false, false),
            0x1A => (Mbc5, true, false, false, false),
            0x1B => (Mbc5, true, true, false, false),
            0x1C => (Mbc5, false, false, false, true),
            0x1D => (Mbc5, true, false, false, true),
            0x1E => (Mbc5, true, true, false, true),
            other => return Err(EmuError::UnsupportedCartridgeType(other)),
        };
        Ok(Self {
            code,
            mbc,
            ram,
            battery,
            rtc,
            rumble,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Japan,
    Overseas,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub cgb_flag: u8,
    pub sgb: bool,
    pub cart_type: CartridgeType,
    pub rom_size: usize,
    pub ram_size: usize,
    pub destination: Destination,
    pub licensee: &'static str,
    pub header_checksum: u8,
    pub checksum_ok: bool,
}

impl Header {
    pub fn parse(rom: &[u8]) -> Result<Self> {
        if rom.len() < HEADER_END {
            return Err(EmuError::RomTooSmall { len: rom.len() });
        }

        let cgb_flag = rom[CGB_FLAG];
        // CGB-aware titles give up their last byte to the CGB flag.
        let title_end = if cgb_flag & 0x80 != 0 {
            CGB_FLAG
        } else {
            TITLE_END
        };
        let raw_title = &rom[TITLE_START..title_end];
        let len = raw_title
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(raw_title.len());
        let title = String::from_utf8_lossy(&raw_title[..len]).trim().to_string();

        let cart_type = CartridgeType::from_code(rom[CART_TYPE])?;
        let rom_size = rom_size_bytes(rom[ROM_SIZE])?;
        let ram_size = if cart_type.mbc == MbcKind::Mbc2 {
            // 512 half-bytes built into the controller.
            0x200
        } else {
            ram_size_bytes(rom[RAM_SIZE])?
        };
        let licensee = licensee_name(
            rom[OLD_LICENSEE],
            [rom[NEW_LICENSEE], rom[NEW_LICENSEE + 1]],
        )?;
        let destination = if rom[DESTINATION] == 0x00 {
            Destination::Japan
        } else {
            Destination::Overseas
        };

        let header_checksum = rom[HEADER_CHECKSUM];
        let computed = checksum(rom);
        let checksum_ok = computed == header_checksum;
        if !checksum_ok {
            warn!(
                "header checksum mismatch: stored {header_checksum:02X}, computed {computed:02X}"
            );
        }
        if rom.len() < rom_size {
            warn!(
                "ROM image is {} bytes but the header declares {rom_size}",
                rom.len()
            );
        }

        Ok(Self {
            title,
            cgb_flag,
            sgb: rom[SGB_FLAG] == 0x03,
            cart_type,
            rom_size,
            ram_size,
            destination,
            licensee,
            header_checksum,
            checksum_ok,
        })
    }

    pub fn mbc(&self) -> MbcKind {
        self.cart_type.mbc
    }

    pub fn rom_banks(&self) -> usize {
        self.rom_size / 0x4000
    }

    pub fn ram_banks(&self) -> usize {
        self.ram_size.div_ceil(0x2000)
    }

    pub fn cgb_supported(&self) -> bool {
        self.cgb_flag & 0x80 != 0
    }
}

/// Header checksum over 0x0134-0x014C, as computed by the boot ROM.
pub fn checksum(rom: &[u8]) -> u8 {
    rom[TITLE_START..HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

fn rom_size_bytes(code: u8) -> Result<usize> {
    match code {
        0x00..=0x08 => Ok(0x8000 << code),
        other => Err(EmuError::UnknownRomSize(other)),
    }
}

fn ram_size_bytes(code: u8) -> Result<usize> {
    match code {
        0x00 => Ok(0),
        0x01 => Ok(0x800),
        0x02 => Ok(0x2000),
        0x03 => Ok(0x8000),
        0x04 => Ok(0x20000),
        0x05 => Ok(0x10000),
        other => Err(EmuError::UnknownRamSize(other)),
    }
}

fn licensee_name(old: u8, new: [u8; 2]) -> Result<&'static str> {
    if old == USE_NEW_LICENSEE {
        let code = [new[0] as char, new[1] as char];
        return NEW_LICENSEES
            .iter()
            .find(|(c, _)| c.chars().eq(code))
            .map(|&(_, name)| name)
            .ok_or_else(|| EmuError::UnknownNewLicensee(code.iter().collect()));
    }
    OLD_LICENSEES
        .iter()
        .find(|(c, _)| *c == old)
        .map(|&(_, name)| name)
        .ok_or(EmuError::UnknownLicensee(old))
}

static OLD_LICENSEES: &[(u8, &str)] = &[
    (0x00, "None"),
    (0x01, "Nintendo"),
    (0x08, "Capcom"),
    (0x09, "HOT-B"),
    (0x0A, "Jaleco"),
    (0x0B, "Coconuts Japan"),
    (0x0C, "Elite Systems"),
    (0x13, "EA (Electronic Arts)"),
    (0x18, "Hudson Soft"),
    (0x19, "ITC Entertainment"),
    (0x1A, "Yanoman"),
    (0x1D, "Japan Clary"),
    (0x1F, "Virgin Games Ltd."),
    (0x24, "PCM Complete"),
    (0x25, "San-X"),
    (0x28, "Kemco"),
    (0x29, "SETA Corporation"),
    (0x30, "Infogrames"),
    (0x31, "Nintendo"),
    (0x32, "Bandai"),
    (0x34, "Konami"),
    (0x35, "HectorSoft"),
    (0x38, "Capcom"),
    (0x39, "Banpresto"),
    (0x3C, "Entertainment Interactive"),
    (0x3E, "Gremlin"),
    (0x41, "Ubi Soft"),
    (0x42, "Atlus"),
    (0x44, "Malibu Interactive"),
    (0x46, "Angel"),
    (0x47, "Spectrum HoloByte"),
    (0x49, "Irem"),
    (0x4A, "Virgin Games Ltd."),
    (0x4D, "Malibu Interactive"),
    (0x4F, "U.S. Gold"),
    (0x50, "Absolute"),
    (0x51, "Acclaim Entertainment"),
    (0x52, "Activision"),
    (0x53, "Sammy USA Corporation"),
    (0x54, "GameTek"),
    (0x55, "Park Place"),
    (0x56, "LJN"),
    (0x57, "Matchbox"),
    (0x59, "Milton Bradley Company"),
    (0x5A, "Mindscape"),
    (0x5B, "Romstar"),
    (0x5C, "Naxat Soft"),
    (0x5D, "Tradewest"),
    (0x60, "Titus Interactive"),
    (0x61, "Virgin Games Ltd."),
    (0x67, "Ocean Software"),
    (0x69, "EA (Electronic Arts)"),
    (0x6E, "Elite Systems"),
    (0x6F, "Electro Brain"),
    (0x70, "Infogrames"),
    (0x71, "Interplay Entertainment"),
    (0x72, "Broderbund"),
    (0x73, "Sculptured Software"),
    (0x75, "The Sales Curve Limited"),
    (0x78, "THQ"),
    (0x79, "Accolade"),
    (0x7A, "Triffix Entertainment"),
    (0x7C, "MicroProse"),
    (0x7F, "Kemco"),
    (0x80, "Misawa Entertainment"),
    (0x83, "LOZC G."),
    (0x86, "Tokuma Shoten"),
    (0x8B, "Bullet-Proof Software"),
    (0x8C, "Vic Tokai Corp."),
    (0x8E, "Ape Inc."),
    (0x8F, "I'Max"),
    (0x91, "Chunsoft Co."),
    (0x92, "Video System"),
    (0x93, "Tsubaraya Productions"),
    (0x95, "Varie"),
    (0x96, "Yonezawa/S'Pal"),
    (0x97, "Kemco"),
    (0x99, "Arc"),
    (0x9A, "Nihon Bussan"),
    (0x9B, "Tecmo"),
    (0x9C, "Imagineer"),
    (0x9D, "Banpresto"),
    (0x9F, "Nova"),
    (0xA1, "Hori Electric"),
    (0xA2, "Bandai"),
    (0xA4, "Konami"),
    (0xA6, "Kawada"),
    (0xA7, "Takara"),
    (0xA9, "Technos Japan"),
    (0xAA, "Broderbund"),
    (0xAC, "Toei Animation"),
    (0xAD, "Toho"),
    (0xAF, "Namco"),
    (0xB0, "Acclaim Entertainment"),
    (0xB1, "ASCII Corporation or Nexsoft"),
    (0xB2, "Bandai"),
    (0xB4, "Square Enix"),
    (0xB6, "HAL Laboratory"),
    (0xB7, "SNK"),
    (0xB9, "Pony Canyon"),
    (0xBA, "Culture Brain"),
    (0xBB, "Sunsoft"),
    (0xBD, "Sony Imagesoft"),
    (0xBF, "Sammy Corporation"),
    (0xC0, "Taito"),
    (0xC2, "Kemco"),
    (0xC3, "Square"),
    (0xC4, "Tokuma Shoten"),
    (0xC5, "Data East"),
    (0xC6, "Tonkin House"),
    (0xC8, "Koei"),
    (0xC9, "UFL"),
    (0xCA, "Ultra Games"),
    (0xCB, "VAP, Inc."),
    (0xCC, "Use Corporation"),
    (0xCD, "Meldac"),
    (0xCE, "Pony Canyon"),
    (0xCF, "Angel"),
    (0xD0, "Taito"),
    (0xD1, "SOFEL"),
    (0xD2, "Quest"),
    (0xD3, "Sigma Enterprises"),
    (0xD4, "ASK Kodansha Co."),
    (0xD6, "Naxat Soft"),
    (0xD7, "Copya System"),
    (0xD9, "Banpresto"),
    (0xDA, "Tomy"),
    (0xDB, "LJN"),
    (0xDD, "Nippon Computer Systems"),
    (0xDE, "Human Ent."),
    (0xDF, "Altron"),
    (0xE0, "Jaleco"),
    (0xE1, "Towa Chiki"),
    (0xE2, "Yutaka"),
    (0xE3, "Varie"),
    (0xE5, "Epoch"),
    (0xE7, "Athena"),
    (0xE8, "Asmik Ace Entertainment"),
    (0xE9, "Natsume"),
    (0xEA, "King Records"),
    (0xEB, "Atlus"),
    (0xEC, "Epic/Sony Records"),
    (0xEE, "IGS"),
    (0xF0, "A Wave"),
    (0xF3, "Extreme Entertainment"),
    (0xFF, "LJN"),
];

static NEW_LICENSEES: &[(&str, &str)] = &[
    ("00", "None"),
    ("01", "Nintendo Research & Development 1"),
    ("08", "Capcom"),
    ("13", "EA (Electronic Arts)"),
    ("18", "Hudson Soft"),
    ("19", "B-AI"),
    ("20", "KSS"),
    ("22", "Planning Office WADA"),
    ("24", "PCM Complete"),
    ("25", "San-X"),
    ("28", "Kemco"),
    ("29", "SETA Corporation"),
    ("30", "Viacom"),
    ("31", "Nintendo"),
    ("32", "Bandai"),
    ("33", "Ocean Software/Acclaim Entertainment"),
    ("34", "Konami"),
    ("35", "HectorSoft"),
    ("37", "Taito"),
    ("38", "Hudson Soft"),
    ("39", "Banpresto"),
    ("41", "Ubi Soft"),
    ("42", "Atlus"),
    ("44", "Malibu Interactive"),
    ("46", "Angel"),
    ("47", "Bullet-Proof Software"),
    ("49", "Irem"),
    ("50", "Absolute"),
    ("51", "Acclaim Entertainment"),
    ("52", "Activision"),
    ("53", "Sammy USA Corporation"),
    ("54", "Konami"),
    ("55", "Hi Tech Expressions"),
    ("56", "LJN"),
    ("57", "Matchbox"),
    ("58", "Mattel"),
    ("59", "Milton Bradley Company"),
    ("60", "Titus Interactive"),
    ("61", "Virgin Games Ltd."),
    ("64", "Lucasfilm Games"),
    ("67", "Ocean Software"),
    ("69", "EA (Electronic Arts)"),
    ("70", "Infogrames"),
    ("71", "Interplay Entertainment"),
    ("72", "Broderbund"),
    ("73", "Sculptured Software"),
    ("75", "The Sales Curve Limited"),
    ("78", "THQ"),
    ("79", "Accolade"),
    ("80", "Misawa Entertainment"),
    ("83", "LOZC G."),
    ("86", "Tokuma Shoten"),
    ("87", "Tsukuda Original"),
    ("91", "Chunsoft Co."),
    ("92", "Video System"),
    ("93", "Ocean Software/Acclaim Entertainment"),
    ("95", "Varie"),
    ("96", "Yonezawa/S'Pal"),
    ("97", "Kaneko"),
    ("99", "Pack-In-Video"),
    ("9H", "Bottom Up"),
    ("A4", "Konami (Yu-Gi-Oh!)"),
    ("BL", "MTO"),
    ("DK", "Kodansha"),
];
