use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

const HEADER_END: usize = 0x150;
const ROM_BANK_SIZE: usize = 0x4000;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("couldn't read ROM file: {0}")]
    Io(#[from] io::Error),
    #[error("ROM image is smaller than the cartridge header")]
    TruncatedHeader,
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedCartType(u8),
    #[error("unsupported system code {0:#04X} (CGB-only cartridge)")]
    UnsupportedSystem(u8),
    #[error("ROM size code {0:#04X} out of range")]
    BadRomSizeCode(u8),
    #[error("RAM size code {0:#04X} out of range")]
    BadRamSizeCode(u8),
    #[error("header declares {declared} ROM bytes but the image holds {actual}")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("size codes are invalid for a {0:?} cartridge")]
    BadSizeForType(MbcType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcType {
    RomOnly,
    Mbc1,
    Mbc2,
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcType,
    pub title: String,
    cart_type: u8,
    save_path: Option<PathBuf>,
    mbc_state: MbcState,
}

#[derive(Debug)]
enum MbcState {
    RomOnly,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        mode: u8,
        ram_enable: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enable: bool,
    },
}

impl Cartridge {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        let mut cart = Self::from_bytes(data)?;

        if cart.has_battery() {
            let mut save = PathBuf::from(path.as_ref());
            save.set_extension("sav");
            cart.save_path = Some(save.clone());
            // A missing save is a first run; a short one fills what it has.
            if let Ok(bytes) = fs::read(&save) {
                for (d, s) in cart.ram.iter_mut().zip(bytes.iter()) {
                    *d = *s;
                }
            }
        }

        Ok(cart)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = Header::parse(&data)?;
        let title = header.title();
        let cart_type = header.cart_type();
        header.system()?;
        let mbc = header.mbc_type()?;
        let (rom_size, rom_banks) = header.rom_size()?;
        let (mut ram_size, mut ram_banks) = header.ram_size()?;

        match mbc {
            MbcType::RomOnly => {
                if rom_size != 2 * ROM_BANK_SIZE || ram_size > 0x2000 {
                    return Err(CartridgeError::BadSizeForType(mbc));
                }
            }
            MbcType::Mbc2 => {
                // MBC2 carries its own 512x4-bit RAM; the header declares none.
                if rom_size > 16 * ROM_BANK_SIZE || ram_size != 0 {
                    return Err(CartridgeError::BadSizeForType(mbc));
                }
                ram_size = 0x200;
                ram_banks = 1;
            }
            MbcType::Mbc1 => {}
        }

        if data.len() < rom_size {
            return Err(CartridgeError::SizeMismatch {
                declared: rom_size,
                actual: data.len(),
            });
        }

        log::info!(
            "loaded cartridge \"{title}\" (type {cart_type:#04X} {mbc:?}, \
             {rom_size} ROM bytes / {rom_banks} banks, \
             {ram_size} RAM bytes / {ram_banks} banks)"
        );

        let mbc_state = match mbc {
            MbcType::RomOnly => MbcState::RomOnly,
            MbcType::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                mode: 0,
                ram_enable: false,
            },
            MbcType::Mbc2 => MbcState::Mbc2 {
                rom_bank: 1,
                ram_enable: false,
            },
        };

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            cart_type,
            save_path: None,
            mbc_state,
        })
    }

    pub fn read(&self, addr: u16) -> u8 {
        let rom_bank_count = (self.rom.len() / ROM_BANK_SIZE).max(1);
        match (&self.mbc_state, addr) {
            (MbcState::RomOnly, 0x0000..=0x7FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_bank, mode, .. }, 0x0000..=0x3FFF) => {
                // In banking mode 1 the upper bits remap the fixed region too.
                let bank = if *mode == 0 {
                    0
                } else {
                    (((*ram_bank as usize) & 0x03) << 5) % rom_bank_count
                };
                let offset = bank * ROM_BANK_SIZE + addr as usize;
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (
                MbcState::Mbc1 {
                    rom_bank, ram_bank, ..
                },
                0x4000..=0x7FFF,
            ) => {
                let high = ((*ram_bank as usize) & 0x03) << 5;
                let mut bank = high | (*rom_bank as usize & 0x1F);
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank %= rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { .. }, 0x0000..=0x3FFF) => {
                self.rom.get(addr as usize).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc2 { rom_bank, .. }, 0x4000..=0x7FFF) => {
                let mut bank = (*rom_bank & 0x0F) as usize;
                if bank == 0 {
                    bank = 1;
                }
                bank %= rom_bank_count;
                let offset = bank * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            (MbcState::RomOnly, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                self.ram.get(idx).copied().unwrap_or(0xFF)
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    let idx = self.ram_index(addr);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if !*ram_enable {
                    0xFF
                } else {
                    // 512x4-bit internal RAM, mirrored across 0xA000-0xBFFF.
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    let nibble = self.ram.get(idx).copied().unwrap_or(0x0F) & 0x0F;
                    0xF0 | nibble
                }
            }
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::RomOnly, 0x0000..=0x7FFF) => {
                log::debug!("dropping write of {val:#04X} to ROM address {addr:#06X}");
            }
            (MbcState::RomOnly, 0xA000..=0xBFFF) => {
                let idx = addr as usize - 0xA000;
                if let Some(b) = self.ram.get_mut(idx) {
                    *b = val;
                }
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (MbcState::Mbc1 { mode, .. }, 0x6000..=0x7FFF) => {
                *mode = val & 0x01;
            }
            (MbcState::Mbc1 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = self.ram_index(addr);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            }
            (
                MbcState::Mbc2 {
                    rom_bank,
                    ram_enable,
                },
                0x0000..=0x3FFF,
            ) => {
                // MBC2 routes the whole control region through address bit 8:
                // clear selects RAM enable, set selects the ROM bank.
                if addr & 0x0100 == 0 {
                    *ram_enable = val & 0x0F == 0x0A;
                } else {
                    *rom_bank = val & 0x0F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
            }
            (MbcState::Mbc2 { ram_enable, .. }, 0xA000..=0xBFFF) => {
                if *ram_enable {
                    let idx = (addr as usize - 0xA000) & 0x01FF;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val & 0x0F;
                    }
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> usize {
        match &self.mbc_state {
            MbcState::Mbc1 { ram_bank, mode, .. } if *mode == 1 => {
                let ram_bank_count = (self.ram.len() / 0x2000).max(1);
                ((*ram_bank as usize) % ram_bank_count) * 0x2000 + addr as usize - 0xA000
            }
            _ => addr as usize - 0xA000,
        }
    }

    fn has_battery(&self) -> bool {
        matches!(self.cart_type, 0x03 | 0x06 | 0x09)
    }

    /// Write cart RAM back to the sibling `.sav` file, if this is a
    /// battery-backed cartridge loaded from disk.
    pub fn save_ram(&self) -> io::Result<()> {
        if let (true, Some(path)) = (self.has_battery(), &self.save_path)
            && !self.ram.is_empty()
        {
            fs::write(path, &self.ram)?;
        }
        Ok(())
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TruncatedHeader);
        }
        Ok(Self { data })
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0144];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn system(&self) -> Result<(), CartridgeError> {
        // 0x80 marks color-compatible carts, which still run as DMG.
        match self.data[0x0143] {
            0xC0 => Err(CartridgeError::UnsupportedSystem(0xC0)),
            _ => Ok(()),
        }
    }

    fn cart_type(&self) -> u8 {
        self.data[0x0147]
    }

    fn mbc_type(&self) -> Result<MbcType, CartridgeError> {
        match self.cart_type() {
            0x00 | 0x08 | 0x09 => Ok(MbcType::RomOnly),
            0x01..=0x03 => Ok(MbcType::Mbc1),
            0x05 | 0x06 => Ok(MbcType::Mbc2),
            other => Err(CartridgeError::UnsupportedCartType(other)),
        }
    }

    fn rom_size(&self) -> Result<(usize, u8), CartridgeError> {
        let code = self.data[0x0148];
        match code {
            // 32 KiB << code, from 2 banks up to 128.
            0x00..=0x06 => Ok(((2 * ROM_BANK_SIZE) << code, 2u8 << code)),
            _ => Err(CartridgeError::BadRomSizeCode(code)),
        }
    }

    fn ram_size(&self) -> Result<(usize, u8), CartridgeError> {
        let code = self.data[0x0149];
        match code {
            0x00 => Ok((0, 0)),
            0x01 => Ok((0x800, 1)),
            0x02 => Ok((0x2000, 1)),
            0x03 => Ok((0x8000, 4)),
            _ => Err(CartridgeError::BadRamSizeCode(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_header(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let banks = 2usize << rom_code.min(6);
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        rom[0x0134..0x013B].copy_from_slice(b"HEADERS");
        rom[0x0147] = cart_type;
        rom[0x0148] = rom_code;
        rom[0x0149] = ram_code;
        rom
    }

    #[test]
    fn parses_title_and_sizes() {
        let cart = Cartridge::from_bytes(rom_with_header(0x01, 0x01, 0x02)).unwrap();
        assert_eq!(cart.title, "HEADERS");
        assert_eq!(cart.mbc, MbcType::Mbc1);
        assert_eq!(cart.rom.len(), 0x10000);
        assert_eq!(cart.ram.len(), 0x2000);
    }

    #[test]
    fn refuses_unsupported_type() {
        let rom = rom_with_header(0x13, 0x00, 0x00); // MBC3+RAM+BATTERY
        assert!(matches!(
            Cartridge::from_bytes(rom),
            Err(CartridgeError::UnsupportedCartType(0x13))
        ));
    }

    #[test]
    fn refuses_cgb_only_rom() {
        let mut rom = rom_with_header(0x00, 0x00, 0x00);
        rom[0x0143] = 0xC0;
        assert!(matches!(
            Cartridge::from_bytes(rom),
            Err(CartridgeError::UnsupportedSystem(0xC0))
        ));
    }

    #[test]
    fn refuses_truncated_image() {
        assert!(matches!(
            Cartridge::from_bytes(vec![0u8; 0x100]),
            Err(CartridgeError::TruncatedHeader)
        ));

        let mut rom = rom_with_header(0x01, 0x02, 0x00); // declares 128 KiB
        rom.truncate(0x8000);
        assert!(matches!(
            Cartridge::from_bytes(rom),
            Err(CartridgeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn mbc2_gets_internal_ram() {
        let cart = Cartridge::from_bytes(rom_with_header(0x06, 0x00, 0x00)).unwrap();
        assert_eq!(cart.mbc, MbcType::Mbc2);
        assert_eq!(cart.ram.len(), 0x200);
    }

    #[test]
    fn mbc2_refuses_declared_ram() {
        assert!(matches!(
            Cartridge::from_bytes(rom_with_header(0x05, 0x00, 0x02)),
            Err(CartridgeError::BadSizeForType(MbcType::Mbc2))
        ));
    }
}
