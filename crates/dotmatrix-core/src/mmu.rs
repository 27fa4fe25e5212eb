use crate::{apu::Apu, cartridge::Cartridge, input::Input, ppu::Ppu, timer::Timer};

pub struct Mmu {
    pub wram: [u8; 0x2000],
    pub hram: [u8; 0x7F],
    pub cart: Option<Cartridge>,
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    /// Last value written to the DMA source register (FF46).
    dma: u8,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            wram: [0; 0x2000],
            hram: [0; 0x7F],
            cart: None,
            if_reg: 0xE1,
            ie_reg: 0,
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            input: Input::new(),
            dma: 0,
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn save_cart_ram(&mut self) {
        if let Some(cart) = &self.cart
            && let Err(e) = cart.save_ram()
        {
            log::error!("failed to save cartridge RAM: {e}");
        }
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo RAM mirrors WRAM.
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_byte(addr) as u16;
        let hi = self.read_byte(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            // Writes below 0x8000 are MBC control, never ROM bytes.
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize] = val,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {
                log::debug!("dropping OAM write of {val:#04X} at {addr:#06X}");
            }
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
        }
    }

    pub fn write_word(&mut self, addr: u16, val: u16) {
        self.write_byte(addr, val as u8);
        self.write_byte(addr.wrapping_add(1), (val >> 8) as u8);
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.input.read(),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.dma,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            // Unknown I/O reads as zero.
            _ => 0,
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.input.write(val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => {
                self.dma = val;
                self.oam_dma(val);
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val),
            // Unknown I/O writes are dropped.
            _ => {}
        }
    }

    /// OAM DMA: copy 160 bytes from `val << 8` into OAM. The whole block
    /// lands within the current emulator step.
    fn oam_dma(&mut self, val: u8) {
        let src = (val as u16) << 8;
        match src {
            0x8000..=0x9F00 => {
                let base = (src - 0x8000) as usize;
                self.ppu.oam.copy_from_slice(&self.ppu.vram[base..base + 0xA0]);
            }
            0xC000..=0xDF00 => {
                let base = (src - 0xC000) as usize;
                self.ppu.oam.copy_from_slice(&self.wram[base..base + 0xA0]);
            }
            _ => {
                for i in 0..0xA0u16 {
                    let byte = self.read_byte(src.wrapping_add(i));
                    self.ppu.oam[i as usize] = byte;
                }
            }
        }
    }

    /// Fan one CPU step's cycle count out to the clocked subsystems, in the
    /// fixed PPU, APU, timer order.
    pub fn tick(&mut self, cycles: i32) {
        self.ppu.step(cycles, &mut self.if_reg);
        self.apu.step(cycles);
        self.timer.step(cycles, &mut self.if_reg);
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
