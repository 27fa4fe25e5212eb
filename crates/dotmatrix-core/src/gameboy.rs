use std::path::Path;

use crate::{
    cartridge::{Cartridge, CartridgeError},
    cpu::Cpu,
    input::Button,
    mmu::Mmu,
};

/// CPU cycles in one complete DMG video frame (~59.73 Hz).
pub const FRAME_CYCLES: i32 = 70224;

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
}

impl GameBoy {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let cart = Cartridge::from_file(path)?;
        let mut gb = Self::new();
        gb.mmu.load_cart(cart);
        Ok(gb)
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.mmu.load_cart(cart);
    }

    /// Run until at least `clock_limit` cycles have elapsed.
    ///
    /// Each iteration executes one CPU instruction (or bills 4 idle cycles
    /// while halted), fans that step's cycle count out to the PPU, APU, and
    /// timer, and then gives the interrupt controller a chance to redirect
    /// the CPU. Afterwards the limit is subtracted from the clock, so the
    /// overshoot carries into the next call.
    pub fn run_for(&mut self, clock_limit: i32) {
        loop {
            let prev = self.cpu.clock;

            if !self.cpu.halted {
                self.cpu.step(&mut self.mmu);
            } else {
                self.cpu.clock += 4;
            }

            let step_cycles = self.cpu.clock - prev;
            self.mmu.tick(step_cycles);
            self.cpu.handle_interrupts(&mut self.mmu);

            if self.cpu.clock >= clock_limit {
                break;
            }
        }
        self.cpu.clock -= clock_limit;
    }

    /// Advance by exactly one video frame's worth of cycles.
    pub fn run_frame(&mut self) {
        self.run_for(FRAME_CYCLES);
    }

    /// The 160x144 output image, one 0x00RRGGBB pixel per dot.
    pub fn framebuffer(&self) -> &[u32] {
        &self.mmu.ppu.framebuffer
    }

    /// True once per frame after the PPU enters VBlank; reading consumes it.
    pub fn take_frame_ready(&mut self) -> bool {
        self.mmu.ppu.take_frame_ready()
    }

    pub fn press_button(&mut self, button: Button) {
        self.mmu.input.press(button, &mut self.mmu.if_reg);
    }

    pub fn release_button(&mut self, button: Button) {
        self.mmu.input.release(button);
    }

    /// Persist battery-backed cartridge RAM, if any. Called by frontends at
    /// shutdown.
    pub fn save_cart_ram(&mut self) {
        self.mmu.save_cart_ram();
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
