use dotmatrix_core::cartridge::Cartridge;

/// Build a synthetic ROM image with a valid header. The body is zero-filled,
/// which conveniently executes as NOPs.
#[allow(dead_code)]
pub fn rom_image(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_code;
    let mut rom = vec![0u8; banks * 0x4000];
    rom[0x0134..0x0139].copy_from_slice(b"TESTS");
    rom[0x0147] = cart_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    rom
}

/// A 32 KiB ROM-only cartridge full of NOPs.
#[allow(dead_code)]
pub fn nop_cart() -> Cartridge {
    Cartridge::from_bytes(rom_image(0x00, 0x00, 0x00)).expect("valid test ROM")
}
