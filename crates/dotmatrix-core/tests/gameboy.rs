mod common;

use dotmatrix_core::{
    gameboy::{FRAME_CYCLES, GameBoy},
    input::Button,
};

fn gb_with_nop_rom() -> GameBoy {
    let mut gb = GameBoy::new();
    gb.load_cart(common::nop_cart());
    gb
}

#[test]
fn one_frame_produces_one_vblank_and_one_render() {
    let mut gb = gb_with_nop_rom();
    assert!(!gb.take_frame_ready());

    gb.run_for(FRAME_CYCLES);
    assert_eq!(gb.mmu.if_reg & 0x01, 0x01, "VBlank latched in IF");
    assert!(gb.take_frame_ready());
    assert!(!gb.take_frame_ready(), "exactly one render per frame");
    assert_eq!(gb.mmu.ppu.ly, 0, "LY wrapped back to the top of the frame");
}

#[test]
fn clock_excess_carries_between_calls() {
    let mut gb = gb_with_nop_rom();
    for _ in 0..10 {
        gb.run_for(FRAME_CYCLES);
        assert!(gb.cpu.clock >= 0);
        assert!(
            gb.cpu.clock < FRAME_CYCLES,
            "clock {} should be the small overshoot only",
            gb.cpu.clock
        );
    }
}

#[test]
fn steady_state_framerate() {
    let mut gb = gb_with_nop_rom();
    gb.run_for(FRAME_CYCLES);
    // Ten more frames: one render and one VBlank latch per frame.
    for frame in 0..10 {
        gb.mmu.if_reg = 0;
        gb.take_frame_ready();
        gb.run_for(FRAME_CYCLES);
        assert_eq!(gb.mmu.if_reg & 0x01, 0x01, "frame {frame}");
        assert!(gb.take_frame_ready(), "frame {frame}");
    }
}

#[test]
fn halt_bills_cycles_and_does_not_hang() {
    let mut gb = gb_with_nop_rom();
    // HALT with nothing pending: the run loop idles at 4 cycles per step.
    gb.mmu.write_byte(0xC000, 0x76);
    gb.cpu.pc = 0xC000;
    gb.run_for(1000);
    assert!(gb.cpu.halted);
    assert_eq!(gb.cpu.pc, 0xC001);
}

#[test]
fn halted_cpu_wakes_on_timer_interrupt() {
    let mut gb = gb_with_nop_rom();
    gb.mmu.write_byte(0xC000, 0x76);
    gb.cpu.pc = 0xC000;
    gb.mmu.ie_reg = 0x04;
    gb.mmu.write_byte(0xFF06, 0x00);
    gb.mmu.write_byte(0xFF07, 0x05); // enable, 16-cycle clock

    // TIMA overflows after 256 * 16 cycles and the pending interrupt clears
    // the halt even with IME disabled.
    gb.run_for(6000);
    assert!(!gb.cpu.halted);
}

#[test]
fn vblank_interrupt_dispatches_when_enabled() {
    let mut gb = gb_with_nop_rom();
    gb.mmu.ie_reg = 0x01;
    gb.cpu.ime = dotmatrix_core::cpu::Ime::Enabled;
    // The vector at 0x0040 holds NOPs in the synthetic ROM, so the handler
    // just keeps executing after dispatch.

    gb.run_for(FRAME_CYCLES);
    // The interrupt fired: IF was consumed again by the dispatcher.
    assert_eq!(gb.mmu.if_reg & 0x01, 0x00);
}

#[test]
fn joypad_press_latches_interrupt_when_selected() {
    let mut gb = gb_with_nop_rom();
    gb.mmu.if_reg = 0;
    gb.mmu.write_byte(0xFF00, 0x10); // select buttons (bit 5 clear)

    gb.press_button(Button::Start);
    assert_eq!(gb.mmu.if_reg & 0x10, 0x10);
    assert_eq!(gb.mmu.read_byte(0xFF00) & 0x08, 0, "Start reads low");

    gb.release_button(Button::Start);
    assert_eq!(gb.mmu.read_byte(0xFF00) & 0x0F, 0x0F);
}

#[test]
fn joypad_unselected_presses_do_not_interrupt() {
    let mut gb = gb_with_nop_rom();
    gb.mmu.if_reg = 0;
    gb.mmu.write_byte(0xFF00, 0x20); // select directions only

    gb.press_button(Button::A);
    assert_eq!(gb.mmu.if_reg & 0x10, 0);

    gb.press_button(Button::Left);
    assert_eq!(gb.mmu.if_reg & 0x10, 0x10);
    assert_eq!(gb.mmu.read_byte(0xFF00) & 0x02, 0, "Left reads low");
}

#[test]
fn joypad_select_write_replaces_group() {
    let mut gb = gb_with_nop_rom();
    gb.press_button(Button::A);
    gb.mmu.write_byte(0xFF00, 0x10); // buttons visible
    assert_eq!(gb.mmu.read_byte(0xFF00) & 0x01, 0, "A visible");
    gb.mmu.write_byte(0xFF00, 0x20); // directions visible now
    assert_eq!(gb.mmu.read_byte(0xFF00) & 0x0F, 0x0F, "A no longer visible");
}

#[test]
fn interrupt_latency_is_visible_after_subsystem_fanout() {
    // Interrupts raised by a subsystem mid-step reach the CPU at the same
    // step's dispatch phase, not during instruction execution.
    let mut gb = gb_with_nop_rom();
    gb.mmu.ie_reg = 0x04;
    gb.cpu.ime = dotmatrix_core::cpu::Ime::Enabled;
    gb.mmu.write_byte(0xFF07, 0x05); // enable, 16-cycle clock; TMA stays 0

    // TIMA overflows once at 4096 cycles; the next overflow would land at
    // 8192, past this window.
    gb.run_for(4200);
    assert_eq!(gb.mmu.if_reg & 0x04, 0, "timer interrupt was serviced");
}
