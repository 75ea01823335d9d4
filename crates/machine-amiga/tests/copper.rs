mod common;

use common::*;
use machine_amiga::commodore_agnus_ocs::copper::{self, State};
use machine_amiga::emu_core::{Observable, Value};

const COPEN: u16 = 0x0080;
const LIST: u32 = 0x2000;

fn start_copper(amiga: &mut machine_amiga::Amiga<ScriptCpu>, list: &[u16]) {
    poke_words(amiga, LIST, list);
    write_custom(amiga, copper::COP1LCH, (LIST >> 16) as u16);
    write_custom(amiga, copper::COP1LCL, LIST as u16);
    write_custom(amiga, copper::COPJMP1, 0);
    write_custom(amiga, DMACON, SET | DMAEN | COPEN);
}

#[test]
fn wait_then_move_changes_colour_on_that_line() {
    let mut amiga = machine(ScriptCpu::default());
    start_copper(
        &mut amiga,
        &[0x4001, 0xFFFE, 0x0180, 0x0F00, 0xFFFF, 0xFFFE],
    );

    run_to_line(&mut amiga, 0x3F);
    assert_eq!(amiga.bus.custom.denise.palette()[0], 0x0000);
    assert_eq!(amiga.bus.custom.agnus.copper.state(), State::Waiting);

    run_to_line(&mut amiga, 0x41);
    assert_eq!(amiga.query("denise.palette.0"), Some(Value::U16(0x0F00)));
    assert_eq!(amiga.bus.custom.agnus.copper.state(), State::Waiting);
}

#[test]
fn copper_move_can_request_an_interrupt() {
    let mut amiga = machine(ScriptCpu::default());
    // INTREQ SET|COPER, then wait forever.
    start_copper(&mut amiga, &[0x009C, 0x8010, 0xFFFF, 0xFFFE]);
    tick_ccks(&mut amiga, 20);
    assert_eq!(amiga.bus.custom.paula.interrupts.intreq() & 0x0010, 0x0010);
}

#[test]
fn protected_move_halts_until_next_frame() {
    let mut amiga = machine(ScriptCpu::default());
    // BLTCON0 needs COPCON danger; the colour write after it never runs.
    start_copper(&mut amiga, &[0x0040, 0x09F0, 0x0180, 0x0F00]);
    tick_ccks(&mut amiga, 40);
    assert_eq!(amiga.bus.custom.agnus.copper.state(), State::Halted);
    assert_eq!(amiga.bus.custom.agnus.blitter.bltcon0(), 0);
    assert_eq!(amiga.bus.custom.denise.palette()[0], 0);

    // Frame start restarts from COP1LC.
    run_to_line(&mut amiga, 0);
    assert_eq!(amiga.bus.custom.agnus.copper.pc(), LIST);
}

#[test]
fn danger_bit_opens_blitter_registers() {
    let mut amiga = machine(ScriptCpu::default());
    write_custom(&mut amiga, copper::COPCON, 0x0002);
    start_copper(&mut amiga, &[0x0040, 0x09F0, 0xFFFF, 0xFFFE]);
    tick_ccks(&mut amiga, 40);
    assert_eq!(amiga.bus.custom.agnus.blitter.bltcon0(), 0x09F0);
}

#[test]
fn copjmp2_switches_lists() {
    let mut amiga = machine(ScriptCpu::default());
    poke_words(&mut amiga, 0x3000, &[0x0182, 0x00F0, 0xFFFF, 0xFFFE]);
    write_custom(&mut amiga, copper::COP2LCH, 0);
    write_custom(&mut amiga, copper::COP2LCL, 0x3000);
    // COPJMP2 strobed from the first list.
    start_copper(&mut amiga, &[0x008A, 0x0000, 0xFFFF, 0xFFFE]);
    tick_ccks(&mut amiga, 40);
    assert_eq!(amiga.bus.custom.denise.palette()[1], 0x00F0);
    assert_eq!(amiga.query("copper.cop2lc"), Some(Value::U32(0x3000)));
}
