#![allow(dead_code)]

use std::collections::VecDeque;

use machine_amiga::commodore_agnus_ocs::ChipMemory;
use machine_amiga::emu_core::{BusError, Cpu, CpuBus, Size};
use machine_amiga::memory::ROM_BASE;
use machine_amiga::peripherals::{DiskDrive, DiskLines, DriveStatus};
use machine_amiga::{Amiga, AmigaConfig, AmigaModel};

pub const DMACON: u16 = 0x096;
pub const INTENA: u16 = 0x09A;
pub const INTREQ: u16 = 0x09C;
pub const DMAEN: u16 = 0x0200;
pub const SET: u16 = 0x8000;

/// 256K ROM whose reset vectors point at `ROM_BASE + 8`.
pub fn rom() -> Vec<u8> {
    let mut rom = vec![0u8; 256 * 1024];
    rom[0..4].copy_from_slice(&0x0007_FFF0u32.to_be_bytes());
    rom[4..8].copy_from_slice(&(ROM_BASE + 8).to_be_bytes());
    rom
}

pub fn config() -> AmigaConfig {
    AmigaConfig::preset(AmigaModel::A500, rom())
}

pub fn machine<C: Cpu>(cpu: C) -> Amiga<C> {
    machine_with(cpu, config())
}

pub fn machine_with<C: Cpu>(cpu: C, config: AmigaConfig) -> Amiga<C> {
    Amiga::new(cpu, config).expect("test configuration is valid")
}

pub fn write_custom<C: Cpu>(amiga: &mut Amiga<C>, offset: u16, value: u16) {
    amiga.bus.custom.write(0, offset, value);
}

pub fn poke_words<C: Cpu>(amiga: &mut Amiga<C>, addr: u32, words: &[u16]) {
    for (i, &word) in words.iter().enumerate() {
        amiga.bus.memory.chip.write_word(addr + 2 * i as u32, word);
    }
}

/// Tick colour clocks until the beam sits at the start of `vpos`.
pub fn run_to_line<C: Cpu>(amiga: &mut Amiga<C>, vpos: u16) {
    loop {
        let beam = &amiga.bus.custom.agnus.beam;
        if beam.vpos() == vpos && beam.hpos() == 0 {
            return;
        }
        amiga.bus.tick_cck();
    }
}

pub fn tick_ccks<C: Cpu>(amiga: &mut Amiga<C>, ccks: u32) {
    for _ in 0..ccks {
        amiga.bus.tick_cck();
    }
}

/// One bus operation of a scripted instruction.
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Read(u32, Size),
    Write(u32, Size, u32),
    /// Internal clocks charged through `sync`.
    Idle(u32),
}

/// CPU stand-in that replays one list of bus operations per step and
/// reports a fixed clock count for each.
#[derive(Default)]
pub struct ScriptCpu {
    pub pc: u32,
    pub level: u8,
    pub steps: VecDeque<(Vec<Op>, u32)>,
    pub reads: Vec<u32>,
}

impl ScriptCpu {
    pub fn push(&mut self, ops: Vec<Op>, cycles: u32) {
        self.steps.push_back((ops, cycles));
    }
}

impl Cpu for ScriptCpu {
    type Registers = u32;

    fn step<B: CpuBus>(&mut self, bus: &mut B) -> Result<u32, BusError> {
        let Some((ops, cycles)) = self.steps.pop_front() else {
            return Ok(4);
        };
        for op in ops {
            match op {
                Op::Read(addr, size) => {
                    let value = bus.read(self.pc, addr, size)?;
                    self.reads.push(value);
                }
                Op::Write(addr, size, value) => bus.write(self.pc, addr, size, value)?,
                Op::Idle(cycles) => bus.sync(cycles),
            }
        }
        Ok(cycles)
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    fn registers(&self) -> u32 {
        self.pc
    }

    fn set_registers(&mut self, registers: &u32) {
        self.pc = *registers;
    }

    fn set_interrupt_level(&mut self, level: u8) {
        self.level = level;
    }

    fn reset<B: CpuBus>(&mut self, bus: &mut B) -> Result<(), BusError> {
        self.pc = bus.read(0, 4, Size::Long)?;
        Ok(())
    }
}

/// Drive that always has the next queued word under the head.
#[derive(Default)]
pub struct QueueDrive {
    pub words: VecDeque<u16>,
    pub written: Vec<u16>,
}

impl DiskDrive for QueueDrive {
    fn insert(&mut self, tracks: Vec<Vec<u8>>, _write_protected: bool) {
        self.words = tracks
            .concat()
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
    }

    fn eject(&mut self) {
        self.words.clear();
    }

    fn has_disk(&self) -> bool {
        !self.words.is_empty()
    }

    fn set_control(&mut self, _lines: DiskLines) {}

    fn status(&self) -> DriveStatus {
        DriveStatus::default()
    }

    fn tick(&mut self) -> bool {
        false
    }

    fn word_ready(&self) -> bool {
        !self.words.is_empty()
    }

    fn read_word(&mut self) -> Option<u16> {
        self.words.pop_front()
    }

    fn write_word(&mut self, word: u16) {
        self.written.push(word);
    }
}
