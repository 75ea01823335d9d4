//! Amiga chipset composition.
//!
//! Agnus, Paula, Denise's registers and the two CIAs on one bus, driven one
//! colour clock at a time. The 68000 is external: anything implementing
//! [`emu_core::Cpu`] runs against [`Amiga`], which stalls it for chip bus
//! slots it loses to DMA.

pub mod activity;
pub mod barrier;
pub mod bus;
pub mod cia;
pub mod config;
pub mod context;
pub mod cpu_adapter;
pub mod custom;
pub mod denise;
pub mod error;
pub mod memory;
pub mod peripherals;
pub mod snapshot;

use std::sync::Arc;

use emu_core::{BusError, Cpu, Observable, Size, Value};

pub use crate::activity::{ActivityRecorder, DmaActivity};
pub use crate::barrier::{BarrierPolicy, RemoteCia, TickBarrier, TickWaiter};
pub use crate::bus::{AmigaBus, DeviceKind};
pub use crate::config::{AmigaConfig, AmigaModel};
pub use crate::context::EmulatorContext;
pub use crate::cpu_adapter::CpuAdapter;
pub use crate::error::{AmigaError, BarrierError, ConfigError, SnapshotError};
pub use crate::snapshot::{Persist, Snapshot};
pub use commodore_agnus_ocs;
pub use commodore_paula_8364;
pub use emu_core;
pub use mos_cia_8520;

/// A whole machine: a CPU core and the chipset it runs on.
pub struct Amiga<C: Cpu> {
    pub cpu: C,
    pub bus: AmigaBus,
    config: AmigaConfig,
}

impl<C: Cpu> Amiga<C> {
    /// Validate `config` and build the machine. Call [`Amiga::reset`] before
    /// stepping.
    pub fn new(cpu: C, config: AmigaConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let context = Arc::new(EmulatorContext::new());
        let barrier = TickBarrier::new(config.barrier_policy);
        let bus = AmigaBus::new(&config, context, barrier)?;
        Ok(Self { cpu, bus, config })
    }

    #[must_use]
    pub fn config(&self) -> &AmigaConfig {
        &self.config
    }

    /// Shared state for the host (LED, overlay, frame count).
    #[must_use]
    pub fn context(&self) -> Arc<EmulatorContext> {
        Arc::clone(self.bus.context())
    }

    /// Rendezvous point for consumers on other threads.
    #[must_use]
    pub fn barrier(&self) -> Arc<TickBarrier> {
        Arc::clone(self.bus.barrier())
    }

    #[must_use]
    pub fn activity(&self) -> &ActivityRecorder {
        &self.bus.activity
    }

    /// Power-on reset: chipset to its documented state, then the CPU loads
    /// its vectors through the overlaid ROM.
    pub fn reset(&mut self) -> Result<(), BusError> {
        self.bus.reset();
        let mut adapter = CpuAdapter::new(&mut self.bus);
        let result = self.cpu.reset(&mut adapter);
        adapter.abandon();
        result
    }

    /// Run one instruction. Returns CPU clocks including wait states.
    pub fn step(&mut self) -> Result<u32, BusError> {
        self.cpu.set_interrupt_level(self.bus.interrupt_level());
        let mut adapter = CpuAdapter::new(&mut self.bus);
        match self.cpu.step(&mut adapter) {
            Ok(cycles) => {
                adapter.settle(cycles);
                Ok(cycles + self.bus.take_waits())
            }
            Err(error) => {
                adapter.abandon();
                Err(error)
            }
        }
    }

    /// Step until the beam wraps to the next frame. Returns the CPU clocks
    /// it took.
    pub fn run_frame(&mut self) -> Result<u64, AmigaError> {
        let frame = self.bus.context().frames();
        let mut cycles = 0u64;
        while self.bus.context().frames() == frame {
            cycles += u64::from(self.step()?);
            if let Some(fault) = self.bus.take_barrier_fault() {
                return Err(fault.into());
            }
        }
        Ok(cycles)
    }

    /// Port 0 mouse motion and buttons.
    pub fn mouse_input(&mut self, dx: i16, dy: i16, left: bool, right: bool) {
        self.bus.update_mouse(dx, dy, left, right);
    }

    /// Raw Amiga key code, pressed or released.
    pub fn key_event(&mut self, code: u8, pressed: bool) {
        self.bus.keyboard.key_event(code, pressed);
    }

    /// Raw MFM tracks into DF0:, indexed by `cylinder * 2 + head`.
    pub fn insert_disk(&mut self, tracks: Vec<Vec<u8>>, write_protected: bool) {
        self.bus.drive.insert(tracks, write_protected);
    }

    pub fn eject_disk(&mut self) {
        self.bus.drive.eject();
    }

    pub fn snapshot(&self) -> Result<Snapshot, SnapshotError> {
        Snapshot::capture(&self.bus)
    }

    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        snapshot.restore(&mut self.bus)
    }
}

/// `$hex`, `0xhex` or decimal.
fn parse_address(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = text.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn query_bus(bus: &AmigaBus, path: &str) -> Option<Value> {
    let custom = &bus.custom;
    let agnus = &custom.agnus;
    let paula = &custom.paula;
    if let Some(rest) = path.strip_prefix("agnus.") {
        return Some(match rest {
            "vpos" => Value::U16(agnus.beam.vpos()),
            "hpos" => Value::U16(agnus.beam.hpos()),
            "ticks" => Value::U64(agnus.beam.ticks()),
            "dmacon" => Value::U16(agnus.dmacon()),
            "bplcon0" => Value::U16(agnus.bplcon0()),
            "diwstrt" => Value::U16(agnus.diwstrt()),
            "diwstop" => Value::U16(agnus.diwstop()),
            "ddfstrt" => Value::U16(agnus.ddfstrt()),
            "ddfstop" => Value::U16(agnus.ddfstop()),
            "dskpt" => Value::U32(agnus.disk_pointer()),
            "last_grant" => Value::Text(format!("{:?}", agnus.arbiter.last_grant())),
            _ => return None,
        });
    }
    if let Some(rest) = path.strip_prefix("copper.") {
        let copper = &agnus.copper;
        return Some(match rest {
            "pc" => Value::U32(copper.pc()),
            "cop1lc" => Value::U32(copper.cop1lc()),
            "cop2lc" => Value::U32(copper.cop2lc()),
            "state" => Value::Text(format!("{:?}", copper.state())),
            _ => return None,
        });
    }
    if let Some(rest) = path.strip_prefix("blitter.") {
        let blitter = &agnus.blitter;
        return Some(match rest {
            "busy" => Value::Bool(blitter.busy()),
            "bltcon0" => Value::U16(blitter.bltcon0()),
            "bltcon1" => Value::U16(blitter.bltcon1()),
            "bltsize" => Value::U16(blitter.bltsize()),
            _ => return None,
        });
    }
    if let Some(rest) = path.strip_prefix("paula.audio.") {
        let (channel, field) = rest.split_once('.')?;
        let channel = paula.audio.channel(channel.parse().ok()?)?;
        return Some(match field {
            "period" => Value::U16(channel.period_register()),
            "volume" => Value::U8(channel.volume()),
            "sample" => Value::U8(channel.sample() as u8),
            _ => return None,
        });
    }
    if let Some(rest) = path.strip_prefix("paula.") {
        return Some(match rest {
            "intena" => Value::U16(paula.interrupts.intena()),
            "intreq" => Value::U16(paula.interrupts.intreq()),
            "ipl" => Value::U8(paula.interrupt_level()),
            "adkcon" => Value::U16(paula.adkcon()),
            "dsklen" => Value::U16(paula.disk.dsklen()),
            _ => return None,
        });
    }
    if let Some(rest) = path.strip_prefix("denise.palette.") {
        let index: usize = rest.parse().ok()?;
        return custom.denise.palette().get(index).copied().map(Value::U16);
    }
    if let Some(rest) = path.strip_prefix("cia_a.") {
        return cia::query(&bus.cia_a.chip, rest);
    }
    if let Some(rest) = path.strip_prefix("cia_b.") {
        return bus.cia_b.inspect(|chip| cia::query(chip, rest));
    }
    if let Some(rest) = path.strip_prefix("memory.") {
        let value = bus.peek(parse_address(rest)?, Size::Byte)?;
        return Some(Value::U8(value as u8));
    }
    let context = bus.context();
    Some(match path {
        "context.frames" => Value::U64(context.frames()),
        "context.power_led" => Value::Bool(context.power_led()),
        "context.overlay" => Value::Bool(context.overlay()),
        "barrier.generation" => Value::U64(bus.barrier().generation()),
        "barrier.missed_acks" => Value::U64(bus.barrier().missed_acks()),
        _ => return None,
    })
}

impl<C: Cpu> Observable for Amiga<C> {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "cpu.pc" => Some(Value::U32(self.cpu.pc())),
            _ => query_bus(&self.bus, path),
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.pc",
            "agnus.vpos",
            "agnus.hpos",
            "agnus.ticks",
            "agnus.dmacon",
            "agnus.bplcon0",
            "agnus.diwstrt",
            "agnus.diwstop",
            "agnus.ddfstrt",
            "agnus.ddfstop",
            "agnus.dskpt",
            "agnus.last_grant",
            "copper.pc",
            "copper.cop1lc",
            "copper.cop2lc",
            "copper.state",
            "blitter.busy",
            "blitter.bltcon0",
            "blitter.bltcon1",
            "blitter.bltsize",
            "paula.intena",
            "paula.intreq",
            "paula.ipl",
            "paula.adkcon",
            "paula.dsklen",
            "paula.audio.<0-3>.period",
            "paula.audio.<0-3>.volume",
            "paula.audio.<0-3>.sample",
            "denise.palette.<0-31>",
            "cia_a.<pra|prb|timer_a|timer_b|icr_pending|icr_mask|cra|crb|tod|irq>",
            "cia_b.<pra|prb|timer_a|timer_b|icr_pending|icr_mask|cra|crb|tod|irq>",
            "memory.<address>",
            "context.frames",
            "context.power_led",
            "context.overlay",
            "barrier.generation",
            "barrier.missed_acks",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::CpuBus;

    /// Burns a fixed number of clocks per step without touching the bus.
    #[derive(Default)]
    struct IdleCpu {
        pc: u32,
        level: u8,
        cycles: u32,
    }

    impl Cpu for IdleCpu {
        type Registers = u32;

        fn step<B: CpuBus>(&mut self, _bus: &mut B) -> Result<u32, BusError> {
            Ok(self.cycles)
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

    fn machine(cycles: u32) -> Amiga<IdleCpu> {
        let mut rom = vec![0u8; 0x40000];
        rom[4..8].copy_from_slice(&[0x00, 0xFC, 0x00, 0xD2]);
        let config = AmigaConfig::preset(AmigaModel::A500, rom);
        let cpu = IdleCpu {
            cycles,
            ..IdleCpu::default()
        };
        Amiga::new(cpu, config).expect("A500 preset is valid")
    }

    #[test]
    fn reset_loads_pc_through_overlay() {
        let mut amiga = machine(4);
        amiga.reset().expect("vectors readable");
        assert_eq!(amiga.cpu.pc(), 0x00FC_00D2);
        assert_eq!(amiga.query("cpu.pc"), Some(Value::U32(0x00FC_00D2)));
    }

    #[test]
    fn run_frame_stops_at_the_wrap() {
        let mut amiga = machine(8);
        let cycles = amiga.run_frame().expect("no barrier consumers");
        assert_eq!(cycles, 2 * 227 * 312);
        assert_eq!(amiga.context().frames(), 1);
        assert_eq!(amiga.query("agnus.vpos"), Some(Value::U16(0)));
    }

    #[test]
    fn step_presents_enabled_interrupts() {
        let mut amiga = machine(4);
        amiga.bus.custom.paula.interrupts.write_intena(0xC008);
        amiga.bus.custom.paula.interrupts.write_intreq(0x8008);
        amiga.step().expect("idle step");
        assert_eq!(amiga.cpu.level, 2);
    }

    #[test]
    fn vertb_is_requested_each_frame() {
        let mut amiga = machine(8);
        amiga.run_frame().expect("frame");
        let intreq = amiga.query("paula.intreq").and_then(|v| v.as_u64());
        assert_eq!(intreq.map(|r| r & 0x0020), Some(0x0020));
    }

    #[test]
    fn observable_paths_resolve() {
        let mut amiga = machine(4);
        amiga.bus.custom.write(0, 0x182, 0x0F00);
        assert_eq!(amiga.query("denise.palette.1"), Some(Value::U16(0x0F00)));
        assert_eq!(amiga.query("denise.palette.32"), None);
        assert_eq!(amiga.query("memory.$F80004"), Some(Value::U8(0x00)));
        assert_eq!(amiga.query("memory.0xF80005"), Some(Value::U8(0xFC)));
        assert_eq!(amiga.query("context.overlay"), Some(Value::Bool(true)));
        assert!(amiga.query("cia_a.timer_a").is_some());
        assert_eq!(amiga.query("agnus.nope"), None);
        assert!(amiga.query_paths().contains(&"paula.intena"));
    }
}
