//! CIA-A and CIA-B as the Amiga wires them.
//!
//! Both are plain 8520s. They differ only in which half of the data bus
//! they sit on, which interrupt line they drive and what hangs off their
//! ports, so each wrapper owns a chip and a lane decoder and exposes its
//! port wiring as typed accessors. CIA-B can instead be clocked from its
//! own thread through the tick barrier.

use std::sync::Arc;

use emu_core::{AddressRange, BusError, MemoryMapped, Size, Value};
use mos_cia_8520::{CRA_SPMODE, Cia8520, reg};

use crate::barrier::{RemoteCia, TickBarrier};
use crate::memory::{CIA_A_BASE, CIA_B_BASE, CIA_WINDOW};
use crate::peripherals::{DiskLines, DriveStatus, Mouse};

/// Data bus half a CIA is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// D0-D7, odd addresses (CIA-A).
    Low,
    /// D8-D15, even addresses (CIA-B).
    High,
}

impl Lane {
    const fn decodes(self, addr: u32) -> bool {
        match self {
            Lane::Low => addr & 1 == 1,
            Lane::High => addr & 1 == 0,
        }
    }

    /// Place a register byte on this lane; the other half floats high.
    const fn word(self, byte: u8) -> u32 {
        match self {
            Lane::Low => 0xFF00 | byte as u32,
            Lane::High => (byte as u32) << 8 | 0x00FF,
        }
    }

    const fn byte(self, word: u32) -> u8 {
        match self {
            Lane::Low => word as u8,
            Lane::High => (word >> 8) as u8,
        }
    }
}

/// Register number from address bits 8-11.
#[must_use]
pub const fn register_of(addr: u32) -> u8 {
    ((addr >> 8) & 0x0F) as u8
}

#[derive(Debug, Clone)]
struct LaneDecoder {
    ranges: Vec<AddressRange>,
    lane: Lane,
}

impl LaneDecoder {
    fn new(base: u32, lane: Lane) -> Self {
        Self {
            ranges: AddressRange::new(base, CIA_WINDOW).into_iter().collect(),
            lane,
        }
    }

    fn decodes(&self, addr: u32) -> bool {
        self.lane.decodes(addr) && self.ranges.iter().any(|r| r.contains(addr))
    }

    fn read(&self, chip: &mut Cia8520, addr: u32, size: Size) -> Result<u32, BusError> {
        BusError::check_alignment(addr, size)?;
        let register = register_of(addr);
        match size {
            Size::Byte if self.lane.decodes(addr) => Ok(u32::from(chip.read(register))),
            Size::Byte => Ok(0xFF),
            Size::Word => Ok(self.lane.word(chip.read(register))),
            Size::Long | Size::Extended => Err(BusError::InvalidSize { addr, size }),
        }
    }

    /// Returns the register written, if the access reached the chip.
    fn write(
        &self,
        chip: &mut Cia8520,
        addr: u32,
        size: Size,
        value: u32,
    ) -> Result<Option<u8>, BusError> {
        BusError::check_alignment(addr, size)?;
        let register = register_of(addr);
        let byte = match size {
            Size::Byte if self.lane.decodes(addr) => value as u8,
            Size::Byte => return Ok(None),
            Size::Word => self.lane.byte(value),
            Size::Long | Size::Extended => return Err(BusError::InvalidSize { addr, size }),
        };
        chip.write(register, byte);
        Ok(Some(register))
    }
}

/// CIA-A at $BFE001: PORTS interrupt, TOD on vertical sync, keyboard
/// serial port, overlay and power LED on port A.
#[derive(Debug, Clone)]
pub struct CiaA {
    pub chip: Cia8520,
    decoder: LaneDecoder,
    handshake: bool,
}

impl Default for CiaA {
    fn default() -> Self {
        Self::new()
    }
}

impl CiaA {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chip: Cia8520::new(),
            decoder: LaneDecoder::new(CIA_A_BASE, Lane::Low),
            handshake: false,
        }
    }

    pub fn reset(&mut self) {
        self.chip.reset();
        self.handshake = false;
    }

    /// PA0. Undriven pins float high, so the overlay is on after reset.
    #[must_use]
    pub fn overlay(&self) -> bool {
        self.chip.port_a_pins() & 0x01 != 0
    }

    /// PA1 low lights the LED (and disables the audio filter).
    #[must_use]
    pub fn power_led(&self) -> bool {
        self.chip.port_a_pins() & 0x02 == 0
    }

    /// True once after software switched the serial port to output, which
    /// is how the keyboard handshake is signalled.
    pub fn take_handshake(&mut self) -> bool {
        std::mem::take(&mut self.handshake)
    }

    /// Drive PA7-PA2: fire buttons and the disk status lines.
    pub fn set_inputs(&mut self, drive: DriveStatus, mouse: &Mouse) {
        let pins = mouse.apply_to_port_a(0xFF);
        self.chip.set_port_a_input(drive.apply_to_port_a(pins));
    }
}

impl MemoryMapped for CiaA {
    fn ranges(&self) -> &[AddressRange] {
        &self.decoder.ranges
    }

    fn is_mapped(&self, addr: u32) -> bool {
        self.decoder.decodes(addr)
    }

    fn read(&mut self, addr: u32, size: Size) -> Result<u32, BusError> {
        self.decoder.read(&mut self.chip, addr, size)
    }

    fn write(&mut self, addr: u32, size: Size, value: u32) -> Result<(), BusError> {
        let spmode_before = self.chip.peek(reg::CRA) & CRA_SPMODE;
        if self.decoder.write(&mut self.chip, addr, size, value)? == Some(reg::CRA) {
            let spmode_after = self.chip.peek(reg::CRA) & CRA_SPMODE;
            if spmode_before == 0 && spmode_after != 0 {
                self.handshake = true;
            }
        }
        Ok(())
    }
}

/// Where CIA-B's chip state lives.
#[derive(Debug)]
enum CiaBCore {
    /// Clocked by the bus every colour clock.
    Inline(Cia8520),
    /// Clocked from its own thread at each line rendezvous.
    Threaded(RemoteCia),
}

impl CiaBCore {
    fn with_chip<R>(&mut self, f: impl FnOnce(&mut Cia8520) -> R) -> R {
        match self {
            CiaBCore::Inline(chip) => f(chip),
            CiaBCore::Threaded(remote) => remote.with_cia(f),
        }
    }
}

/// CIA-B at $BFD000: EXTER interrupt, TOD on horizontal sync, disk
/// control lines on port B, disk index on FLAG.
#[derive(Debug)]
pub struct CiaB {
    core: CiaBCore,
    decoder: LaneDecoder,
}

impl Default for CiaB {
    fn default() -> Self {
        Self::new()
    }
}

impl CiaB {
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: CiaBCore::Inline(Cia8520::new()),
            decoder: LaneDecoder::new(CIA_B_BASE, Lane::High),
        }
    }

    /// A CIA-B whose timers run on a thread registered on `barrier`.
    #[must_use]
    pub fn threaded(barrier: &Arc<TickBarrier>) -> Self {
        Self {
            core: CiaBCore::Threaded(RemoteCia::spawn(barrier, Cia8520::new())),
            decoder: LaneDecoder::new(CIA_B_BASE, Lane::High),
        }
    }

    #[must_use]
    pub fn is_threaded(&self) -> bool {
        matches!(self.core, CiaBCore::Threaded(_))
    }

    /// Run `f` against the chip. A threaded chip is locked for the call.
    pub fn with_chip<R>(&mut self, f: impl FnOnce(&mut Cia8520) -> R) -> R {
        self.core.with_chip(f)
    }

    /// Read-only view of the chip.
    pub fn inspect<R>(&self, f: impl FnOnce(&Cia8520) -> R) -> R {
        match &self.core {
            CiaBCore::Inline(chip) => f(chip),
            CiaBCore::Threaded(remote) => remote.with_cia(|chip| f(chip)),
        }
    }

    /// Count E-clocks for an inline chip. A threaded chip gets its cycles
    /// from the barrier instead.
    pub fn clock(&mut self, cycles: u32) {
        if let CiaBCore::Inline(chip) = &mut self.core {
            chip.emulate(cycles);
        }
    }

    pub fn reset(&mut self) {
        self.with_chip(Cia8520::reset);
    }

    #[must_use]
    pub fn irq_active(&self) -> bool {
        self.inspect(Cia8520::irq_active)
    }

    #[must_use]
    pub fn disk_lines(&self) -> DiskLines {
        DiskLines::from_port_b(self.inspect(Cia8520::port_b_pins))
    }
}

impl MemoryMapped for CiaB {
    fn ranges(&self) -> &[AddressRange] {
        &self.decoder.ranges
    }

    fn is_mapped(&self, addr: u32) -> bool {
        self.decoder.decodes(addr)
    }

    fn read(&mut self, addr: u32, size: Size) -> Result<u32, BusError> {
        self.core.with_chip(|chip| self.decoder.read(chip, addr, size))
    }

    fn write(&mut self, addr: u32, size: Size, value: u32) -> Result<(), BusError> {
        self.core
            .with_chip(|chip| self.decoder.write(chip, addr, size, value))?;
        Ok(())
    }
}

pub(crate) const CIA_FIELDS: [&str; 10] = [
    "pra", "prb", "timer_a", "timer_b", "icr_pending", "icr_mask", "cra", "crb", "tod",
    "irq",
];

/// Side-effect free view for the observability paths.
pub(crate) fn query(chip: &Cia8520, field: &str) -> Option<Value> {
    Some(match field {
        "pra" => Value::U8(chip.peek(reg::PRA)),
        "prb" => Value::U8(chip.peek(reg::PRB)),
        "timer_a" => Value::U16(chip.timer_a()),
        "timer_b" => Value::U16(chip.timer_b()),
        "icr_pending" => Value::U8(chip.icr_pending()),
        "icr_mask" => Value::U8(chip.icr_mask()),
        "cra" => Value::U8(chip.peek(reg::CRA)),
        "crb" => Value::U8(chip.peek(reg::CRB)),
        "tod" => Value::U32(chip.tod_counter()),
        "irq" => Value::Bool(chip.irq_active()),
        _ => return None,
    })
}
