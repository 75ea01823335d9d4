//! The CPU's view of the Amiga bus.

use emu_core::{BusError, CpuBus, Size};

use crate::bus::AmigaBus;

/// Borrowed bus handed to a CPU core for one instruction.
///
/// Counts the clocks the core charges through `sync` so that whatever it
/// did not charge can be settled when the instruction ends.
pub struct CpuAdapter<'a> {
    bus: &'a mut AmigaBus,
    charged: u32,
}

impl<'a> CpuAdapter<'a> {
    pub fn new(bus: &'a mut AmigaBus) -> Self {
        Self { bus, charged: 0 }
    }

    /// Clocks charged so far.
    #[must_use]
    pub fn charged(&self) -> u32 {
        self.charged
    }

    /// End the instruction: run the chipset for any of `cycles` the core did
    /// not charge itself.
    pub fn settle(self, cycles: u32) {
        if cycles > self.charged {
            self.bus.sync(cycles - self.charged);
        }
    }

    /// End an instruction that reports no clock count: a reset, or one
    /// cut short by a bus error. The chipset already ran every clock the
    /// core charged or spent in bus slots, so nothing carries over to the
    /// next instruction.
    pub fn abandon(self) {
        self.bus.drop_cpu_debt();
    }
}

impl CpuBus for CpuAdapter<'_> {
    fn fetch(&mut self, pc: u32, addr: u32, size: Size) -> Result<u32, BusError> {
        self.bus.cpu_read(pc, addr, size)
    }

    fn read(&mut self, pc: u32, addr: u32, size: Size) -> Result<u32, BusError> {
        self.bus.cpu_read(pc, addr, size)
    }

    fn write(&mut self, pc: u32, addr: u32, size: Size, value: u32) -> Result<(), BusError> {
        self.bus.cpu_write(pc, addr, size, value)
    }

    fn sync(&mut self, cycles: u32) {
        self.charged += cycles;
        self.bus.sync(cycles);
    }

    fn interrupt_level(&self) -> u8 {
        self.bus.interrupt_level()
    }
}
