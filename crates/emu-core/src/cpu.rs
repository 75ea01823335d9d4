//! CPU boundary contract.
//!
//! The instruction interpreter lives outside this workspace. Any core that
//! implements [`Cpu`] can be plugged into the chipset through a [`CpuBus`].

use crate::{BusError, Size};

/// The bus a CPU core sees.
///
/// Every access carries the address of the instruction that issued it, for
/// tracing. Accesses are synchronous: when a call returns, the chipset has
/// already advanced past any DMA cycles that delayed it.
pub trait CpuBus {
    /// Instruction-stream read.
    fn fetch(&mut self, pc: u32, addr: u32, size: Size) -> Result<u32, BusError>;

    /// Data read.
    fn read(&mut self, pc: u32, addr: u32, size: Size) -> Result<u32, BusError>;

    /// Data write.
    fn write(&mut self, pc: u32, addr: u32, size: Size, value: u32) -> Result<(), BusError>;

    /// Charge `cycles` CPU clocks to the chipset.
    ///
    /// Cores call this from their own cycle accounting, before the access
    /// those cycles lead up to, so DMA and interrupt edges land at the right
    /// instruction boundary.
    fn sync(&mut self, cycles: u32);

    /// Current interrupt priority level (0-7) on the IPL lines.
    fn interrupt_level(&self) -> u8;
}

/// A 68000-family CPU core.
pub trait Cpu {
    /// Register file snapshot used by debuggers and save states.
    type Registers: Clone;

    /// Execute one instruction (or exception entry). Returns the CPU clocks
    /// it took, including wait states reported by the bus.
    fn step<B: CpuBus>(&mut self, bus: &mut B) -> Result<u32, BusError>;

    fn pc(&self) -> u32;

    fn set_pc(&mut self, pc: u32);

    fn registers(&self) -> Self::Registers;

    fn set_registers(&mut self, registers: &Self::Registers);

    /// Present the IPL lines. Sampled by the core at its next instruction
    /// boundary.
    fn set_interrupt_level(&mut self, level: u8);

    /// Reset: load SSP and PC from the vectors at address 0.
    fn reset<B: CpuBus>(&mut self, bus: &mut B) -> Result<(), BusError>;
}
