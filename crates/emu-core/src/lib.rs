//! Shared contracts for the Amiga chipset crates.
//!
//! Timing, bus and register abstractions that every chip crate builds on.
//! Nothing here knows about a specific chip.

mod bus;
mod cpu;
mod observable;
mod register;
mod tickable;

pub use bus::{AddressMap, AddressRange, BusError, MapError, MemoryMapped, Size};
pub use cpu::{Cpu, CpuBus};
pub use observable::{Observable, Value};
pub use register::RegisterPort;
pub use tickable::Tickable;

/// Apply the chipset SET/CLR write convention to `current`.
///
/// Bit 15 of `value` selects whether bits 0-14 are set or cleared. Bits not
/// named in `value` are untouched.
#[must_use]
pub const fn set_clr(current: u16, value: u16) -> u16 {
    if value & 0x8000 != 0 {
        current | (value & 0x7FFF)
    } else {
        current & !(value & 0x7FFF)
    }
}
