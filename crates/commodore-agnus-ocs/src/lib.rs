//! Commodore Agnus OCS: beam counter, DMA arbitration, copper and blitter.
//!
//! Agnus is the bus master of the chipset. It owns the beam position, hands
//! every colour-clock bus slot to exactly one requester and drives the DMA
//! channels that live inside it. Paula's disk and audio channels ask for
//! their slots through [`ChannelRequests`]; the machine performs those
//! transfers because Paula owns their state.

mod agnus;
pub mod beam;
pub mod blitter;
pub mod copper;
pub mod dma;
pub mod window;

pub use agnus::{
    Agnus, ChannelRequests, DmaEvent, SPRITE_FIRST_LINE, SlotGrant, SpriteDmaState, registers,
};
pub use beam::{
    ClockState, NTSC_CCKS_PER_LINE, NTSC_LINES_PER_FRAME, PAL_CCKS_PER_LINE, PAL_LINES_PER_FRAME,
    RasterClock, RasterError,
};
pub use blitter::Blitter;
pub use copper::{Copper, CopperMove, State as CopperState};
pub use dma::{DmaArbiter, DmaSource, FixedSlot, SlotCandidates, dmacon, enabled_sources, fixed_slot};
pub use window::{DisplayWindow, FetchWindow, LOWRES_FETCH_ORDER};

/// Chip RAM as the DMA channels see it. Implementations mask addresses to
/// the installed size.
pub trait ChipMemory {
    fn read_word(&self, addr: u32) -> u16;
    fn write_word(&mut self, addr: u32, value: u16);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chipset {
    #[default]
    Ocs,
    Ecs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoStandard {
    #[default]
    Pal,
    Ntsc,
}

impl VideoStandard {
    #[must_use]
    pub fn raster(self) -> RasterClock {
        match self {
            VideoStandard::Pal => RasterClock::pal(),
            VideoStandard::Ntsc => RasterClock::ntsc(),
        }
    }
}

/// Replace bits 20-16 of a DMA pointer (xxxPTH).
pub(crate) fn pointer_high(pointer: u32, value: u16) -> u32 {
    (pointer & 0xFFFF) | (u32::from(value & 0x001F) << 16)
}

/// Replace bits 15-1 of a DMA pointer (xxxPTL). Bit 0 is always clear.
pub(crate) fn pointer_low(pointer: u32, value: u16) -> u32 {
    (pointer & 0x001F_0000) | u32::from(value & 0xFFFE)
}
