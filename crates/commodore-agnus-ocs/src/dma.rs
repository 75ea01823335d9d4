//! DMA slot table and the bus arbiter.
//!
//! Every colour clock is one bus slot. Some slots are reserved for a fixed
//! channel by beam position (refresh, disk, audio, sprites, and bitplanes
//! inside the fetch window); the rest are free and go to the copper, the
//! blitter or the CPU. A reserved slot whose channel is disabled or idle is
//! free as well.

/// DMACON bit assignments.
pub mod dmacon {
    pub const AUD0EN: u16 = 0x0001;
    pub const AUD1EN: u16 = 0x0002;
    pub const AUD2EN: u16 = 0x0004;
    pub const AUD3EN: u16 = 0x0008;
    pub const DSKEN: u16 = 0x0010;
    pub const SPREN: u16 = 0x0020;
    pub const BLTEN: u16 = 0x0040;
    pub const COPEN: u16 = 0x0080;
    pub const BPLEN: u16 = 0x0100;
    pub const DMAEN: u16 = 0x0200;
    pub const BLTPRI: u16 = 0x0400;
    pub const BZERO: u16 = 0x2000;
    pub const BBUSY: u16 = 0x4000;
    /// Bits a DMACON write can change.
    pub const WRITABLE: u16 = 0x07FF;
}

/// A bus requester. The discriminant is both its bit in a request mask and
/// its priority: a larger value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum DmaSource {
    #[default]
    None = 0,
    Cpu = 1,
    Disk = 2,
    Audio0 = 3,
    Audio1 = 4,
    Audio2 = 5,
    Audio3 = 6,
    Sprite = 7,
    Blitter = 8,
    Copper = 9,
    Bitplane = 10,
    Refresh = 11,
}

impl DmaSource {
    pub const ALL: [DmaSource; 12] = [
        DmaSource::None,
        DmaSource::Cpu,
        DmaSource::Disk,
        DmaSource::Audio0,
        DmaSource::Audio1,
        DmaSource::Audio2,
        DmaSource::Audio3,
        DmaSource::Sprite,
        DmaSource::Blitter,
        DmaSource::Copper,
        DmaSource::Bitplane,
        DmaSource::Refresh,
    ];

    #[must_use]
    pub const fn bit(self) -> u16 {
        1 << self as u16
    }

    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    #[must_use]
    pub fn audio(channel: u8) -> Option<Self> {
        match channel {
            0 => Some(DmaSource::Audio0),
            1 => Some(DmaSource::Audio1),
            2 => Some(DmaSource::Audio2),
            3 => Some(DmaSource::Audio3),
            _ => None,
        }
    }

    /// DMACON bit that enables this channel. Refresh and the CPU are never
    /// gated.
    #[must_use]
    pub const fn enable_bit(self) -> Option<u16> {
        match self {
            DmaSource::None | DmaSource::Cpu | DmaSource::Refresh => None,
            DmaSource::Disk => Some(dmacon::DSKEN),
            DmaSource::Audio0 => Some(dmacon::AUD0EN),
            DmaSource::Audio1 => Some(dmacon::AUD1EN),
            DmaSource::Audio2 => Some(dmacon::AUD2EN),
            DmaSource::Audio3 => Some(dmacon::AUD3EN),
            DmaSource::Sprite => Some(dmacon::SPREN),
            DmaSource::Blitter => Some(dmacon::BLTEN),
            DmaSource::Copper => Some(dmacon::COPEN),
            DmaSource::Bitplane => Some(dmacon::BPLEN),
        }
    }

    /// Highest-priority source in a request mask.
    #[must_use]
    pub fn highest(mask: u16) -> DmaSource {
        if mask == 0 {
            return DmaSource::None;
        }
        let top = 15 - mask.leading_zeros() as u8;
        Self::from_index(top).unwrap_or(DmaSource::None)
    }
}

/// Request mask of the sources DMACON currently lets onto the bus.
#[must_use]
pub fn enabled_sources(dmacon: u16) -> u16 {
    let mask = DmaSource::Cpu.bit() | DmaSource::Refresh.bit();
    if dmacon & dmacon::DMAEN == 0 {
        return mask;
    }
    DmaSource::ALL
        .iter()
        .filter(|source| source.enable_bit().is_some_and(|bit| dmacon & bit != 0))
        .fold(mask, |mask, source| mask | source.bit())
}

/// Fixed owner of a slot by horizontal position. Bitplane slots depend on
/// the fetch window and are resolved separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedSlot {
    Refresh,
    Disk,
    Audio(u8),
    /// Sprite number and word (0 = POS/DATA, 1 = CTL/DATB).
    Sprite(u8, u8),
    Free,
}

pub const FIRST_SPRITE_SLOT: u16 = 0x15;
pub const LAST_SPRITE_SLOT: u16 = 0x33;

#[must_use]
pub fn fixed_slot(hpos: u16) -> FixedSlot {
    match hpos {
        0x01 | 0x03 | 0x05 | 0xE2 => FixedSlot::Refresh,
        0x07 | 0x09 | 0x0B => FixedSlot::Disk,
        0x0D | 0x0F | 0x11 | 0x13 => FixedSlot::Audio(((hpos - 0x0D) / 2) as u8),
        FIRST_SPRITE_SLOT..=LAST_SPRITE_SLOT if hpos & 1 == 1 => {
            let index = (hpos - FIRST_SPRITE_SLOT) / 2;
            FixedSlot::Sprite((index / 2) as u8, (index % 2) as u8)
        }
        _ => FixedSlot::Free,
    }
}

/// Sources that may compete for one slot, split into the reserved tier and
/// the free tier. The reserved tier is resolved first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCandidates {
    pub reserved: u16,
    pub free: u16,
}

/// Request latch and winner selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DmaArbiter {
    pending: u16,
    /// Consecutive free slots the CPU asked for and lost.
    cpu_refusals: u8,
    last: DmaSource,
}

/// With BLTPRI clear, the CPU takes the slot after this many refusals.
pub const CPU_STARVATION_LIMIT: u8 = 3;

impl DmaArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, source: DmaSource) {
        self.pending |= source.bit();
    }

    pub fn withdraw(&mut self, source: DmaSource) {
        self.pending &= !source.bit();
    }

    pub fn set_request(&mut self, source: DmaSource, requesting: bool) {
        if requesting {
            self.request(source);
        } else {
            self.withdraw(source);
        }
    }

    #[must_use]
    pub fn pending(&self) -> u16 {
        self.pending
    }

    #[must_use]
    pub fn is_pending(&self, source: DmaSource) -> bool {
        self.pending & source.bit() != 0
    }

    #[must_use]
    pub fn last_grant(&self) -> DmaSource {
        self.last
    }

    #[must_use]
    pub fn cpu_refusals(&self) -> u8 {
        self.cpu_refusals
    }

    /// Grant the current slot. The winner's request is consumed; every
    /// losing request stays pending.
    pub fn arbitrate(
        &mut self,
        slot: SlotCandidates,
        enabled: u16,
        blitter_priority: bool,
    ) -> DmaSource {
        let reserved = slot.reserved & enabled & self.pending;
        let winner = if reserved != 0 {
            DmaSource::highest(reserved)
        } else {
            self.arbitrate_free(slot.free & enabled & self.pending, blitter_priority)
        };
        self.withdraw(winner);
        self.last = winner;
        winner
    }

    fn arbitrate_free(&mut self, candidates: u16, blitter_priority: bool) -> DmaSource {
        let cpu_waiting = candidates & DmaSource::Cpu.bit() != 0;
        let mut winner = DmaSource::highest(candidates);
        if winner == DmaSource::Blitter
            && cpu_waiting
            && !blitter_priority
            && self.cpu_refusals >= CPU_STARVATION_LIMIT
        {
            winner = DmaSource::Cpu;
        }
        if winner == DmaSource::Cpu {
            self.cpu_refusals = 0;
        } else if cpu_waiting {
            self.cpu_refusals = self.cpu_refusals.saturating_add(1);
        }
        winner
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
