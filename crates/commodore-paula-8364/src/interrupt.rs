//! INTENA/INTREQ and the CPU interrupt priority ladder.

use emu_core::set_clr;

/// INTENA bit 14: master enable. Has no request counterpart.
pub const INTEN: u16 = 0x4000;

const SOURCE_BITS: u16 = 0x3FFF;

/// One INTREQ bit. The discriminant is the bit number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InterruptSource {
    /// Serial transmit buffer empty.
    Tbe = 0,
    /// Disk block finished.
    DskBlk = 1,
    /// Software interrupt.
    Soft = 2,
    /// CIA-A and expansion /INT2.
    Ports = 3,
    /// Copper.
    Coper = 4,
    /// Start of vertical blank.
    Vertb = 5,
    /// Blitter finished.
    Blit = 6,
    Aud0 = 7,
    Aud1 = 8,
    Aud2 = 9,
    Aud3 = 10,
    /// Serial receive buffer full.
    Rbf = 11,
    /// Disk sync word found.
    DskSyn = 12,
    /// CIA-B and expansion /INT6.
    Exter = 13,
}

/// CPU level for each INTREQ bit, indexed by bit number.
const LEVEL_OF_BIT: [u8; 14] = [1, 1, 1, 2, 3, 3, 3, 4, 4, 4, 4, 5, 5, 6];

impl InterruptSource {
    pub const ALL: [InterruptSource; 14] = [
        InterruptSource::Tbe,
        InterruptSource::DskBlk,
        InterruptSource::Soft,
        InterruptSource::Ports,
        InterruptSource::Coper,
        InterruptSource::Vertb,
        InterruptSource::Blit,
        InterruptSource::Aud0,
        InterruptSource::Aud1,
        InterruptSource::Aud2,
        InterruptSource::Aud3,
        InterruptSource::Rbf,
        InterruptSource::DskSyn,
        InterruptSource::Exter,
    ];

    #[must_use]
    pub const fn bit(self) -> u16 {
        1 << self as u16
    }

    /// CPU interrupt level this source signals on.
    #[must_use]
    pub const fn level(self) -> u8 {
        LEVEL_OF_BIT[self as usize]
    }

    #[must_use]
    pub fn from_bit(bit: u8) -> Option<Self> {
        Self::ALL.get(usize::from(bit)).copied()
    }

    /// Audio channel interrupt, `channel` 0-3.
    #[must_use]
    pub fn audio(channel: usize) -> Option<Self> {
        match channel {
            0 => Some(InterruptSource::Aud0),
            1 => Some(InterruptSource::Aud1),
            2 => Some(InterruptSource::Aud2),
            3 => Some(InterruptSource::Aud3),
            _ => None,
        }
    }
}

/// The interrupt half of Paula.
///
/// The CPU level is derived on every query, never cached, so enabling a
/// source makes an already pending request visible immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptController {
    enable: u16,
    request: u16,
}

impl InterruptController {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enable: 0,
            request: 0,
        }
    }

    /// Set or clear one request bit. Repeating either is a no-op.
    pub fn assert_interrupt(&mut self, source: InterruptSource, asserted: bool) {
        if asserted {
            self.request |= source.bit();
        } else {
            self.request &= !source.bit();
        }
    }

    pub fn raise(&mut self, source: InterruptSource) {
        self.assert_interrupt(source, true);
    }

    /// Raise every source named in an INTREQ-shaped mask.
    pub fn raise_mask(&mut self, mask: u16) {
        self.request |= mask & SOURCE_BITS;
    }

    pub fn write_intena(&mut self, value: u16) {
        self.enable = set_clr(self.enable, value);
        log::debug!("INTENA <- ${value:04X} = ${:04X}", self.enable);
    }

    /// INTREQ writes from the CPU or copper. Clearing is the acknowledge.
    pub fn write_intreq(&mut self, value: u16) {
        self.request = set_clr(self.request, value) & SOURCE_BITS;
        log::debug!("INTREQ <- ${value:04X} = ${:04X}", self.request);
    }

    #[must_use]
    pub const fn intena(&self) -> u16 {
        self.enable
    }

    #[must_use]
    pub const fn intreq(&self) -> u16 {
        self.request
    }

    #[must_use]
    pub const fn is_pending(&self, source: InterruptSource) -> bool {
        self.request & source.bit() != 0
    }

    /// IPL presented to the CPU, 0 when nothing enabled is pending.
    #[must_use]
    pub fn interrupt_level(&self) -> u8 {
        if self.enable & INTEN == 0 {
            return 0;
        }
        let active = self.enable & self.request & SOURCE_BITS;
        if active == 0 {
            return 0;
        }
        // Levels are monotonic in bit number, so the top bit decides.
        let top = 15 - active.leading_zeros() as usize;
        LEVEL_OF_BIT[top]
    }
}
