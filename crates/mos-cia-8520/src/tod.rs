//! 24-bit time-of-day counter with alarm.
//!
//! Two access quirks matter to software:
//! - Reading the high byte freezes a copy of the counter, and reading the
//!   low byte releases it, so an H/M/L read sequence is consistent.
//! - Writing the high byte stops the counter until the low byte is
//!   written, so an H/M/L write sequence cannot carry mid-update.

const MASK: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Tod {
    pub(crate) counter: u32,
    pub(crate) alarm: u32,
    pub(crate) latch: Option<u32>,
    pub(crate) halted: bool,
}

impl Tod {
    /// `index` 0 = low, 1 = mid, 2 = high.
    pub(crate) fn read(&mut self, index: u8) -> u8 {
        if index == 2 && self.latch.is_none() {
            self.latch = Some(self.counter);
        }
        let value = self.latch.unwrap_or(self.counter);
        if index == 0 {
            self.latch = None;
        }
        (value >> (8 * u32::from(index))) as u8
    }

    /// Side-effect free view of what `read` would return.
    pub(crate) fn peek(&self, index: u8) -> u8 {
        let value = self.latch.unwrap_or(self.counter);
        (value >> (8 * u32::from(index))) as u8
    }

    pub(crate) fn write(&mut self, index: u8, value: u8, to_alarm: bool) {
        let shift = 8 * u32::from(index);
        let keep = !(0xFF << shift);
        let field = u32::from(value) << shift;
        if to_alarm {
            self.alarm = ((self.alarm & keep) | field) & MASK;
            return;
        }
        self.counter = ((self.counter & keep) | field) & MASK;
        match index {
            2 => self.halted = true,
            0 => self.halted = false,
            _ => {}
        }
    }

    /// One count pulse. Returns true when the counter reaches the alarm.
    pub(crate) fn pulse(&mut self) -> bool {
        if self.halted {
            return false;
        }
        self.counter = (self.counter + 1) & MASK;
        self.counter == self.alarm
    }
}
