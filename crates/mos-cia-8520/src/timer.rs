//! One 16-bit interval timer (A or B).

/// Control register bits shared by CRA and CRB.
pub(crate) const CR_START: u8 = 0x01;
pub(crate) const CR_PBON: u8 = 0x02;
pub(crate) const CR_OUTMODE: u8 = 0x04;
pub(crate) const CR_RUNMODE: u8 = 0x08;
pub(crate) const CR_LOAD: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timer {
    pub(crate) counter: u16,
    pub(crate) latch: u16,
    /// Control byte without the LOAD strobe, which never reads back.
    pub(crate) control: u8,
    /// PB6/PB7 level in toggle mode.
    toggle: bool,
    /// PB6/PB7 pulse mode: high for the step after an underflow.
    pulse: bool,
}

impl Timer {
    pub(crate) const fn new() -> Self {
        Self {
            counter: 0xFFFF,
            latch: 0xFFFF,
            control: 0,
            toggle: false,
            pulse: false,
        }
    }

    pub(crate) fn running(&self) -> bool {
        self.control & CR_START != 0
    }

    pub(crate) fn one_shot(&self) -> bool {
        self.control & CR_RUNMODE != 0
    }

    pub(crate) fn write_control(&mut self, value: u8) {
        let was_running = self.running();
        self.control = value & !CR_LOAD;
        if value & CR_LOAD != 0 {
            self.counter = self.latch;
        }
        if !was_running && self.running() {
            self.toggle = true;
        }
    }

    pub(crate) fn write_latch_lo(&mut self, value: u8) {
        self.latch = (self.latch & 0xFF00) | u16::from(value);
    }

    /// Writing the high byte of a stopped timer loads the counter. In
    /// one-shot mode the 8520 also starts counting.
    pub(crate) fn write_latch_hi(&mut self, value: u8) {
        self.latch = (self.latch & 0x00FF) | (u16::from(value) << 8);
        if !self.running() {
            self.counter = self.latch;
            if self.one_shot() {
                self.control |= CR_START;
                self.toggle = true;
            }
        }
    }

    /// Count one input pulse. Returns true on underflow.
    ///
    /// A counter loaded with N underflows on the Nth pulse and is reloaded in
    /// the same step, so the period is exactly N.
    pub(crate) fn count(&mut self) -> bool {
        self.pulse = false;
        if self.counter > 1 {
            self.counter -= 1;
            return false;
        }
        self.counter = self.latch;
        self.toggle = !self.toggle;
        self.pulse = true;
        if self.one_shot() {
            self.control &= !CR_START;
        }
        true
    }

    /// Level driven onto PB6/PB7 when PBON is set.
    pub(crate) fn pb_output(&self) -> Option<bool> {
        if self.control & CR_PBON == 0 {
            return None;
        }
        Some(if self.control & CR_OUTMODE != 0 {
            self.toggle
        } else {
            self.pulse
        })
    }
}
