//! Copper - coprocessor for beam-synchronised register writes.
//!
//! The copper needs a bus slot for each instruction word it fetches. While
//! waiting it uses no slots and only compares the beam against its target.

use emu_core::RegisterPort;

use crate::{pointer_high, pointer_low};

pub const COPCON: u16 = 0x02E;
pub const COP1LCH: u16 = 0x080;
pub const COP1LCL: u16 = 0x082;
pub const COP2LCH: u16 = 0x084;
pub const COP2LCL: u16 = 0x086;
pub const COPJMP1: u16 = 0x088;
pub const COPJMP2: u16 = 0x08A;
pub const COPINS: u16 = 0x08C;

const COPCON_CDANG: u16 = 0x0002;

/// Registers below this are never writable by the copper.
const PROTECTED_ALWAYS: u16 = 0x040;
/// Registers below this need COPCON danger.
const PROTECTED_WITHOUT_DANGER: u16 = 0x080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    FetchFirst,
    FetchSecond,
    Waiting,
    /// A MOVE hit a protected register. Only a restart leaves this state.
    Halted,
}

/// A register write performed by a copper MOVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopperMove {
    pub offset: u16,
    pub value: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copper {
    state: State,
    cop1lc: u32,
    cop2lc: u32,
    pc: u32,
    ir1: u16,
    ir2: u16,
    danger: bool,
}

impl Copper {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            cop1lc: 0,
            cop2lc: 0,
            pc: 0,
            ir1: 0,
            ir2: 0,
            danger: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    #[must_use]
    pub fn cop1lc(&self) -> u32 {
        self.cop1lc
    }

    #[must_use]
    pub fn cop2lc(&self) -> u32 {
        self.cop2lc
    }

    #[must_use]
    pub fn danger(&self) -> bool {
        self.danger
    }

    /// Restart from COP1LC. Agnus does this at the start of every frame.
    pub fn restart_cop1(&mut self) {
        self.jump(self.cop1lc);
    }

    pub fn restart_cop2(&mut self) {
        self.jump(self.cop2lc);
    }

    fn jump(&mut self, target: u32) {
        self.pc = target;
        self.state = State::FetchFirst;
    }

    /// Whether the next colour clock needs a bus slot.
    #[must_use]
    pub fn wants_dma(&self) -> bool {
        matches!(self.state, State::FetchFirst | State::FetchSecond)
    }

    /// Compare the beam while waiting. Called every colour clock.
    pub fn tick(&mut self, vpos: u16, hpos: u16, blitter_busy: bool) {
        if self.state == State::Waiting && self.beam_reached(vpos, hpos, blitter_busy) {
            self.state = State::FetchFirst;
        }
    }

    /// Consume one instruction word fetched in a granted slot.
    pub fn fetch(
        &mut self,
        word: u16,
        vpos: u16,
        hpos: u16,
        blitter_busy: bool,
    ) -> Option<CopperMove> {
        self.pc = self.pc.wrapping_add(2);
        match self.state {
            State::FetchFirst => {
                self.ir1 = word;
                self.state = State::FetchSecond;
                None
            }
            State::FetchSecond => {
                self.ir2 = word;
                self.execute(vpos, hpos, blitter_busy)
            }
            _ => None,
        }
    }

    fn execute(&mut self, vpos: u16, hpos: u16, blitter_busy: bool) -> Option<CopperMove> {
        self.state = State::FetchFirst;
        if self.ir1 & 1 == 0 {
            let offset = self.ir1 & 0x01FE;
            let floor = if self.danger {
                PROTECTED_ALWAYS
            } else {
                PROTECTED_WITHOUT_DANGER
            };
            if offset < floor {
                log::debug!("copper halted by MOVE to ${offset:03X}");
                self.state = State::Halted;
                return None;
            }
            log::trace!("copper MOVE ${:04X} -> ${offset:03X}", self.ir2);
            return Some(CopperMove {
                offset,
                value: self.ir2,
            });
        }
        let reached = self.beam_reached(vpos, hpos, blitter_busy);
        if self.ir2 & 1 != 0 {
            if reached {
                self.pc = self.pc.wrapping_add(4);
            }
        } else if !reached {
            self.state = State::Waiting;
        }
        None
    }

    /// WAIT/SKIP comparator. V7 is always compared; other bits follow the
    /// enable masks in the second word. With BFD clear the blitter must also
    /// be idle.
    fn beam_reached(&self, vpos: u16, hpos: u16, blitter_busy: bool) -> bool {
        if self.ir2 & 0x8000 == 0 && blitter_busy {
            return false;
        }
        let wait_v = self.ir1 >> 8;
        let wait_h = (self.ir1 >> 1) & 0x7F;
        let mask_v = ((self.ir2 >> 8) & 0x7F) | 0x80;
        let mask_h = (self.ir2 >> 1) & 0x7F;
        let beam = (((vpos & 0xFF) & mask_v) << 7) | ((hpos >> 1) & mask_h);
        let target = ((wait_v & mask_v) << 7) | (wait_h & mask_h);
        beam >= target
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Copper {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterPort for Copper {
    fn read_register(&self, _offset: u16) -> Option<u16> {
        None
    }

    fn write_register(&mut self, offset: u16, value: u16) -> bool {
        match offset {
            COPCON => self.danger = value & COPCON_CDANG != 0,
            COP1LCH => self.cop1lc = pointer_high(self.cop1lc, value),
            COP1LCL => self.cop1lc = pointer_low(self.cop1lc, value),
            COP2LCH => self.cop2lc = pointer_high(self.cop2lc, value),
            COP2LCL => self.cop2lc = pointer_low(self.cop2lc, value),
            COPJMP1 => self.restart_cop1(),
            COPJMP2 => self.restart_cop2(),
            COPINS => {}
            _ => return false,
        }
        true
    }
}
