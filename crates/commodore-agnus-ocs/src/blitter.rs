//! Blitter.
//!
//! Area mode combines up to three sources (A, B, C) through an 8-bit
//! minterm into destination D, one word per granted bus slot. A passes
//! through the first/last word masks, A and B through the barrel shifter,
//! and D through the optional fill logic. Line mode draws the whole line
//! in the first granted slot.

use emu_core::RegisterPort;

use crate::{ChipMemory, pointer_high, pointer_low};

pub const BLTCON0: u16 = 0x040;
pub const BLTCON1: u16 = 0x042;
pub const BLTAFWM: u16 = 0x044;
pub const BLTALWM: u16 = 0x046;
pub const BLTCPTH: u16 = 0x048;
pub const BLTCPTL: u16 = 0x04A;
pub const BLTBPTH: u16 = 0x04C;
pub const BLTBPTL: u16 = 0x04E;
pub const BLTAPTH: u16 = 0x050;
pub const BLTAPTL: u16 = 0x052;
pub const BLTDPTH: u16 = 0x054;
pub const BLTDPTL: u16 = 0x056;
pub const BLTSIZE: u16 = 0x058;
pub const BLTCMOD: u16 = 0x060;
pub const BLTBMOD: u16 = 0x062;
pub const BLTAMOD: u16 = 0x064;
pub const BLTDMOD: u16 = 0x066;
pub const BLTCDAT: u16 = 0x070;
pub const BLTBDAT: u16 = 0x072;
pub const BLTADAT: u16 = 0x074;

const A: usize = 0;
const B: usize = 1;
const C: usize = 2;
const D: usize = 3;

const USEA: u16 = 0x0800;
const USEB: u16 = 0x0400;
const USEC: u16 = 0x0200;
const USED: u16 = 0x0100;

const LINE: u16 = 0x0001;
const DESC: u16 = 0x0002;
const FCI: u16 = 0x0004;
const IFE: u16 = 0x0008;
const EFE: u16 = 0x0010;

// Line mode reuses BLTCON1 bits 1-4 for the octant.
const SING: u16 = 0x0002;
const AUL: u16 = 0x0004;
const SUL: u16 = 0x0008;
const SUD: u16 = 0x0010;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blitter {
    con0: u16,
    con1: u16,
    afwm: u16,
    alwm: u16,
    /// A, B, C, D pointers.
    pointers: [u32; 4],
    /// A, B, C, D modulos.
    modulos: [i16; 4],
    /// A, B, C data registers.
    data: [u16; 3],
    size: u16,

    busy: bool,
    zero: bool,
    width: u16,
    height: u16,
    row: u16,
    col: u16,
    a_prev: u16,
    b_prev: u16,
    fill_carry: bool,
}

impl Blitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            con0: 0,
            con1: 0,
            afwm: 0xFFFF,
            alwm: 0xFFFF,
            pointers: [0; 4],
            modulos: [0; 4],
            data: [0; 3],
            size: 0,
            busy: false,
            zero: true,
            width: 0,
            height: 0,
            row: 0,
            col: 0,
            a_prev: 0,
            b_prev: 0,
            fill_carry: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn busy(&self) -> bool {
        self.busy
    }

    /// BZERO: every D word of the last blit was zero.
    #[must_use]
    pub fn zero(&self) -> bool {
        self.zero
    }

    #[must_use]
    pub fn bltcon0(&self) -> u16 {
        self.con0
    }

    #[must_use]
    pub fn bltcon1(&self) -> u16 {
        self.con1
    }

    #[must_use]
    pub fn masks(&self) -> (u16, u16) {
        (self.afwm, self.alwm)
    }

    /// Channel pointers in A, B, C, D order.
    #[must_use]
    pub fn pointers(&self) -> [u32; 4] {
        self.pointers
    }

    /// Channel modulos in A, B, C, D order.
    #[must_use]
    pub fn modulos(&self) -> [i16; 4] {
        self.modulos
    }

    /// A, B, C data registers.
    #[must_use]
    pub fn data(&self) -> [u16; 3] {
        self.data
    }

    #[must_use]
    pub fn bltsize(&self) -> u16 {
        self.size
    }

    #[must_use]
    pub fn line_mode(&self) -> bool {
        self.con1 & LINE != 0
    }

    fn start(&mut self, size: u16) {
        self.size = size;
        self.height = match size >> 6 {
            0 => 1024,
            h => h,
        };
        self.width = match size & 0x003F {
            0 => 64,
            w => w,
        };
        self.row = 0;
        self.col = 0;
        self.a_prev = 0;
        self.b_prev = 0;
        self.fill_carry = self.con1 & FCI != 0;
        self.zero = true;
        self.busy = true;
        log::debug!(
            "blit start {}x{} con0=${:04X} con1=${:04X}",
            self.width,
            self.height,
            self.con0,
            self.con1
        );
    }

    /// Run one granted slot. Returns true when the blit finished (BLIT).
    pub fn step<M: ChipMemory + ?Sized>(&mut self, mem: &mut M) -> bool {
        if !self.busy {
            return false;
        }
        if self.line_mode() {
            self.draw_line(mem);
            return self.finish();
        }
        self.area_word(mem);
        self.col += 1;
        if self.col == self.width {
            self.end_row();
        }
        if self.row == self.height {
            return self.finish();
        }
        false
    }

    fn finish(&mut self) -> bool {
        self.busy = false;
        log::debug!("blit done, zero={}", self.zero);
        true
    }

    fn uses(&self, channel: u16) -> bool {
        self.con0 & channel != 0
    }

    fn descending(&self) -> bool {
        self.con1 & DESC != 0
    }

    fn fetch<M: ChipMemory + ?Sized>(&mut self, channel: usize, mem: &M) -> u16 {
        let step: i32 = if self.descending() { -2 } else { 2 };
        let word = mem.read_word(self.pointers[channel]);
        self.pointers[channel] = self.pointers[channel].wrapping_add_signed(step);
        self.data[channel] = word;
        word
    }

    fn area_word<M: ChipMemory + ?Sized>(&mut self, mem: &mut M) {
        let descending = self.descending();
        let a_raw = if self.uses(USEA) { self.fetch(A, mem) } else { self.data[A] };
        let b_raw = if self.uses(USEB) { self.fetch(B, mem) } else { self.data[B] };
        let c = if self.uses(USEC) { self.fetch(C, mem) } else { self.data[C] };

        let mut a_masked = a_raw;
        if self.col == 0 {
            a_masked &= self.afwm;
        }
        if self.col + 1 == self.width {
            a_masked &= self.alwm;
        }
        let a = barrel_shift(self.a_prev, a_masked, self.con0 >> 12, descending);
        let b = barrel_shift(self.b_prev, b_raw, self.con1 >> 12, descending);
        self.a_prev = a_masked;
        self.b_prev = b_raw;

        let mut d = minterm(self.con0 as u8, a, b, c);
        if self.con1 & (IFE | EFE) != 0 {
            d = self.fill(d);
        }
        if d != 0 {
            self.zero = false;
        }
        if self.uses(USED) {
            let step: i32 = if descending { -2 } else { 2 };
            mem.write_word(self.pointers[D], d);
            self.pointers[D] = self.pointers[D].wrapping_add_signed(step);
        }
    }

    /// Area fill runs right to left, toggling at every set bit.
    fn fill(&mut self, d: u16) -> u16 {
        let inclusive = self.con1 & IFE != 0;
        let mut carry = self.fill_carry;
        let mut out = 0;
        for bit in 0..16 {
            let mask = 1u16 << bit;
            let edge = d & mask != 0;
            let filled = if inclusive { edge || carry } else { edge != carry };
            if edge {
                carry = !carry;
            }
            if filled {
                out |= mask;
            }
        }
        self.fill_carry = carry;
        out
    }

    fn end_row(&mut self) {
        let sign = if self.descending() { -1 } else { 1 };
        for (channel, enable) in [(A, USEA), (B, USEB), (C, USEC), (D, USED)] {
            if self.uses(enable) {
                let modulo = i32::from(self.modulos[channel]) * sign;
                self.pointers[channel] = self.pointers[channel].wrapping_add_signed(modulo);
            }
        }
        self.col = 0;
        self.row += 1;
        self.a_prev = 0;
        self.b_prev = 0;
        self.fill_carry = self.con1 & FCI != 0;
    }

    /// Bresenham line using the HRM register setup: BLTAPTL holds the
    /// decision variable, BLTAMOD/BLTBMOD its two increments, BLTCMOD the
    /// bitplane width and BLTSIZE the pixel count.
    fn draw_line<M: ChipMemory + ?Sized>(&mut self, mem: &mut M) {
        let x_major = self.con1 & SUD != 0;
        let major_negative = self.con1 & AUL != 0;
        let minor_negative = self.con1 & SUL != 0;
        let single = self.con1 & SING != 0;
        let row_bytes = i32::from(self.modulos[C]);

        let mut error = i32::from(self.pointers[A] as u16 as i16);
        let mut bit = u32::from(self.con0 >> 12);
        let mut texture = u32::from(self.con1 >> 12);
        let mut addr = self.pointers[C];
        let mut drawn_on_row = false;

        for _ in 0..self.height {
            if !(single && drawn_on_row) {
                let a = self.data[A] >> bit;
                let b = if self.data[B].rotate_left(texture) & 0x8000 != 0 {
                    0xFFFF
                } else {
                    0
                };
                let d = minterm(self.con0 as u8, a, b, mem.read_word(addr));
                if d != 0 {
                    self.zero = false;
                }
                mem.write_word(addr, d);
                drawn_on_row = true;
            }
            texture = (texture + 1) & 15;

            let minor_step = error >= 0;
            error += i32::from(if minor_step {
                self.modulos[A]
            } else {
                self.modulos[B]
            });
            let mut step_x = |negative: bool, addr: &mut u32| {
                if negative {
                    if bit == 0 {
                        bit = 15;
                        *addr = addr.wrapping_sub(2);
                    } else {
                        bit -= 1;
                    }
                } else if bit == 15 {
                    bit = 0;
                    *addr = addr.wrapping_add(2);
                } else {
                    bit += 1;
                }
            };
            let step_y = |negative: bool, addr: &mut u32| {
                *addr = addr.wrapping_add_signed(if negative { -row_bytes } else { row_bytes });
            };
            if x_major {
                step_x(major_negative, &mut addr);
                if minor_step {
                    step_y(minor_negative, &mut addr);
                    drawn_on_row = false;
                }
            } else {
                step_y(major_negative, &mut addr);
                drawn_on_row = false;
                if minor_step {
                    step_x(minor_negative, &mut addr);
                }
            }
        }

        self.pointers[A] = (self.pointers[A] & 0xFFFF_0000) | u32::from(error as u16);
        self.pointers[C] = addr;
        self.pointers[D] = addr;
        self.con0 = (self.con0 & 0x0FFF) | ((bit as u16) << 12);
    }
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine A, B and C through the minterm byte. Bit `abc` of `lf` selects
/// the output for that input combination.
#[must_use]
pub fn minterm(lf: u8, a: u16, b: u16, c: u16) -> u16 {
    let mut d = 0;
    for term in 0..8u8 {
        if lf & (1 << term) == 0 {
            continue;
        }
        let a_term = if term & 4 != 0 { a } else { !a };
        let b_term = if term & 2 != 0 { b } else { !b };
        let c_term = if term & 1 != 0 { c } else { !c };
        d |= a_term & b_term & c_term;
    }
    d
}

/// Barrel shifter. Ascending blits shift right, pulling bits in from the
/// previous word; descending blits shift left.
fn barrel_shift(prev: u16, current: u16, shift: u16, descending: bool) -> u16 {
    if shift == 0 {
        return current;
    }
    if descending {
        (((u32::from(current) << 16) | u32::from(prev)) >> (16 - shift)) as u16
    } else {
        (((u32::from(prev) << 16) | u32::from(current)) >> shift) as u16
    }
}

impl RegisterPort for Blitter {
    /// Every blitter register is write-only.
    fn read_register(&self, _offset: u16) -> Option<u16> {
        None
    }

    fn write_register(&mut self, offset: u16, value: u16) -> bool {
        match offset {
            BLTCON0 => self.con0 = value,
            BLTCON1 => self.con1 = value,
            BLTAFWM => self.afwm = value,
            BLTALWM => self.alwm = value,
            BLTCPTH => self.pointers[C] = pointer_high(self.pointers[C], value),
            BLTCPTL => self.pointers[C] = pointer_low(self.pointers[C], value),
            BLTBPTH => self.pointers[B] = pointer_high(self.pointers[B], value),
            BLTBPTL => self.pointers[B] = pointer_low(self.pointers[B], value),
            BLTAPTH => self.pointers[A] = pointer_high(self.pointers[A], value),
            BLTAPTL => self.pointers[A] = pointer_low(self.pointers[A], value),
            BLTDPTH => self.pointers[D] = pointer_high(self.pointers[D], value),
            BLTDPTL => self.pointers[D] = pointer_low(self.pointers[D], value),
            BLTSIZE => self.start(value),
            BLTCMOD => self.modulos[C] = (value & 0xFFFE) as i16,
            BLTBMOD => self.modulos[B] = (value & 0xFFFE) as i16,
            BLTAMOD => self.modulos[A] = (value & 0xFFFE) as i16,
            BLTDMOD => self.modulos[D] = (value & 0xFFFE) as i16,
            BLTCDAT => self.data[C] = value,
            BLTBDAT => self.data[B] = value,
            BLTADAT => self.data[A] = value,
            _ => return false,
        }
        true
    }
}
