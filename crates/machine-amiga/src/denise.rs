//! Denise register surface.
//!
//! Pixels are not generated here. Denise keeps the latches the CPU, the
//! copper and bitplane/sprite DMA write, the mouse counters, and answers
//! whether a beam position falls in the border.

use commodore_agnus_ocs::{Chipset, DisplayWindow};
use emu_core::RegisterPort;

pub const JOY0DAT: u16 = 0x00A;
pub const JOY1DAT: u16 = 0x00C;
pub const CLXDAT: u16 = 0x00E;
pub const JOYTEST: u16 = 0x036;
pub const DENISEID: u16 = 0x07C;
pub const DIWSTRT: u16 = 0x08E;
pub const DIWSTOP: u16 = 0x090;
pub const CLXCON: u16 = 0x098;
pub const BPLCON0: u16 = 0x100;
pub const BPLCON3: u16 = 0x106;
pub const BPL1DAT: u16 = 0x110;
pub const BPL6DAT: u16 = 0x11A;
pub const SPR0POS: u16 = 0x140;
pub const SPR7DATB: u16 = 0x17E;
pub const COLOR00: u16 = 0x180;
pub const COLOR31: u16 = 0x1BE;
pub const DIWHIGH: u16 = 0x1E4;

/// ECS Denise (8373) id. OCS Denise does not drive the bus.
const ECS_DENISE_ID: u16 = 0x00FC;
/// CLXDAT bit 15 is not connected and reads high.
const CLXDAT_UNUSED: u16 = 0x8000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpriteLatch {
    pub pos: u16,
    pub ctl: u16,
    pub data: u16,
    pub datb: u16,
    /// Writing DATA arms the sprite, writing CTL disarms it.
    pub armed: bool,
}

#[derive(Debug, Clone)]
pub struct Denise {
    chipset: Chipset,
    bplcon: [u16; 4],
    bpldat: [u16; 6],
    sprites: [SpriteLatch; 8],
    palette: [u16; 32],
    diwstrt: u16,
    diwstop: u16,
    diwhigh: Option<u16>,
    window: DisplayWindow,
    clxcon: u16,
    joy0dat: u16,
    joy1dat: u16,
}

impl Denise {
    #[must_use]
    pub fn new(chipset: Chipset) -> Self {
        Self {
            chipset,
            bplcon: [0; 4],
            bpldat: [0; 6],
            sprites: [SpriteLatch::default(); 8],
            palette: [0; 32],
            diwstrt: 0x2C81,
            diwstop: 0x2CC1,
            diwhigh: None,
            window: DisplayWindow::from_registers(0x2C81, 0x2CC1, None),
            clxcon: 0,
            joy0dat: 0,
            joy1dat: 0,
        }
    }

    /// Counters survive a reset; they belong to the ports.
    pub fn reset(&mut self) {
        let (joy0dat, joy1dat) = (self.joy0dat, self.joy1dat);
        *self = Self::new(self.chipset);
        self.joy0dat = joy0dat;
        self.joy1dat = joy1dat;
    }

    #[must_use]
    pub fn palette(&self) -> &[u16; 32] {
        &self.palette
    }

    #[must_use]
    pub fn bplcon(&self, index: usize) -> Option<u16> {
        self.bplcon.get(index).copied()
    }

    #[must_use]
    pub fn bitplane_data(&self) -> &[u16; 6] {
        &self.bpldat
    }

    #[must_use]
    pub fn sprite(&self, index: usize) -> Option<&SpriteLatch> {
        self.sprites.get(index)
    }

    #[must_use]
    pub fn clxcon(&self) -> u16 {
        self.clxcon
    }

    #[must_use]
    pub fn display_window(&self) -> DisplayWindow {
        self.window
    }

    /// DIWSTRT and DIWSTOP as last written.
    #[must_use]
    pub fn diw(&self) -> (u16, u16) {
        (self.diwstrt, self.diwstop)
    }

    #[must_use]
    pub fn diwhigh(&self) -> Option<u16> {
        self.diwhigh
    }

    /// `x` in lowres pixels (two per colour clock).
    #[must_use]
    pub fn is_border(&self, x: u16, vpos: u16) -> bool {
        !self.window.contains(x, vpos)
    }

    #[must_use]
    pub fn is_border_at_beam(&self, hpos: u16, vpos: u16) -> bool {
        self.is_border(hpos * 2, vpos)
    }

    /// Mouse or joystick counters for a port, as the port hardware drives
    /// them.
    pub fn set_joydat(&mut self, port: usize, value: u16) {
        match port {
            0 => self.joy0dat = value,
            1 => self.joy1dat = value,
            _ => {}
        }
    }

    #[must_use]
    pub fn joydat(&self, port: usize) -> Option<u16> {
        match port {
            0 => Some(self.joy0dat),
            1 => Some(self.joy1dat),
            _ => None,
        }
    }

    fn update_window(&mut self) {
        self.window = DisplayWindow::from_registers(self.diwstrt, self.diwstop, self.diwhigh);
    }

    /// JOYTEST loads bits 7-2 of both counters in all four counters.
    fn write_joytest(&mut self, value: u16) {
        let keep = 0x0303;
        let load = value & 0xFCFC;
        self.joy0dat = (self.joy0dat & keep) | load;
        self.joy1dat = (self.joy1dat & keep) | load;
    }
}

impl RegisterPort for Denise {
    fn read_register(&self, offset: u16) -> Option<u16> {
        match offset {
            JOY0DAT => Some(self.joy0dat),
            JOY1DAT => Some(self.joy1dat),
            CLXDAT => Some(CLXDAT_UNUSED),
            DENISEID => Some(match self.chipset {
                Chipset::Ocs => 0xFFFF,
                Chipset::Ecs => ECS_DENISE_ID,
            }),
            _ => None,
        }
    }

    fn write_register(&mut self, offset: u16, value: u16) -> bool {
        match offset {
            JOYTEST => self.write_joytest(value),
            DIWSTRT => {
                self.diwstrt = value;
                self.update_window();
            }
            DIWSTOP => {
                self.diwstop = value;
                self.update_window();
            }
            DIWHIGH if self.chipset == Chipset::Ecs => {
                self.diwhigh = Some(value);
                self.update_window();
            }
            CLXCON => self.clxcon = value,
            BPLCON0..=BPLCON3 => self.bplcon[usize::from((offset - BPLCON0) / 2)] = value,
            BPL1DAT..=BPL6DAT => self.bpldat[usize::from((offset - BPL1DAT) / 2)] = value,
            SPR0POS..=SPR7DATB => {
                let rel = offset - SPR0POS;
                let sprite = &mut self.sprites[usize::from(rel / 8)];
                match rel % 8 {
                    0 => sprite.pos = value,
                    2 => {
                        sprite.ctl = value;
                        sprite.armed = false;
                    }
                    4 => {
                        sprite.data = value;
                        sprite.armed = true;
                    }
                    _ => sprite.datb = value,
                }
            }
            COLOR00..=COLOR31 => {
                self.palette[usize::from((offset - COLOR00) / 2)] = value & 0x0FFF;
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_keeps_twelve_bits() {
        let mut denise = Denise::new(Chipset::Ocs);
        assert!(denise.write_register(COLOR00 + 2, 0xFFFF));
        assert_eq!(denise.palette()[1], 0x0FFF);
    }

    #[test]
    fn border_follows_display_window() {
        let mut denise = Denise::new(Chipset::Ocs);
        denise.write_register(DIWSTRT, 0x2C81);
        denise.write_register(DIWSTOP, 0x2CC1);
        assert!(denise.is_border(0x80, 0x40));
        assert!(!denise.is_border(0x81, 0x40));
        assert!(denise.is_border(0x100, 0x2B));
        assert!(!denise.is_border_at_beam(0x60, 0x100));
    }

    #[test]
    fn sprite_data_arms_and_control_disarms() {
        let mut denise = Denise::new(Chipset::Ocs);
        denise.write_register(SPR0POS + 8 + 4, 0x1234);
        assert!(denise.sprite(1).is_some_and(|s| s.armed));
        denise.write_register(SPR0POS + 8 + 2, 0);
        assert!(denise.sprite(1).is_some_and(|s| !s.armed));
    }

    #[test]
    fn joytest_loads_counter_high_bits() {
        let mut denise = Denise::new(Chipset::Ocs);
        denise.set_joydat(0, 0x0101);
        denise.write_register(JOYTEST, 0xFFFF);
        assert_eq!(denise.read_register(JOY0DAT), Some(0xFDFD));
        assert_eq!(denise.read_register(JOY1DAT), Some(0xFCFC));
    }

    #[test]
    fn deniseid_depends_on_revision() {
        assert_eq!(Denise::new(Chipset::Ocs).read_register(DENISEID), Some(0xFFFF));
        assert_eq!(Denise::new(Chipset::Ecs).read_register(DENISEID), Some(0x00FC));
    }
}
