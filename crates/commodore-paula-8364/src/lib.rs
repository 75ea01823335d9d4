//! Commodore 8364 Paula: interrupt controller, audio, disk and serial.
//!
//! Paula maps fourteen interrupt sources onto six CPU levels, plays four
//! DMA-fed audio channels and sequences disk DMA. Agnus owns the DMA
//! pointers and slots; Paula decides when a slot has work.

pub mod audio;
pub mod disk;
pub mod interrupt;

use emu_core::{RegisterPort, set_clr};

pub use audio::{Audio, AudioChannel};
pub use disk::{ADKCON_WORDSYNC, DiskController, DiskDmaMode, DiskStep};
pub use interrupt::{INTEN, InterruptController, InterruptSource};

pub const ADKCONR: u16 = 0x010;
pub const POTGOR: u16 = 0x016;
pub const SERDATR: u16 = 0x018;
pub const INTENAR: u16 = 0x01C;
pub const INTREQR: u16 = 0x01E;
pub const SERDAT: u16 = 0x030;
pub const SERPER: u16 = 0x032;
pub const POTGO: u16 = 0x034;
pub const INTENA: u16 = 0x09A;
pub const INTREQ: u16 = 0x09C;
pub const ADKCON: u16 = 0x09E;

/// SERDATR: transmit buffer empty, transmit shift register empty.
const SERDATR_TBE: u16 = 0x2000;
const SERDATR_TSRE: u16 = 0x1000;

#[derive(Debug, Clone, Default)]
pub struct Paula8364 {
    pub interrupts: InterruptController,
    pub disk: DiskController,
    pub audio: Audio,
    adkcon: u16,
    serper: u16,
    potgo: u16,
    /// POTGOR input levels. Bit 10 (DATLY) is the right mouse button, low
    /// when pressed.
    pot_pins: u16,
    /// Bytes written to SERDAT, oldest first.
    serial_out: Vec<u8>,
}

impl Paula8364 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pot_pins: 0xFF00,
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        let pot_pins = self.pot_pins;
        *self = Self::new();
        self.pot_pins = pot_pins;
    }

    #[must_use]
    pub fn adkcon(&self) -> u16 {
        self.adkcon
    }

    pub fn write_adkcon(&mut self, value: u16) {
        self.adkcon = set_clr(self.adkcon, value);
    }

    pub fn write_dsklen(&mut self, value: u16) {
        self.disk.write_dsklen(value, self.adkcon);
    }

    pub fn set_pot_pins(&mut self, pins: u16) {
        self.pot_pins = pins;
    }

    #[must_use]
    pub fn potgo(&self) -> u16 {
        self.potgo
    }

    #[must_use]
    pub fn serper(&self) -> u16 {
        self.serper
    }

    pub fn take_serial_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.serial_out)
    }

    /// CPU IPL, re-evaluated on every call.
    #[must_use]
    pub fn interrupt_level(&self) -> u8 {
        self.interrupts.interrupt_level()
    }

    fn potgor(&self) -> u16 {
        // Pins configured as outputs read back the driven level.
        let out_enable = self.potgo & 0xAA00;
        let out_data = (self.potgo & 0x5500) << 1;
        let driven = (out_data & out_enable) | (out_data & out_enable) >> 1;
        let inputs = self.pot_pins & !(out_enable | out_enable >> 1);
        driven | inputs
    }
}

impl RegisterPort for Paula8364 {
    fn read_register(&self, offset: u16) -> Option<u16> {
        match offset {
            ADKCONR => Some(self.adkcon),
            POTGOR => Some(self.potgor()),
            SERDATR => Some(SERDATR_TBE | SERDATR_TSRE),
            INTENAR => Some(self.interrupts.intena()),
            INTREQR => Some(self.interrupts.intreq()),
            _ => self
                .disk
                .read_register(offset)
                .or_else(|| self.audio.read_register(offset)),
        }
    }

    fn write_register(&mut self, offset: u16, value: u16) -> bool {
        match offset {
            INTENA => self.interrupts.write_intena(value),
            INTREQ => self.interrupts.write_intreq(value),
            ADKCON => self.write_adkcon(value),
            disk::DSKLEN => self.write_dsklen(value),
            SERPER => self.serper = value,
            SERDAT => {
                self.serial_out.push(value as u8);
                self.interrupts.raise(InterruptSource::Tbe);
            }
            POTGO => self.potgo = value & 0xFF01,
            _ => {
                return self.disk.write_register(offset, value)
                    || self.audio.write_register(offset, value);
            }
        }
        true
    }
}
