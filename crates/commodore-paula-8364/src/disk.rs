//! Disk DMA controller: DSKLEN, DSKSYNC, DSKBYTR.
//!
//! Paula only sequences the transfer. Agnus owns DSKPT and grants the disk
//! slots; the drive supplies or consumes the raw MFM word stream.

use emu_core::RegisterPort;

pub const DSKBYTR: u16 = 0x01A;
pub const DSKLEN: u16 = 0x024;
pub const DSKDAT: u16 = 0x026;
pub const DSKSYNC: u16 = 0x07E;

const DSKLEN_DMAEN: u16 = 0x8000;
const DSKLEN_WRITE: u16 = 0x4000;
const DSKLEN_LENGTH: u16 = 0x3FFF;

/// ADKCON bit 10: wait for the sync word before a read transfer starts.
pub const ADKCON_WORDSYNC: u16 = 0x0400;

const DSKBYTR_BYTEREADY: u16 = 0x8000;
const DSKBYTR_DMAON: u16 = 0x4000;
const DSKBYTR_DISKWRITE: u16 = 0x2000;
const DSKBYTR_WORDEQUAL: u16 = 0x1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskDmaMode {
    Off,
    /// Read armed, waiting for DSKSYNC in the stream.
    WaitSync,
    Read,
    Write,
}

/// What the machine must do with a word after a granted disk slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStep {
    /// Store this word at DSKPT and advance the pointer.
    pub store: Option<u16>,
    /// The transfer just finished (DSKBLK).
    pub block_done: bool,
    /// The stream matched DSKSYNC (DSKSYN).
    pub sync_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskController {
    dsklen: u16,
    dsksync: u16,
    /// Set by the first of the two DSKLEN writes that arm DMA.
    armed: bool,
    mode: DiskDmaMode,
    words_left: u16,
    last_word: u16,
    byte_ready: bool,
    word_equal: bool,
}

impl Default for DiskController {
    fn default() -> Self {
        Self {
            dsklen: 0,
            dsksync: 0x4489,
            armed: false,
            mode: DiskDmaMode::Off,
            words_left: 0,
            last_word: 0,
            byte_ready: false,
            word_equal: false,
        }
    }
}

impl DiskController {
    #[must_use]
    pub fn mode(&self) -> DiskDmaMode {
        self.mode
    }

    #[must_use]
    pub fn words_left(&self) -> u16 {
        self.words_left
    }

    #[must_use]
    pub fn dsklen(&self) -> u16 {
        self.dsklen
    }

    #[must_use]
    pub fn dsksync(&self) -> u16 {
        self.dsksync
    }

    /// A transfer only starts after two consecutive DSKLEN writes with
    /// DMAEN set. Any write with DMAEN clear stops DMA and disarms.
    pub fn write_dsklen(&mut self, value: u16, adkcon: u16) {
        self.dsklen = value;
        if value & DSKLEN_DMAEN == 0 {
            self.armed = false;
            self.mode = DiskDmaMode::Off;
            return;
        }
        if !self.armed {
            self.armed = true;
            return;
        }
        self.armed = false;
        self.words_left = value & DSKLEN_LENGTH;
        self.mode = if value & DSKLEN_WRITE != 0 {
            DiskDmaMode::Write
        } else if adkcon & ADKCON_WORDSYNC != 0 {
            DiskDmaMode::WaitSync
        } else {
            DiskDmaMode::Read
        };
        if self.words_left == 0 {
            self.mode = DiskDmaMode::Off;
        }
        log::debug!(
            "disk DMA {:?} for {} words",
            self.mode,
            self.words_left
        );
    }

    /// Whether the disk slots of this line have work to do.
    #[must_use]
    pub fn wants_dma(&self) -> bool {
        self.mode != DiskDmaMode::Off
    }

    /// Feed one word read from the drive during a granted slot.
    pub fn read_word(&mut self, word: u16) -> DiskStep {
        self.last_word = word;
        self.byte_ready = true;
        self.word_equal = word == self.dsksync;
        let mut step = DiskStep {
            store: None,
            block_done: false,
            sync_found: self.word_equal,
        };
        match self.mode {
            DiskDmaMode::WaitSync if self.word_equal => self.mode = DiskDmaMode::Read,
            DiskDmaMode::Read => {
                step.store = Some(word);
                step.block_done = self.consume();
            }
            _ => {}
        }
        step
    }

    /// A word was fetched from DSKPT and handed to the drive.
    /// Returns true when the write transfer finished.
    pub fn wrote_word(&mut self) -> bool {
        self.mode == DiskDmaMode::Write && self.consume()
    }

    fn consume(&mut self) -> bool {
        self.words_left -= 1;
        if self.words_left == 0 {
            self.mode = DiskDmaMode::Off;
            log::debug!("disk DMA block complete");
            return true;
        }
        false
    }

    fn dskbytr(&self) -> u16 {
        let mut value = self.last_word & 0x00FF;
        if self.byte_ready {
            value |= DSKBYTR_BYTEREADY;
        }
        if self.mode != DiskDmaMode::Off {
            value |= DSKBYTR_DMAON;
        }
        if self.dsklen & DSKLEN_WRITE != 0 {
            value |= DSKBYTR_DISKWRITE;
        }
        if self.word_equal {
            value |= DSKBYTR_WORDEQUAL;
        }
        value
    }
}

impl RegisterPort for DiskController {
    fn read_register(&self, offset: u16) -> Option<u16> {
        match offset {
            DSKBYTR => Some(self.dskbytr()),
            _ => None,
        }
    }

    /// DSKLEN needs ADKCON and is routed through [`DiskController::write_dsklen`].
    fn write_register(&mut self, offset: u16, value: u16) -> bool {
        match offset {
            DSKSYNC => self.dsksync = value,
            // Non-DMA writes of the data register are not used by any
            // supported drive path.
            DSKDAT => {}
            _ => return false,
        }
        true
    }
}
