//! The four audio channels (AUD0-AUD3).
//!
//! Each channel plays 8-bit signed samples, two per word, at a rate set by
//! its period register. With DMA on, the channel asks for a new word from
//! AUDxLC whenever its two-word buffer has room; at the end of a block it
//! reloads the pointer and raises its interrupt.

use emu_core::RegisterPort;

/// First audio register (AUD0LCH).
pub const AUDIO_BASE: u16 = 0x0A0;
const CHANNEL_STRIDE: u16 = 0x10;
/// Periods below this cannot be fetched fast enough by DMA.
const MIN_PERIOD: u16 = 124;

const DMACON_DMAEN: u16 = 0x0200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioChannel {
    lc: u32,
    len: u16,
    per: u16,
    vol: u8,
    dat: u16,

    pointer: u32,
    words_left: u32,
    dma_on: bool,
    playing: Option<u16>,
    buffered: Option<u16>,
    low_byte_next: bool,
    countdown: u16,
    sample: i8,
}

impl Default for AudioChannel {
    fn default() -> Self {
        Self {
            lc: 0,
            len: 0,
            per: 0,
            vol: 0,
            dat: 0,
            pointer: 0,
            words_left: 0,
            dma_on: false,
            playing: None,
            buffered: None,
            low_byte_next: false,
            countdown: MIN_PERIOD,
            sample: 0,
        }
    }
}

impl AudioChannel {
    fn period(&self) -> u16 {
        self.per.max(MIN_PERIOD)
    }

    fn block_words(&self) -> u32 {
        if self.len == 0 { 0x1_0000 } else { u32::from(self.len) }
    }

    fn restart_block(&mut self) {
        self.pointer = self.lc & !1;
        self.words_left = self.block_words();
    }

    /// Follow the channel's DMACON enable. Returns true when a block starts.
    fn set_dma(&mut self, enabled: bool) -> bool {
        match (self.dma_on, enabled) {
            (false, true) => {
                self.dma_on = true;
                self.restart_block();
                self.playing = None;
                self.buffered = None;
                true
            }
            (true, false) => {
                self.dma_on = false;
                self.buffered = None;
                false
            }
            _ => false,
        }
    }

    /// Whether this channel's DMA slot would be used this line.
    #[must_use]
    pub fn wants_dma(&self) -> bool {
        self.dma_on && (self.playing.is_none() || self.buffered.is_none())
    }

    #[must_use]
    pub fn dma_address(&self) -> u32 {
        self.pointer
    }

    /// Deliver the word fetched at `dma_address`. Returns true when the
    /// block wrapped (audio interrupt).
    fn deliver(&mut self, word: u16) -> bool {
        self.dat = word;
        if self.playing.is_none() {
            self.playing = Some(word);
            self.low_byte_next = false;
        } else {
            self.buffered = Some(word);
        }
        self.pointer = self.pointer.wrapping_add(2);
        self.words_left -= 1;
        if self.words_left == 0 {
            self.restart_block();
            return true;
        }
        false
    }

    fn write_dat(&mut self, value: u16) {
        self.dat = value;
        if !self.dma_on {
            self.playing = Some(value);
            self.low_byte_next = false;
            self.countdown = self.period();
        }
    }

    /// One colour clock of the period counter.
    fn tick(&mut self) {
        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return;
        }
        self.countdown = self.period();
        let Some(word) = self.playing else {
            return;
        };
        let byte = if self.low_byte_next { word as u8 } else { (word >> 8) as u8 };
        self.sample = byte as i8;
        if self.low_byte_next {
            self.playing = self.buffered.take();
        }
        self.low_byte_next = !self.low_byte_next;
    }

    #[must_use]
    pub fn sample(&self) -> i8 {
        self.sample
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.vol
    }

    #[must_use]
    pub fn period_register(&self) -> u16 {
        self.per
    }

    fn output(&self) -> f32 {
        f32::from(self.sample) / 128.0 * f32::from(self.vol) / 64.0
    }
}

/// All four channels.
#[derive(Debug, Clone, Default)]
pub struct Audio {
    channels: [AudioChannel; 4],
}

impl Audio {
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&AudioChannel> {
        self.channels.get(index)
    }

    /// Apply DMACON. Returns an INTREQ mask of channels that started a block.
    pub fn sync_dma(&mut self, dmacon: u16) -> u16 {
        let master = dmacon & DMACON_DMAEN != 0;
        let mut irq = 0;
        for (i, ch) in self.channels.iter_mut().enumerate() {
            if ch.set_dma(master && dmacon & (1 << i) != 0) {
                irq |= 1 << (7 + i);
            }
        }
        irq
    }

    #[must_use]
    pub fn wants_dma(&self, channel: usize) -> bool {
        self.channels.get(channel).is_some_and(AudioChannel::wants_dma)
    }

    #[must_use]
    pub fn dma_address(&self, channel: usize) -> Option<u32> {
        self.channels.get(channel).map(AudioChannel::dma_address)
    }

    /// Hand a fetched word to `channel`. Returns an INTREQ mask.
    pub fn deliver(&mut self, channel: usize, word: u16) -> u16 {
        match self.channels.get_mut(channel) {
            Some(ch) => {
                if ch.deliver(word) {
                    1 << (7 + channel)
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    pub fn tick(&mut self) {
        for ch in &mut self.channels {
            ch.tick();
        }
    }

    /// Stereo mix in `[-1.0, 1.0]`. Channels 0 and 3 go left, 1 and 2 right.
    #[must_use]
    pub fn mix(&self) -> (f32, f32) {
        let [a0, a1, a2, a3] = &self.channels;
        let left = (a0.output() + a3.output()) * 0.5;
        let right = (a1.output() + a2.output()) * 0.5;
        (left.clamp(-1.0, 1.0), right.clamp(-1.0, 1.0))
    }

    fn locate(offset: u16) -> Option<(usize, u16)> {
        let rel = offset.checked_sub(AUDIO_BASE)?;
        let channel = usize::from(rel / CHANNEL_STRIDE);
        (channel < 4).then_some((channel, (rel % CHANNEL_STRIDE) / 2))
    }
}

impl RegisterPort for Audio {
    fn read_register(&self, offset: u16) -> Option<u16> {
        let (channel, reg) = Self::locate(offset)?;
        let ch = &self.channels[channel];
        Some(match reg {
            0 => (ch.lc >> 16) as u16,
            1 => ch.lc as u16,
            2 => ch.len,
            3 => ch.per,
            4 => u16::from(ch.vol),
            5 => ch.dat,
            _ => 0,
        })
    }

    fn write_register(&mut self, offset: u16, value: u16) -> bool {
        let Some((channel, reg)) = Self::locate(offset) else {
            return false;
        };
        let ch = &mut self.channels[channel];
        match reg {
            0 => ch.lc = (ch.lc & 0xFFFF) | (u32::from(value & 0x001F) << 16),
            1 => ch.lc = (ch.lc & 0xFFFF_0000) | u32::from(value & 0xFFFE),
            2 => ch.len = value,
            3 => ch.per = value,
            // Bit 6 alone means full volume.
            4 => ch.vol = if value & 0x40 != 0 { 64 } else { (value & 0x3F) as u8 },
            5 => ch.write_dat(value),
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUD0EN: u16 = 0x0001;

    fn program(audio: &mut Audio, lc: u32, len: u16, per: u16, vol: u16) {
        audio.write_register(0x0A0, (lc >> 16) as u16);
        audio.write_register(0x0A2, lc as u16);
        audio.write_register(0x0A4, len);
        audio.write_register(0x0A6, per);
        audio.write_register(0x0A8, vol);
    }

    #[test]
    fn registers_read_back() {
        let mut audio = Audio::default();
        program(&mut audio, 0x0001_2345, 0x20, 300, 0x7F);
        assert_eq!(audio.read_register(0x0A0), Some(0x0001));
        assert_eq!(audio.read_register(0x0A2), Some(0x2344));
        assert_eq!(audio.read_register(0x0A6), Some(300));
        assert_eq!(audio.read_register(0x0A8), Some(64));
        assert_eq!(audio.read_register(0x0E0), None);
        assert!(!audio.write_register(0x096, 0));
    }

    #[test]
    fn dma_start_raises_interrupt_and_requests_words() {
        let mut audio = Audio::default();
        program(&mut audio, 0x1000, 2, 124, 64);
        assert_eq!(audio.sync_dma(DMACON_DMAEN | AUD0EN), 0x0080);
        assert_eq!(audio.sync_dma(DMACON_DMAEN | AUD0EN), 0);
        assert!(audio.wants_dma(0));
        assert_eq!(audio.dma_address(0), Some(0x1000));
        assert_eq!(audio.deliver(0, 0x7F80), 0);
        assert_eq!(audio.dma_address(0), Some(0x1002));
        // Second word ends the two-word block.
        assert_eq!(audio.deliver(0, 0x0000), 0x0080);
        assert_eq!(audio.dma_address(0), Some(0x1000));
        assert!(!audio.wants_dma(0));
    }

    #[test]
    fn samples_play_high_byte_first() {
        let mut audio = Audio::default();
        program(&mut audio, 0x1000, 1, 124, 64);
        audio.sync_dma(DMACON_DMAEN | AUD0EN);
        audio.deliver(0, 0x7F80);
        for _ in 0..MIN_PERIOD {
            audio.tick();
        }
        assert_eq!(audio.channel(0).map(AudioChannel::sample), Some(0x7F));
        let (left, right) = audio.mix();
        assert!(left > 0.4, "left={left}");
        assert!(right.abs() < f32::EPSILON);
        for _ in 0..MIN_PERIOD {
            audio.tick();
        }
        assert_eq!(audio.channel(0).map(AudioChannel::sample), Some(-128));
    }

    #[test]
    fn master_dma_bit_gates_channels() {
        let mut audio = Audio::default();
        program(&mut audio, 0x1000, 1, 124, 64);
        assert_eq!(audio.sync_dma(AUD0EN), 0);
        assert!(!audio.wants_dma(0));
    }
}
