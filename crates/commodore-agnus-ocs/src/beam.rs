//! Beam counter.
//!
//! The raster clock counts colour clocks (CCKs). It is the only owner of the
//! beam position; every other unit reads it or reacts to the edges reported
//! by the most recent [`RasterClock::tick`].

use bitflags::bitflags;
use thiserror::Error;

pub const PAL_CCKS_PER_LINE: u16 = 227;
pub const PAL_LINES_PER_FRAME: u16 = 312;
pub const NTSC_CCKS_PER_LINE: u16 = 227;
pub const NTSC_LINES_PER_FRAME: u16 = 262;

bitflags! {
    /// Raster boundaries crossed by the most recent tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClockState: u8 {
        const START_OF_LINE = 0x01;
        const END_OF_LINE = 0x02;
        const START_OF_FRAME = 0x04;
        const END_OF_FRAME = 0x08;
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RasterError {
    #[error("raster line width must be at least one colour clock")]
    ZeroLineWidth,
    #[error("raster frame height must be at least one line")]
    ZeroFrameHeight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterClock {
    line_width: u16,
    frame_height: u16,
    hpos: u16,
    vpos: u16,
    ticks: u64,
    state: ClockState,
    interlace: bool,
    long_frame: bool,
}

impl RasterClock {
    pub fn new(line_width: u16, frame_height: u16) -> Result<Self, RasterError> {
        if line_width == 0 {
            return Err(RasterError::ZeroLineWidth);
        }
        if frame_height == 0 {
            return Err(RasterError::ZeroFrameHeight);
        }
        Ok(Self::with_dimensions(line_width, frame_height))
    }

    #[must_use]
    pub fn pal() -> Self {
        Self::with_dimensions(PAL_CCKS_PER_LINE, PAL_LINES_PER_FRAME)
    }

    #[must_use]
    pub fn ntsc() -> Self {
        Self::with_dimensions(NTSC_CCKS_PER_LINE, NTSC_LINES_PER_FRAME)
    }

    const fn with_dimensions(line_width: u16, frame_height: u16) -> Self {
        Self {
            line_width,
            frame_height,
            hpos: 0,
            vpos: 0,
            ticks: 0,
            state: ClockState::empty(),
            interlace: false,
            long_frame: false,
        }
    }

    /// Advance by `cycles` colour clocks.
    ///
    /// The edge state reports every boundary crossed during this call and
    /// is cleared by the next one.
    pub fn tick(&mut self, cycles: u32) {
        self.state = ClockState::empty();
        for _ in 0..cycles {
            self.step();
        }
    }

    fn step(&mut self) {
        self.ticks += 1;
        self.hpos += 1;
        if self.hpos == self.line_width {
            self.hpos = 0;
            self.vpos += 1;
            self.state |= ClockState::START_OF_LINE;
            if self.vpos >= self.lines_this_frame() {
                self.vpos = 0;
                if self.interlace {
                    self.long_frame = !self.long_frame;
                }
                self.state |= ClockState::START_OF_FRAME;
            }
        }
        if self.hpos == self.line_width - 1 {
            self.state |= ClockState::END_OF_LINE;
            if self.vpos == self.lines_this_frame() - 1 {
                self.state |= ClockState::END_OF_FRAME;
            }
        }
    }

    #[must_use]
    pub fn hpos(&self) -> u16 {
        self.hpos
    }

    #[must_use]
    pub fn vpos(&self) -> u16 {
        self.vpos
    }

    /// Colour clocks elapsed since construction.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub fn state(&self) -> ClockState {
        self.state
    }

    #[must_use]
    pub fn start_of_line(&self) -> bool {
        self.state.contains(ClockState::START_OF_LINE)
    }

    #[must_use]
    pub fn end_of_line(&self) -> bool {
        self.state.contains(ClockState::END_OF_LINE)
    }

    #[must_use]
    pub fn start_of_frame(&self) -> bool {
        self.state.contains(ClockState::START_OF_FRAME)
    }

    #[must_use]
    pub fn end_of_frame(&self) -> bool {
        self.state.contains(ClockState::END_OF_FRAME)
    }

    #[must_use]
    pub fn line_width(&self) -> u16 {
        self.line_width
    }

    /// Configured short-frame height.
    #[must_use]
    pub fn frame_height(&self) -> u16 {
        self.frame_height
    }

    /// Lines in the frame being drawn. Long frames carry one extra line.
    #[must_use]
    pub fn lines_this_frame(&self) -> u16 {
        if self.long_frame {
            self.frame_height.saturating_add(1)
        } else {
            self.frame_height
        }
    }

    pub fn set_interlace(&mut self, enabled: bool) {
        self.interlace = enabled;
        if !enabled {
            self.long_frame = false;
        }
    }

    #[must_use]
    pub fn interlace(&self) -> bool {
        self.interlace
    }

    #[must_use]
    pub fn long_frame(&self) -> bool {
        self.long_frame
    }

    /// Move the beam without reporting edges. Out-of-range values wrap.
    pub fn set_position(&mut self, vpos: u16, hpos: u16) {
        self.hpos = hpos % self.line_width;
        self.vpos = vpos % self.lines_this_frame();
    }

    /// VPOSR: LOF in bit 15, chip id in bits 14-8, V10-V8 in bits 2-0.
    #[must_use]
    pub fn vposr(&self, agnus_id: u8) -> u16 {
        let lof = if self.long_frame { 0x8000 } else { 0 };
        lof | (u16::from(agnus_id & 0x7F) << 8) | ((self.vpos >> 8) & 0x0007)
    }

    /// VHPOSR: V7-V0 in the high byte, H8-H1 in the low byte.
    #[must_use]
    pub fn vhposr(&self) -> u16 {
        ((self.vpos & 0x00FF) << 8) | (self.hpos & 0x00FF)
    }

    pub fn write_vposw(&mut self, value: u16) {
        self.long_frame = value & 0x8000 != 0;
        let vpos = (self.vpos & 0x00FF) | ((value & 0x0007) << 8);
        self.set_position(vpos, self.hpos);
    }

    pub fn write_vhposw(&mut self, value: u16) {
        let vpos = (self.vpos & 0xFF00) | (value >> 8);
        self.set_position(vpos, value & 0x00FF);
    }
}
