//! Display window (DIW) and data-fetch window (DDF) decoding.
//!
//! The two windows are programmed independently. DDF decides which slots
//! carry bitplane DMA; DIW decides which lines fetch at all and where
//! Denise shows pixels instead of border.

/// OCS compares DDF bits H8-H2.
pub const OCS_DDF_MASK: u16 = 0x00FC;
/// ECS adds H1.
pub const ECS_DDF_MASK: u16 = 0x00FE;
pub const DDF_MIN: u16 = 0x18;
pub const DDF_MAX: u16 = 0xD8;
/// Colour clocks in one fetch unit.
pub const FETCH_UNIT: u16 = 8;

/// Plane fetched at each position of a lowres fetch unit. `None` slots are
/// free for the copper, blitter or CPU.
pub const LOWRES_FETCH_ORDER: [Option<u8>; 8] = [
    None,
    Some(3),
    Some(5),
    Some(1),
    None,
    Some(2),
    Some(4),
    Some(0),
];

/// Hires fetches four planes twice per unit.
pub const HIRES_FETCH_ORDER: [Option<u8>; 8] = [
    Some(3),
    Some(1),
    Some(2),
    Some(0),
    Some(3),
    Some(1),
    Some(2),
    Some(0),
];

/// Horizontal bitplane fetch range derived from DDFSTRT/DDFSTOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    start: u16,
    units: u16,
}

impl FetchWindow {
    #[must_use]
    pub fn from_registers(ddfstrt: u16, ddfstop: u16, mask: u16) -> Self {
        let start = (ddfstrt & mask).max(DDF_MIN);
        let stop = (ddfstop & mask).min(DDF_MAX);
        // A unit starts at every DDFSTRT + 8k that does not pass DDFSTOP.
        let units = if stop < start {
            0
        } else {
            (stop - start) / FETCH_UNIT + 1
        };
        Self { start, units }
    }

    #[must_use]
    pub fn start(&self) -> u16 {
        self.start
    }

    /// Exclusive end. The last unit always runs to completion.
    #[must_use]
    pub fn end(&self) -> u16 {
        self.start + self.units * FETCH_UNIT
    }

    #[must_use]
    pub fn units(&self) -> u16 {
        self.units
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units == 0
    }

    #[must_use]
    pub fn contains(&self, hpos: u16) -> bool {
        hpos >= self.start && hpos < self.end()
    }

    /// Position (0-7) of `hpos` within its fetch unit.
    #[must_use]
    pub fn unit_position(&self, hpos: u16) -> Option<usize> {
        self.contains(hpos)
            .then(|| usize::from((hpos - self.start) % FETCH_UNIT))
    }

    /// Last colour clock of the window, where modulos are applied.
    #[must_use]
    pub fn last_cycle(&self) -> Option<u16> {
        (!self.is_empty()).then(|| self.end() - 1)
    }

    /// Plane fetched at `hpos`, if any, for `planes` enabled planes.
    #[must_use]
    pub fn plane_at(&self, hpos: u16, planes: u8, hires: bool) -> Option<u8> {
        let position = self.unit_position(hpos)?;
        let order = if hires {
            &HIRES_FETCH_ORDER
        } else {
            &LOWRES_FETCH_ORDER
        };
        order[position].filter(|&plane| plane < planes)
    }
}

/// Display window in DIW coordinates (lowres pixels, lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayWindow {
    pub hstart: u16,
    pub hstop: u16,
    pub vstart: u16,
    pub vstop: u16,
}

impl DisplayWindow {
    /// Decode DIWSTRT/DIWSTOP. Without DIWHIGH, HSTART has H8 clear, HSTOP
    /// has H8 set, VSTART has V8 clear and VSTOP has V8 = !V7.
    #[must_use]
    pub fn from_registers(diwstrt: u16, diwstop: u16, diwhigh: Option<u16>) -> Self {
        let hstart_low = diwstrt & 0x00FF;
        let vstart_low = diwstrt >> 8;
        let hstop_low = diwstop & 0x00FF;
        let vstop_low = diwstop >> 8;
        match diwhigh {
            None => Self {
                hstart: hstart_low,
                hstop: 0x0100 | hstop_low,
                vstart: vstart_low,
                vstop: if vstop_low & 0x80 == 0 {
                    0x0100 | vstop_low
                } else {
                    vstop_low
                },
            },
            Some(high) => Self {
                hstart: hstart_low | ((high & 0x0020) << 3),
                hstop: hstop_low | ((high & 0x2000) >> 5),
                vstart: vstart_low | ((high & 0x0007) << 8),
                vstop: vstop_low | (high & 0x0700),
            },
        }
    }

    #[must_use]
    pub fn contains_line(&self, vpos: u16) -> bool {
        vpos >= self.vstart && vpos < self.vstop
    }

    #[must_use]
    pub fn contains_column(&self, x: u16) -> bool {
        x >= self.hstart && x < self.hstop
    }

    #[must_use]
    pub fn contains(&self, x: u16, vpos: u16) -> bool {
        self.contains_line(vpos) && self.contains_column(x)
    }
}
