//! Per-slot DMA activity recorder for debug overlays.

use commodore_agnus_ocs::DmaSource;

/// Lines and slots covered by one buffer. A long PAL frame has 313 lines.
pub const MAX_LINES: usize = 313;
pub const SLOTS_PER_LINE: usize = 227;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DmaActivity {
    #[default]
    Idle,
    Read,
    Write,
    Refresh,
    /// The CPU wanted this slot and lost it to the recorded source.
    CpuWait,
}

pub type SlotRecord = (DmaActivity, DmaSource);

#[derive(Debug, Clone)]
pub struct ActivityRecorder {
    enabled: bool,
    current: Vec<SlotRecord>,
    previous: Vec<SlotRecord>,
}

impl ActivityRecorder {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let blank = vec![(DmaActivity::Idle, DmaSource::None); MAX_LINES * SLOTS_PER_LINE];
        Self {
            enabled,
            current: blank.clone(),
            previous: blank,
        }
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn record(&mut self, vpos: u16, hpos: u16, activity: DmaActivity, source: DmaSource) {
        if !self.enabled {
            return;
        }
        if let Some(slot) = index(vpos, hpos).and_then(|i| self.current.get_mut(i)) {
            *slot = (activity, source);
        }
    }

    /// Keep the finished frame for overlays and start a blank one.
    pub fn end_frame(&mut self) {
        if !self.enabled {
            return;
        }
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.fill((DmaActivity::Idle, DmaSource::None));
    }

    #[must_use]
    pub fn current(&self, vpos: u16, hpos: u16) -> Option<SlotRecord> {
        index(vpos, hpos).and_then(|i| self.current.get(i).copied())
    }

    #[must_use]
    pub fn previous(&self, vpos: u16, hpos: u16) -> Option<SlotRecord> {
        index(vpos, hpos).and_then(|i| self.previous.get(i).copied())
    }

    /// One line of the frame in progress.
    #[must_use]
    pub fn current_line(&self, vpos: u16) -> Option<&[SlotRecord]> {
        let start = usize::from(vpos) * SLOTS_PER_LINE;
        self.current.get(start..start + SLOTS_PER_LINE)
    }
}

fn index(vpos: u16, hpos: u16) -> Option<usize> {
    let (v, h) = (usize::from(vpos), usize::from(hpos));
    (v < MAX_LINES && h < SLOTS_PER_LINE).then_some(v * SLOTS_PER_LINE + h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_recorder_keeps_nothing() {
        let mut recorder = ActivityRecorder::new(false);
        recorder.record(10, 10, DmaActivity::Read, DmaSource::Bitplane);
        assert_eq!(
            recorder.current(10, 10),
            Some((DmaActivity::Idle, DmaSource::None))
        );
    }

    #[test]
    fn frame_end_moves_buffer_to_previous() {
        let mut recorder = ActivityRecorder::new(true);
        recorder.record(0x2C, 0x3F, DmaActivity::Read, DmaSource::Bitplane);
        recorder.end_frame();
        assert_eq!(
            recorder.previous(0x2C, 0x3F),
            Some((DmaActivity::Read, DmaSource::Bitplane))
        );
        assert_eq!(
            recorder.current(0x2C, 0x3F),
            Some((DmaActivity::Idle, DmaSource::None))
        );
    }

    #[test]
    fn out_of_range_positions_are_ignored() {
        let mut recorder = ActivityRecorder::new(true);
        recorder.record(400, 0, DmaActivity::Read, DmaSource::Cpu);
        assert_eq!(recorder.current(400, 0), None);
        assert!(recorder.current_line(312).is_some());
        assert!(recorder.current_line(313).is_none());
    }
}
