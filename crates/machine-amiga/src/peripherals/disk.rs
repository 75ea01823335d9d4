//! Floppy drive mechanism.
//!
//! The drive sees CIA-B port B as its control lines and answers on CIA-A
//! port A. Media is a set of raw MFM tracks; decoding disk image formats
//! happens before the bytes get here.

/// Colour clocks per MFM word at the 2 µs double-density bit cell.
pub const CCK_PER_WORD: u32 = 112;
/// Colour clocks for the motor to reach speed (about 500 ms on PAL).
pub const MOTOR_SPINUP_CCK: u32 = 1_773_000;
pub const CYLINDERS: u8 = 80;

/// CIA-B port B decoded. Every field is true when its line is asserted
/// (driven low).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskLines {
    pub step: bool,
    /// /DIR low steps towards the spindle.
    pub inward: bool,
    /// /SIDE low selects the upper head.
    pub upper_head: bool,
    pub select: bool,
    pub motor: bool,
}

impl DiskLines {
    /// Decode PRB pins: PB0 /STEP, PB1 /DIR, PB2 /SIDE, PB3 /SEL0, PB7 /MTR.
    #[must_use]
    pub fn from_port_b(pins: u8) -> Self {
        Self {
            step: pins & 0x01 == 0,
            inward: pins & 0x02 == 0,
            upper_head: pins & 0x04 == 0,
            select: pins & 0x08 == 0,
            motor: pins & 0x80 == 0,
        }
    }
}

/// Status lines towards CIA-A, true when asserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveStatus {
    pub disk_change: bool,
    pub write_protect: bool,
    pub track0: bool,
    pub ready: bool,
}

impl DriveStatus {
    /// CIA-A PA5-PA2 (/RDY, /TRK0, /PROT, /CHNG), active low, merged into
    /// `pins`.
    #[must_use]
    pub fn apply_to_port_a(self, pins: u8) -> u8 {
        let mut value = pins | 0x3C;
        for (asserted, bit) in [
            (self.disk_change, 0x04),
            (self.write_protect, 0x08),
            (self.track0, 0x10),
            (self.ready, 0x20),
        ] {
            if asserted {
                value &= !bit;
            }
        }
        value
    }
}

/// A drive on the DF0: connector.
pub trait DiskDrive: Send {
    /// Load raw MFM tracks, indexed by `cylinder * 2 + head`.
    fn insert(&mut self, tracks: Vec<Vec<u8>>, write_protected: bool);

    fn eject(&mut self);

    fn has_disk(&self) -> bool;

    fn set_control(&mut self, lines: DiskLines);

    fn status(&self) -> DriveStatus;

    /// Advance one colour clock. Returns true on the index pulse.
    fn tick(&mut self) -> bool;

    /// A word has passed the head and is waiting for disk DMA.
    fn word_ready(&self) -> bool;

    /// Take the word under the head.
    fn read_word(&mut self) -> Option<u16>;

    /// Write a word in the current cell. Ignored on protected media.
    fn write_word(&mut self, word: u16);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloppyDrive {
    /// Raw MFM bytes, indexed by `cylinder * 2 + head`.
    tracks: Vec<Vec<u8>>,
    write_protected: bool,
    cylinder: u8,
    head: u8,
    selected: bool,
    motor_on: bool,
    spin: u32,
    spinup_cck: u32,
    disk_changed: bool,
    prev_step: bool,
    /// Byte offset of the current cell in the track.
    position: usize,
    word_timer: u32,
    ready_word: bool,
}

impl Default for FloppyDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl FloppyDrive {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            write_protected: false,
            cylinder: 0,
            head: 0,
            selected: false,
            motor_on: false,
            spin: 0,
            spinup_cck: MOTOR_SPINUP_CCK,
            disk_changed: true,
            prev_step: false,
            position: 0,
            word_timer: 0,
            ready_word: false,
        }
    }

    /// Override the motor spin-up time.
    #[must_use]
    pub fn with_spinup(mut self, cck: u32) -> Self {
        self.spinup_cck = cck;
        self
    }

    #[must_use]
    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    #[must_use]
    pub fn head(&self) -> u8 {
        self.head
    }

    #[must_use]
    pub fn motor_on(&self) -> bool {
        self.motor_on
    }

    #[must_use]
    pub fn track(&self, index: usize) -> Option<&[u8]> {
        self.tracks.get(index).map(Vec::as_slice)
    }

    fn spinning(&self) -> bool {
        self.motor_on && self.spin >= self.spinup_cck
    }

    fn current_track(&self) -> Option<&Vec<u8>> {
        self.tracks
            .get(usize::from(self.cylinder) * 2 + usize::from(self.head))
            .filter(|t| t.len() >= 2)
    }
}

impl DiskDrive for FloppyDrive {
    fn insert(&mut self, tracks: Vec<Vec<u8>>, write_protected: bool) {
        self.tracks = tracks;
        self.write_protected = write_protected;
        self.position = 0;
    }

    /// /CHNG stays asserted until the head steps with a disk present.
    fn eject(&mut self) {
        self.tracks.clear();
        self.disk_changed = true;
    }

    fn has_disk(&self) -> bool {
        !self.tracks.is_empty()
    }

    fn set_control(&mut self, lines: DiskLines) {
        // The motor flip-flop latches /MTR while the drive is selected.
        if lines.select && !self.selected {
            if lines.motor != self.motor_on {
                self.spin = 0;
            }
            self.motor_on = lines.motor;
        }
        self.selected = lines.select;
        self.head = u8::from(lines.upper_head);

        let step_edge = lines.step && !self.prev_step;
        self.prev_step = lines.step;
        if step_edge && self.selected {
            if lines.inward {
                self.cylinder = (self.cylinder + 1).min(CYLINDERS - 1);
            } else {
                self.cylinder = self.cylinder.saturating_sub(1);
            }
            if self.has_disk() {
                self.disk_changed = false;
            }
        }
    }

    fn status(&self) -> DriveStatus {
        if !self.selected {
            return DriveStatus::default();
        }
        DriveStatus {
            disk_change: self.disk_changed,
            write_protect: self.has_disk() && self.write_protected,
            track0: self.cylinder == 0,
            ready: self.spinning(),
        }
    }

    fn tick(&mut self) -> bool {
        if self.motor_on && self.spin < self.spinup_cck {
            self.spin += 1;
        }
        if !self.spinning() {
            return false;
        }
        let Some(len) = self.current_track().map(Vec::len) else {
            return false;
        };
        self.word_timer += 1;
        if self.word_timer < CCK_PER_WORD {
            return false;
        }
        self.word_timer = 0;
        self.ready_word = true;
        self.position += 2;
        if self.position + 1 >= len {
            self.position = 0;
            return true;
        }
        false
    }

    fn word_ready(&self) -> bool {
        self.ready_word
    }

    fn read_word(&mut self) -> Option<u16> {
        if !self.ready_word {
            return None;
        }
        self.ready_word = false;
        let at = self.position;
        self.current_track()
            .map(|t| u16::from_be_bytes([t[at], t[at + 1]]))
    }

    fn write_word(&mut self, word: u16) {
        if !self.ready_word {
            return;
        }
        self.ready_word = false;
        if self.write_protected {
            return;
        }
        let index = usize::from(self.cylinder) * 2 + usize::from(self.head);
        let at = self.position;
        if let Some(track) = self.tracks.get_mut(index).filter(|t| at + 1 < t.len()) {
            track[at..at + 2].copy_from_slice(&word.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selected(motor: bool, inward: bool, step: bool) -> DiskLines {
        DiskLines {
            step,
            inward,
            upper_head: false,
            select: true,
            motor,
        }
    }

    fn select_with_motor(drive: &mut FloppyDrive) {
        drive.set_control(DiskLines::default());
        drive.set_control(selected(true, false, false));
    }

    fn spinning_drive(track: Vec<u8>) -> FloppyDrive {
        let mut drive = FloppyDrive::new().with_spinup(0);
        drive.insert(vec![track], false);
        select_with_motor(&mut drive);
        drive
    }

    #[test]
    fn port_b_lines_are_active_low() {
        let lines = DiskLines::from_port_b(0b0111_0110);
        assert!(lines.step);
        assert!(!lines.inward);
        assert!(!lines.upper_head);
        assert!(lines.select);
        assert!(lines.motor);
    }

    #[test]
    fn steps_on_falling_edge_within_bounds() {
        let mut drive = FloppyDrive::new();
        drive.set_control(selected(false, true, false));
        drive.set_control(selected(false, true, true));
        assert_eq!(drive.cylinder(), 1);
        // Held low: no further step.
        drive.set_control(selected(false, true, true));
        assert_eq!(drive.cylinder(), 1);
        for _ in 0..100 {
            drive.set_control(selected(false, false, false));
            drive.set_control(selected(false, false, true));
        }
        assert_eq!(drive.cylinder(), 0);
        assert!(drive.status().track0);
    }

    #[test]
    fn motor_latches_on_select_and_spins_up() {
        let mut drive = FloppyDrive::new().with_spinup(10);
        select_with_motor(&mut drive);
        assert!(drive.motor_on());
        assert!(!drive.status().ready);
        for _ in 0..10 {
            drive.tick();
        }
        assert!(drive.status().ready);
    }

    #[test]
    fn step_with_disk_clears_change() {
        let mut drive = FloppyDrive::new();
        drive.insert(vec![vec![0; 16]; 2], false);
        drive.set_control(selected(false, true, false));
        assert!(drive.status().disk_change);
        drive.set_control(selected(false, true, true));
        assert!(!drive.status().disk_change);
    }

    #[test]
    fn words_arrive_at_bit_cell_rate() {
        let mut drive = spinning_drive(vec![0x44, 0x89, 0x12, 0x34, 0x56, 0x78]);
        for _ in 0..CCK_PER_WORD - 1 {
            drive.tick();
        }
        assert!(!drive.word_ready());
        drive.tick();
        assert_eq!(drive.read_word(), Some(0x1234));
        assert_eq!(drive.read_word(), None);
    }

    #[test]
    fn index_pulse_once_per_revolution() {
        let mut drive = spinning_drive(vec![0; 8]);
        let pulses = (0..CCK_PER_WORD * 8).filter(|_| drive.tick()).count();
        assert_eq!(pulses, 2);
    }

    #[test]
    fn protected_media_ignores_writes() {
        let mut drive = FloppyDrive::new().with_spinup(0);
        drive.insert(vec![vec![0; 8]], true);
        select_with_motor(&mut drive);
        for _ in 0..CCK_PER_WORD {
            drive.tick();
        }
        drive.write_word(0xBEEF);
        assert_eq!(drive.track(0), Some(&[0u8; 8][..]));
        assert!(drive.status().write_protect);
    }

    #[test]
    fn status_maps_to_cia_a_pins() {
        let status = DriveStatus {
            disk_change: true,
            write_protect: false,
            track0: true,
            ready: false,
        };
        assert_eq!(status.apply_to_port_a(0xFF), 0xFF & !0x04 & !0x10);
    }
}
