//! Mouse on a game port: quadrature counters and two buttons.

/// POTGOR bit 10 (DATLY): right button on port 0, low when pressed.
pub const RIGHT_BUTTON_POT_BIT: u16 = 0x0400;
/// CIA-A PA6 (/FIR0): left button on port 0, low when pressed.
pub const LEFT_BUTTON_PA_BIT: u8 = 0x40;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mouse {
    x: u8,
    y: u8,
    left: bool,
    right: bool,
}

impl Mouse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters wrap at eight bits, as the hardware counters do.
    pub fn move_by(&mut self, dx: i16, dy: i16) {
        self.x = self.x.wrapping_add(dx as u8);
        self.y = self.y.wrapping_add(dy as u8);
    }

    pub fn set_buttons(&mut self, left: bool, right: bool) {
        self.left = left;
        self.right = right;
    }

    /// JOYxDAT layout: vertical count high, horizontal count low.
    #[must_use]
    pub fn joydat(&self) -> u16 {
        u16::from(self.y) << 8 | u16::from(self.x)
    }

    #[must_use]
    pub fn apply_to_port_a(&self, pins: u8) -> u8 {
        if self.left {
            pins & !LEFT_BUTTON_PA_BIT
        } else {
            pins | LEFT_BUTTON_PA_BIT
        }
    }

    #[must_use]
    pub fn apply_to_pot(&self, pins: u16) -> u16 {
        if self.right {
            pins & !RIGHT_BUTTON_POT_BIT
        } else {
            pins | RIGHT_BUTTON_POT_BIT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_wrap_and_pack() {
        let mut mouse = Mouse::new();
        mouse.move_by(-1, 2);
        assert_eq!(mouse.joydat(), 0x02FF);
        mouse.move_by(1, -3);
        assert_eq!(mouse.joydat(), 0xFF00);
    }

    #[test]
    fn buttons_pull_lines_low() {
        let mut mouse = Mouse::new();
        mouse.set_buttons(true, true);
        assert_eq!(mouse.apply_to_port_a(0xFF), 0xBF);
        assert_eq!(mouse.apply_to_pot(0xFF00), 0xFB00);
        mouse.set_buttons(false, false);
        assert_eq!(mouse.apply_to_port_a(0x00), 0x40);
    }
}
