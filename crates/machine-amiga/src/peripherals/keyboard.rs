//! Keyboard controller, modelled at the level of its serial protocol.
//!
//! Every byte goes out on CIA-A's SP line rotated left one bit and
//! inverted, and the keyboard waits for the host to pulse KDAT low (CIA-A
//! SPMODE set) before sending the next one. After power-up it sends $FD
//! and $FE.

use std::collections::VecDeque;

/// E-clocks before the power-up stream starts (about 200 ms).
pub const POWERUP_DELAY: u32 = 142_000;
/// E-clocks between queued key bytes.
pub const BYTE_INTERVAL: u32 = 700;
/// E-clocks without a handshake before the keyboard gives up on a byte.
pub const HANDSHAKE_TIMEOUT: u32 = 100_000;

pub const INIT_POWERUP: u8 = 0xFD;
pub const TERM_POWERUP: u8 = 0xFE;

/// Something that shifts bytes into CIA-A's serial port.
pub trait Keyboard: Send {
    /// One E-clock. Returns a byte as it appears on the wire.
    fn tick(&mut self) -> Option<u8>;

    /// The host acknowledged the last byte.
    fn handshake(&mut self);

    /// Queue a key transition by raw key code.
    fn key_event(&mut self, code: u8, pressed: bool);
}

/// Wire encoding of a key byte.
#[must_use]
pub const fn encode(byte: u8) -> u8 {
    !byte.rotate_left(1)
}

/// Inverse of [`encode`], what the keyboard interrupt handler does.
#[must_use]
pub const fn decode(wire: u8) -> u8 {
    (!wire).rotate_right(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    PowerUp,
    Send(u8),
    AwaitHandshake(u8),
    Idle,
}

#[derive(Debug, Clone)]
pub struct AmigaKeyboard {
    state: State,
    timer: u32,
    queue: VecDeque<u8>,
}

impl Default for AmigaKeyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl AmigaKeyboard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: State::PowerUp,
            timer: 0,
            queue: VecDeque::new(),
        }
    }

    /// Skip the power-up delay (for tests and warm starts).
    #[must_use]
    pub fn ready() -> Self {
        Self {
            state: State::Idle,
            timer: BYTE_INTERVAL,
            queue: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn after(&mut self, state: State) {
        self.state = state;
        self.timer = 0;
    }
}

impl Keyboard for AmigaKeyboard {
    fn tick(&mut self) -> Option<u8> {
        self.timer = self.timer.saturating_add(1);
        match self.state {
            State::PowerUp => {
                if self.timer >= POWERUP_DELAY {
                    self.after(State::Send(INIT_POWERUP));
                }
                None
            }
            State::Send(byte) => {
                self.after(State::AwaitHandshake(byte));
                Some(encode(byte))
            }
            State::AwaitHandshake(byte) => {
                if self.timer >= HANDSHAKE_TIMEOUT {
                    log::debug!("keyboard handshake timeout on ${byte:02X}");
                    // Power-up bytes are resent; lost key bytes are dropped.
                    let next = if byte == INIT_POWERUP || byte == TERM_POWERUP {
                        State::Send(byte)
                    } else {
                        State::Idle
                    };
                    self.after(next);
                }
                None
            }
            State::Idle => {
                if self.timer < BYTE_INTERVAL {
                    return None;
                }
                let byte = self.queue.pop_front()?;
                self.after(State::AwaitHandshake(byte));
                Some(encode(byte))
            }
        }
    }

    fn handshake(&mut self) {
        if let State::AwaitHandshake(byte) = self.state {
            let next = if byte == INIT_POWERUP {
                State::Send(TERM_POWERUP)
            } else {
                State::Idle
            };
            self.after(next);
        }
    }

    fn key_event(&mut self, code: u8, pressed: bool) {
        let byte = if pressed { code & 0x7F } else { code | 0x80 };
        self.queue.push_back(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powerup_stream_waits_for_handshakes() {
        let mut keyboard = AmigaKeyboard::new();
        let sent: Vec<u8> = (0..POWERUP_DELAY + 1)
            .filter_map(|_| keyboard.tick())
            .collect();
        assert_eq!(sent, vec![encode(INIT_POWERUP)]);
        assert_eq!(keyboard.tick(), None);
        keyboard.handshake();
        assert_eq!(keyboard.tick(), Some(encode(TERM_POWERUP)));
        keyboard.handshake();
        assert_eq!(keyboard.state, State::Idle);
    }

    #[test]
    fn key_up_sets_bit_seven() {
        let mut keyboard = AmigaKeyboard::ready();
        keyboard.key_event(0x45, false);
        assert_eq!(keyboard.tick().map(decode), Some(0xC5));
    }

    #[test]
    fn key_bytes_are_spaced() {
        let mut keyboard = AmigaKeyboard::ready();
        keyboard.key_event(0x45, true);
        keyboard.key_event(0x46, true);
        assert_eq!(keyboard.tick().map(decode), Some(0x45));
        keyboard.handshake();
        for _ in 0..BYTE_INTERVAL - 1 {
            assert_eq!(keyboard.tick(), None);
        }
        assert_eq!(keyboard.tick().map(decode), Some(0x46));
    }

    #[test]
    fn missing_handshake_resends_powerup_byte() {
        let mut keyboard = AmigaKeyboard::new();
        keyboard.state = State::AwaitHandshake(INIT_POWERUP);
        for _ in 0..HANDSHAKE_TIMEOUT {
            keyboard.tick();
        }
        assert_eq!(keyboard.tick(), Some(encode(INIT_POWERUP)));
    }

    #[test]
    fn wire_encoding_round_trips() {
        for byte in 0..=255u8 {
            assert_eq!(decode(encode(byte)), byte);
        }
        assert_eq!(encode(0x45), !0x8A);
    }
}
