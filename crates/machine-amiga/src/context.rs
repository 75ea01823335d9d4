//! State shared between the emulation and its host.
//!
//! Everything here is written by the emulation thread and read by whoever
//! holds the `Arc`. Nothing feeds back into emulation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EmulatorContext {
    power_led: AtomicBool,
    overlay: AtomicBool,
    frames: AtomicU64,
}

impl EmulatorContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            power_led: AtomicBool::new(false),
            overlay: AtomicBool::new(true),
            frames: AtomicU64::new(0),
        }
    }

    /// Power LED brightness follows CIA-A PA1 (low = bright).
    #[must_use]
    pub fn power_led(&self) -> bool {
        self.power_led.load(Ordering::Relaxed)
    }

    pub fn set_power_led(&self, on: bool) {
        self.power_led.store(on, Ordering::Relaxed);
    }

    /// ROM overlay at $000000, CIA-A PA0.
    #[must_use]
    pub fn overlay(&self) -> bool {
        self.overlay.load(Ordering::Relaxed)
    }

    pub fn set_overlay(&self, on: bool) {
        self.overlay.store(on, Ordering::Relaxed);
    }

    /// Frames completed since power-on.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub(crate) fn frame_done(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn host_sees_updates_through_shared_handle() {
        let context = Arc::new(EmulatorContext::new());
        let host = Arc::clone(&context);
        assert!(host.overlay());
        context.set_overlay(false);
        context.set_power_led(true);
        context.frame_done();
        assert!(!host.overlay());
        assert!(host.power_led());
        assert_eq!(host.frames(), 1);
    }
}
