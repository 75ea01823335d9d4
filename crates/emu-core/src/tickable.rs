//! Components advanced by clock ticks.

/// A component advanced one step of its own clock at a time.
///
/// What a step means is up to the implementor: a colour clock for Agnus, an
/// E-clock for a CIA.
pub trait Tickable {
    fn tick(&mut self);

    /// Advance by `count` steps. Overrides must match repeated `tick()`.
    fn tick_n(&mut self, count: u32) {
        for _ in 0..count {
            self.tick();
        }
    }
}
