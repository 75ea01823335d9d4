//! Register-file delegation.

/// A sub-component that owns a slice of the custom register file.
///
/// Offsets are relative to the custom chip base (`$DFF000`), already
/// word-aligned. Implementors return `None` from `read_register` for
/// offsets they do not own, and `false` from `write_register` likewise, so
/// the register file can fall through to its own table.
pub trait RegisterPort {
    fn read_register(&self, offset: u16) -> Option<u16>;

    fn write_register(&mut self, offset: u16, value: u16) -> bool;
}
