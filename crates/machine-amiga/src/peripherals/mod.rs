//! Devices behind the CIA ports: floppy drive, keyboard, mouse.

pub mod disk;
pub mod keyboard;
pub mod mouse;

pub use disk::{DiskDrive, DiskLines, DriveStatus, FloppyDrive};
pub use keyboard::{AmigaKeyboard, Keyboard};
pub use mouse::Mouse;
