//! Address-space primitives.
//!
//! Sizes, half-open address ranges, the memory-mapped device contract and a
//! tagged address map. Overlap between ranges is rejected when the map is
//! built so that per-access decoding never has to arbitrate.

use std::fmt;
use thiserror::Error;

/// Width of a single bus access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Size {
    Byte,
    Word,
    Long,
    /// 96-bit FPU extended precision. No chipset device accepts it.
    Extended,
}

impl Size {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
            Size::Extended => 12,
        }
    }

    /// Value mask for sizes that fit in a `u32`.
    #[must_use]
    pub const fn mask(self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long | Size::Extended => 0xFFFF_FFFF,
        }
    }

    /// The 68000 refuses word and long accesses at odd addresses.
    #[must_use]
    pub const fn requires_even_address(self) -> bool {
        !matches!(self, Size::Byte)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self {
            Size::Byte => ".b",
            Size::Word => ".w",
            Size::Long => ".l",
            Size::Extended => ".x",
        };
        f.write_str(suffix)
    }
}

/// A recoverable failure of one bus access.
///
/// The CPU decides what to do with it (address error or bus error trap).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("misaligned {size} access at ${addr:08X}")]
    Misaligned { addr: u32, size: Size },
    #[error("device at ${addr:08X} does not accept {size} accesses")]
    InvalidSize { addr: u32, size: Size },
    #[error("no device decodes ${addr:08X}")]
    Unmapped { addr: u32 },
}

impl BusError {
    /// Reject word/long accesses on odd addresses.
    pub fn check_alignment(addr: u32, size: Size) -> Result<(), BusError> {
        if size.requires_even_address() && addr & 1 != 0 {
            return Err(BusError::Misaligned { addr, size });
        }
        Ok(())
    }
}

/// Configuration-time failure while building an address map.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("address range at ${start:08X} has zero length")]
    EmptyRange { start: u32 },
    #[error("address range {first} overlaps {second}")]
    Overlap {
        first: AddressRange,
        second: AddressRange,
    },
}

/// Half-open range `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: u32,
    len: u32,
}

impl AddressRange {
    pub fn new(start: u32, len: u32) -> Result<Self, MapError> {
        if len == 0 {
            return Err(MapError::EmptyRange { start });
        }
        Ok(Self { start, len })
    }

    #[must_use]
    pub const fn start(self) -> u32 {
        self.start
    }

    #[must_use]
    pub const fn len(self) -> u32 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Exclusive end. Widened so a range may reach the top of the 32-bit space.
    #[must_use]
    pub const fn end(self) -> u64 {
        self.start as u64 + self.len as u64
    }

    #[must_use]
    pub const fn contains(self, addr: u32) -> bool {
        addr >= self.start && (addr as u64) < self.end()
    }

    #[must_use]
    pub const fn overlaps(self, other: AddressRange) -> bool {
        (self.start as u64) < other.end() && (other.start as u64) < self.end()
    }

    /// Offset of `addr` from the start of the range, if inside it.
    #[must_use]
    pub const fn offset_of(self, addr: u32) -> Option<u32> {
        if self.contains(addr) {
            Some(addr - self.start)
        } else {
            None
        }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[${:08X}, ${:09X})", self.start, self.end())
    }
}

/// A device that answers bus accesses inside one or more address ranges.
pub trait MemoryMapped {
    /// Ranges this device decodes. Used to build the address map.
    fn ranges(&self) -> &[AddressRange];

    /// Whether this device responds at `addr`. Devices that only decode some
    /// addresses inside their ranges (odd/even CIA lanes) override this.
    fn is_mapped(&self, addr: u32) -> bool {
        self.ranges().iter().any(|range| range.contains(addr))
    }

    fn read(&mut self, addr: u32, size: Size) -> Result<u32, BusError>;

    fn write(&mut self, addr: u32, size: Size, value: u32) -> Result<(), BusError>;
}

/// Address decoder from ranges to device tags.
///
/// Tags are small `Copy` values (usually an enum of device kinds) so the bus
/// can `match` on device identity instead of chasing trait objects.
#[derive(Debug, Clone)]
pub struct AddressMap<T> {
    entries: Vec<(AddressRange, T)>,
    mask: u32,
}

impl<T: Copy> AddressMap<T> {
    /// Empty map for an address bus `address_bits` wide (clamped to 32).
    #[must_use]
    pub fn with_width(address_bits: u8) -> Self {
        let mask = if address_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << address_bits) - 1
        };
        Self {
            entries: Vec::new(),
            mask,
        }
    }

    /// Add a range, failing if it overlaps an existing one.
    pub fn insert(&mut self, range: AddressRange, tag: T) -> Result<(), MapError> {
        if let Some((existing, _)) = self.entries.iter().find(|(r, _)| r.overlaps(range)) {
            return Err(MapError::Overlap {
                first: *existing,
                second: range,
            });
        }
        let at = self
            .entries
            .partition_point(|(r, _)| r.start() < range.start());
        self.entries.insert(at, (range, tag));
        Ok(())
    }

    /// Decode an address (after masking to the bus width).
    #[must_use]
    pub fn resolve(&self, addr: u32) -> Option<T> {
        let addr = addr & self.mask;
        let idx = self.entries.partition_point(|(r, _)| r.start() <= addr);
        let (range, tag) = self.entries.get(idx.checked_sub(1)?)?;
        range.contains(addr).then_some(*tag)
    }

    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    pub fn entries(&self) -> impl Iterator<Item = (AddressRange, T)> + '_ {
        self.entries.iter().copied()
    }
}
