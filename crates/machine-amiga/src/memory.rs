//! RAM and ROM behind the address map.

use commodore_agnus_ocs::ChipMemory;
use emu_core::Size;

pub const CHIP_RAM_BASE: u32 = 0x00_0000;
/// Agnus decodes chip RAM up to 2M; smaller sizes leave the rest open.
pub const CHIP_WINDOW: u32 = 0x20_0000;
pub const FAST_RAM_BASE: u32 = 0x20_0000;
pub const CIA_B_BASE: u32 = 0xBF_D000;
pub const CIA_A_BASE: u32 = 0xBF_E000;
pub const CIA_WINDOW: u32 = 0x1000;
pub const SLOW_RAM_BASE: u32 = 0xC0_0000;
pub const CUSTOM_BASE: u32 = 0xDF_F000;
pub const CUSTOM_WINDOW: u32 = 0x1000;
pub const ROM_BASE: u32 = 0xF8_0000;
pub const ROM_WINDOW: u32 = 0x8_0000;

/// Value read from a data bus nothing drives.
pub const OPEN_BUS: u32 = 0xFFFF_FFFF;

/// Big-endian read of `size` bytes at `offset`, wrapping at the buffer end.
fn read_be(bytes: &[u8], offset: usize, size: Size) -> u32 {
    let len = bytes.len();
    (0..size.bytes() as usize).fold(0, |acc, i| (acc << 8) | u32::from(bytes[(offset + i) % len]))
}

fn write_be(bytes: &mut [u8], offset: usize, size: Size, value: u32) {
    let len = bytes.len();
    let count = size.bytes() as usize;
    for i in 0..count {
        let shift = 8 * (count - 1 - i);
        bytes[(offset + i) % len] = (value >> shift) as u8;
    }
}

/// Chip RAM. Shared by the CPU and every DMA channel.
#[derive(Debug, Clone)]
pub struct ChipRam {
    bytes: Vec<u8>,
    mask: u32,
}

impl ChipRam {
    /// `size` must be a power of two (checked by the configuration).
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            mask: (size as u32).wrapping_sub(1),
        }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// CPU access at `offset` into the chip window. Open bus above the
    /// installed size.
    #[must_use]
    pub fn read(&self, offset: u32, size: Size) -> u32 {
        if offset as usize >= self.bytes.len() {
            return OPEN_BUS & size.mask();
        }
        read_be(&self.bytes, offset as usize, size)
    }

    pub fn write(&mut self, offset: u32, size: Size, value: u32) {
        if (offset as usize) < self.bytes.len() {
            write_be(&mut self.bytes, offset as usize, size, value);
        }
    }

    /// Copy `data` in at `addr`, for loaders and tests.
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let at = (addr as usize + i) & self.mask as usize;
            self.bytes[at] = byte;
        }
    }
}

impl ChipMemory for ChipRam {
    fn read_word(&self, addr: u32) -> u16 {
        let at = (addr & self.mask & !1) as usize;
        u16::from_be_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    fn write_word(&mut self, addr: u32, value: u16) {
        let at = (addr & self.mask & !1) as usize;
        self.bytes[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }
}

/// Plain RAM that only the CPU sees (slow or fast RAM).
#[derive(Debug, Clone)]
pub struct Ram {
    bytes: Vec<u8>,
}

impl Ram {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn read(&self, offset: u32, size: Size) -> u32 {
        read_be(&self.bytes, offset as usize, size)
    }

    pub fn write(&mut self, offset: u32, size: Size, value: u32) {
        write_be(&mut self.bytes, offset as usize, size, value);
    }
}

/// Kickstart ROM. A 256K image appears twice in the 512K window.
#[derive(Debug, Clone)]
pub struct Rom {
    bytes: Vec<u8>,
}

impl Rom {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn read(&self, offset: u32, size: Size) -> u32 {
        if self.bytes.is_empty() {
            return OPEN_BUS & size.mask();
        }
        read_be(&self.bytes, offset as usize % self.bytes.len(), size)
    }

    /// Initial SSP and PC from the first two longwords.
    #[must_use]
    pub fn reset_vectors(&self) -> (u32, u32) {
        (self.read(0, Size::Long), self.read(4, Size::Long))
    }
}

#[derive(Debug, Clone)]
pub struct Memory {
    pub chip: ChipRam,
    pub slow: Ram,
    pub fast: Ram,
    pub rom: Rom,
    /// ROM mirrored over the chip window after reset (CIA-A PA0).
    pub overlay: bool,
}

impl Memory {
    #[must_use]
    pub fn new(chip_size: usize, slow_size: usize, fast_size: usize, kickstart: Vec<u8>) -> Self {
        Self {
            chip: ChipRam::new(chip_size),
            slow: Ram::new(slow_size),
            fast: Ram::new(fast_size),
            rom: Rom::new(kickstart),
            overlay: true,
        }
    }

    /// CPU read inside the chip window, honouring the overlay.
    #[must_use]
    pub fn read_chip_window(&self, offset: u32, size: Size) -> u32 {
        if self.overlay {
            self.rom.read(offset, size)
        } else {
            self.chip.read(offset, size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_ram_is_big_endian() {
        let mut chip = ChipRam::new(0x1000);
        chip.write(0x10, Size::Long, 0x1234_5678);
        assert_eq!(chip.read_word(0x10), 0x1234);
        assert_eq!(chip.read_word(0x12), 0x5678);
        assert_eq!(chip.read(0x11, Size::Byte), 0x34);
    }

    #[test]
    fn dma_addresses_mirror_installed_size() {
        let mut chip = ChipRam::new(0x1000);
        chip.write_word(0x1002, 0xBEEF);
        assert_eq!(chip.read_word(0x0002), 0xBEEF);
    }

    #[test]
    fn cpu_sees_open_bus_above_installed_chip_ram() {
        let chip = ChipRam::new(0x1000);
        assert_eq!(chip.read(0x1000, Size::Word), 0xFFFF);
    }

    #[test]
    fn overlay_maps_rom_at_zero() {
        let mut rom = vec![0u8; 0x40000];
        rom[..8].copy_from_slice(&[0, 0, 0x04, 0, 0, 0xFC, 0, 0xD2]);
        let mut memory = Memory::new(0x80000, 0, 0, rom);
        memory.chip.write(0, Size::Word, 0x1111);
        assert_eq!(memory.read_chip_window(4, Size::Long), 0x00FC_00D2);
        assert_eq!(memory.rom.reset_vectors(), (0x400, 0x00FC_00D2));
        memory.overlay = false;
        assert_eq!(memory.read_chip_window(0, Size::Word), 0x1111);
    }

    #[test]
    fn short_rom_mirrors_through_window() {
        let mut rom = vec![0u8; 0x40000];
        rom[0] = 0x11;
        let memory = Memory::new(0x80000, 0, 0, rom);
        assert_eq!(memory.rom.read(0x40000, Size::Byte), 0x11);
    }
}
