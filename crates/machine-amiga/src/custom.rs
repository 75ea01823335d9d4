//! Custom chip register file at $DFF000.
//!
//! A static table names every port, says how it behaves on the bus and
//! which chip owns it. Reads and writes are dispatched through the table to
//! the owning chip's [`RegisterPort`].

use commodore_agnus_ocs::{Agnus, Chipset, VideoStandard, registers as agnus_regs};
use commodore_paula_8364::Paula8364;
use emu_core::{BusError, RegisterPort, Size};

use crate::denise::Denise;

/// How a port behaves on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Readable. Writes are ignored.
    ReadOnly,
    /// Write-only latch.
    Latch,
    /// The write itself is the event (COPJMPx, BLTSIZE).
    Strobe,
    /// Bit 15 selects set or clear of bits 0-14.
    SetClr,
    /// Write-only, handled by a sub-unit (copper, blitter, audio, disk,
    /// sprite latches).
    Delegate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Agnus,
    Paula,
    Denise,
    /// Both chips keep a copy (window and BPLCON0 decode).
    AgnusDenise,
    /// Reserved or not emulated.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInfo {
    pub offset: u16,
    pub name: &'static str,
    pub access: Access,
    pub owner: Owner,
}

const fn reg(offset: u16, name: &'static str, access: Access, owner: Owner) -> RegisterInfo {
    RegisterInfo {
        offset,
        name,
        access,
        owner,
    }
}

/// Sorted by offset.
static REGISTERS: &[RegisterInfo] = &[
    reg(0x000, "BLTDDAT", Access::ReadOnly, Owner::None),
    reg(0x002, "DMACONR", Access::ReadOnly, Owner::Agnus),
    reg(0x004, "VPOSR", Access::ReadOnly, Owner::Agnus),
    reg(0x006, "VHPOSR", Access::ReadOnly, Owner::Agnus),
    reg(0x008, "DSKDATR", Access::ReadOnly, Owner::None),
    reg(0x00A, "JOY0DAT", Access::ReadOnly, Owner::Denise),
    reg(0x00C, "JOY1DAT", Access::ReadOnly, Owner::Denise),
    reg(0x00E, "CLXDAT", Access::ReadOnly, Owner::Denise),
    reg(0x010, "ADKCONR", Access::ReadOnly, Owner::Paula),
    reg(0x012, "POT0DAT", Access::ReadOnly, Owner::Paula),
    reg(0x014, "POT1DAT", Access::ReadOnly, Owner::Paula),
    reg(0x016, "POTGOR", Access::ReadOnly, Owner::Paula),
    reg(0x018, "SERDATR", Access::ReadOnly, Owner::Paula),
    reg(0x01A, "DSKBYTR", Access::ReadOnly, Owner::Paula),
    reg(0x01C, "INTENAR", Access::ReadOnly, Owner::Paula),
    reg(0x01E, "INTREQR", Access::ReadOnly, Owner::Paula),
    reg(0x020, "DSKPTH", Access::Latch, Owner::Agnus),
    reg(0x022, "DSKPTL", Access::Latch, Owner::Agnus),
    reg(0x024, "DSKLEN", Access::Delegate, Owner::Paula),
    reg(0x026, "DSKDAT", Access::Latch, Owner::Paula),
    reg(0x028, "REFPTR", Access::Strobe, Owner::None),
    reg(0x02A, "VPOSW", Access::Latch, Owner::Agnus),
    reg(0x02C, "VHPOSW", Access::Latch, Owner::Agnus),
    reg(0x02E, "COPCON", Access::Delegate, Owner::Agnus),
    reg(0x030, "SERDAT", Access::Latch, Owner::Paula),
    reg(0x032, "SERPER", Access::Latch, Owner::Paula),
    reg(0x034, "POTGO", Access::Latch, Owner::Paula),
    reg(0x036, "JOYTEST", Access::Latch, Owner::Denise),
    reg(0x038, "STREQU", Access::Strobe, Owner::None),
    reg(0x03A, "STRVBL", Access::Strobe, Owner::None),
    reg(0x03C, "STRHOR", Access::Strobe, Owner::None),
    reg(0x03E, "STRLONG", Access::Strobe, Owner::None),
    reg(0x040, "BLTCON0", Access::Delegate, Owner::Agnus),
    reg(0x042, "BLTCON1", Access::Delegate, Owner::Agnus),
    reg(0x044, "BLTAFWM", Access::Delegate, Owner::Agnus),
    reg(0x046, "BLTALWM", Access::Delegate, Owner::Agnus),
    reg(0x048, "BLTCPTH", Access::Delegate, Owner::Agnus),
    reg(0x04A, "BLTCPTL", Access::Delegate, Owner::Agnus),
    reg(0x04C, "BLTBPTH", Access::Delegate, Owner::Agnus),
    reg(0x04E, "BLTBPTL", Access::Delegate, Owner::Agnus),
    reg(0x050, "BLTAPTH", Access::Delegate, Owner::Agnus),
    reg(0x052, "BLTAPTL", Access::Delegate, Owner::Agnus),
    reg(0x054, "BLTDPTH", Access::Delegate, Owner::Agnus),
    reg(0x056, "BLTDPTL", Access::Delegate, Owner::Agnus),
    reg(0x058, "BLTSIZE", Access::Strobe, Owner::Agnus),
    reg(0x060, "BLTCMOD", Access::Delegate, Owner::Agnus),
    reg(0x062, "BLTBMOD", Access::Delegate, Owner::Agnus),
    reg(0x064, "BLTAMOD", Access::Delegate, Owner::Agnus),
    reg(0x066, "BLTDMOD", Access::Delegate, Owner::Agnus),
    reg(0x070, "BLTCDAT", Access::Delegate, Owner::Agnus),
    reg(0x072, "BLTBDAT", Access::Delegate, Owner::Agnus),
    reg(0x074, "BLTADAT", Access::Delegate, Owner::Agnus),
    reg(0x07C, "DENISEID", Access::ReadOnly, Owner::Denise),
    reg(0x07E, "DSKSYNC", Access::Delegate, Owner::Paula),
    reg(0x080, "COP1LCH", Access::Delegate, Owner::Agnus),
    reg(0x082, "COP1LCL", Access::Delegate, Owner::Agnus),
    reg(0x084, "COP2LCH", Access::Delegate, Owner::Agnus),
    reg(0x086, "COP2LCL", Access::Delegate, Owner::Agnus),
    reg(0x088, "COPJMP1", Access::Strobe, Owner::Agnus),
    reg(0x08A, "COPJMP2", Access::Strobe, Owner::Agnus),
    reg(0x08C, "COPINS", Access::Delegate, Owner::Agnus),
    reg(0x08E, "DIWSTRT", Access::Latch, Owner::AgnusDenise),
    reg(0x090, "DIWSTOP", Access::Latch, Owner::AgnusDenise),
    reg(0x092, "DDFSTRT", Access::Latch, Owner::Agnus),
    reg(0x094, "DDFSTOP", Access::Latch, Owner::Agnus),
    reg(0x096, "DMACON", Access::SetClr, Owner::Agnus),
    reg(0x098, "CLXCON", Access::Latch, Owner::Denise),
    reg(0x09A, "INTENA", Access::SetClr, Owner::Paula),
    reg(0x09C, "INTREQ", Access::SetClr, Owner::Paula),
    reg(0x09E, "ADKCON", Access::SetClr, Owner::Paula),
    reg(0x0A0, "AUD0LCH", Access::Delegate, Owner::Paula),
    reg(0x0A2, "AUD0LCL", Access::Delegate, Owner::Paula),
    reg(0x0A4, "AUD0LEN", Access::Delegate, Owner::Paula),
    reg(0x0A6, "AUD0PER", Access::Delegate, Owner::Paula),
    reg(0x0A8, "AUD0VOL", Access::Delegate, Owner::Paula),
    reg(0x0AA, "AUD0DAT", Access::Delegate, Owner::Paula),
    reg(0x0B0, "AUD1LCH", Access::Delegate, Owner::Paula),
    reg(0x0B2, "AUD1LCL", Access::Delegate, Owner::Paula),
    reg(0x0B4, "AUD1LEN", Access::Delegate, Owner::Paula),
    reg(0x0B6, "AUD1PER", Access::Delegate, Owner::Paula),
    reg(0x0B8, "AUD1VOL", Access::Delegate, Owner::Paula),
    reg(0x0BA, "AUD1DAT", Access::Delegate, Owner::Paula),
    reg(0x0C0, "AUD2LCH", Access::Delegate, Owner::Paula),
    reg(0x0C2, "AUD2LCL", Access::Delegate, Owner::Paula),
    reg(0x0C4, "AUD2LEN", Access::Delegate, Owner::Paula),
    reg(0x0C6, "AUD2PER", Access::Delegate, Owner::Paula),
    reg(0x0C8, "AUD2VOL", Access::Delegate, Owner::Paula),
    reg(0x0CA, "AUD2DAT", Access::Delegate, Owner::Paula),
    reg(0x0D0, "AUD3LCH", Access::Delegate, Owner::Paula),
    reg(0x0D2, "AUD3LCL", Access::Delegate, Owner::Paula),
    reg(0x0D4, "AUD3LEN", Access::Delegate, Owner::Paula),
    reg(0x0D6, "AUD3PER", Access::Delegate, Owner::Paula),
    reg(0x0D8, "AUD3VOL", Access::Delegate, Owner::Paula),
    reg(0x0DA, "AUD3DAT", Access::Delegate, Owner::Paula),
    reg(0x0E0, "BPL1PTH", Access::Latch, Owner::Agnus),
    reg(0x0E2, "BPL1PTL", Access::Latch, Owner::Agnus),
    reg(0x0E4, "BPL2PTH", Access::Latch, Owner::Agnus),
    reg(0x0E6, "BPL2PTL", Access::Latch, Owner::Agnus),
    reg(0x0E8, "BPL3PTH", Access::Latch, Owner::Agnus),
    reg(0x0EA, "BPL3PTL", Access::Latch, Owner::Agnus),
    reg(0x0EC, "BPL4PTH", Access::Latch, Owner::Agnus),
    reg(0x0EE, "BPL4PTL", Access::Latch, Owner::Agnus),
    reg(0x0F0, "BPL5PTH", Access::Latch, Owner::Agnus),
    reg(0x0F2, "BPL5PTL", Access::Latch, Owner::Agnus),
    reg(0x0F4, "BPL6PTH", Access::Latch, Owner::Agnus),
    reg(0x0F6, "BPL6PTL", Access::Latch, Owner::Agnus),
    reg(0x100, "BPLCON0", Access::Latch, Owner::AgnusDenise),
    reg(0x102, "BPLCON1", Access::Latch, Owner::Denise),
    reg(0x104, "BPLCON2", Access::Latch, Owner::Denise),
    reg(0x106, "BPLCON3", Access::Latch, Owner::Denise),
    reg(0x108, "BPL1MOD", Access::Latch, Owner::Agnus),
    reg(0x10A, "BPL2MOD", Access::Latch, Owner::Agnus),
    reg(0x110, "BPL1DAT", Access::Latch, Owner::Denise),
    reg(0x112, "BPL2DAT", Access::Latch, Owner::Denise),
    reg(0x114, "BPL3DAT", Access::Latch, Owner::Denise),
    reg(0x116, "BPL4DAT", Access::Latch, Owner::Denise),
    reg(0x118, "BPL5DAT", Access::Latch, Owner::Denise),
    reg(0x11A, "BPL6DAT", Access::Latch, Owner::Denise),
    reg(0x120, "SPR0PTH", Access::Latch, Owner::Agnus),
    reg(0x122, "SPR0PTL", Access::Latch, Owner::Agnus),
    reg(0x124, "SPR1PTH", Access::Latch, Owner::Agnus),
    reg(0x126, "SPR1PTL", Access::Latch, Owner::Agnus),
    reg(0x128, "SPR2PTH", Access::Latch, Owner::Agnus),
    reg(0x12A, "SPR2PTL", Access::Latch, Owner::Agnus),
    reg(0x12C, "SPR3PTH", Access::Latch, Owner::Agnus),
    reg(0x12E, "SPR3PTL", Access::Latch, Owner::Agnus),
    reg(0x130, "SPR4PTH", Access::Latch, Owner::Agnus),
    reg(0x132, "SPR4PTL", Access::Latch, Owner::Agnus),
    reg(0x134, "SPR5PTH", Access::Latch, Owner::Agnus),
    reg(0x136, "SPR5PTL", Access::Latch, Owner::Agnus),
    reg(0x138, "SPR6PTH", Access::Latch, Owner::Agnus),
    reg(0x13A, "SPR6PTL", Access::Latch, Owner::Agnus),
    reg(0x13C, "SPR7PTH", Access::Latch, Owner::Agnus),
    reg(0x13E, "SPR7PTL", Access::Latch, Owner::Agnus),
    reg(0x140, "SPR0POS", Access::Delegate, Owner::Denise),
    reg(0x142, "SPR0CTL", Access::Delegate, Owner::Denise),
    reg(0x144, "SPR0DATA", Access::Delegate, Owner::Denise),
    reg(0x146, "SPR0DATB", Access::Delegate, Owner::Denise),
    reg(0x148, "SPR1POS", Access::Delegate, Owner::Denise),
    reg(0x14A, "SPR1CTL", Access::Delegate, Owner::Denise),
    reg(0x14C, "SPR1DATA", Access::Delegate, Owner::Denise),
    reg(0x14E, "SPR1DATB", Access::Delegate, Owner::Denise),
    reg(0x150, "SPR2POS", Access::Delegate, Owner::Denise),
    reg(0x152, "SPR2CTL", Access::Delegate, Owner::Denise),
    reg(0x154, "SPR2DATA", Access::Delegate, Owner::Denise),
    reg(0x156, "SPR2DATB", Access::Delegate, Owner::Denise),
    reg(0x158, "SPR3POS", Access::Delegate, Owner::Denise),
    reg(0x15A, "SPR3CTL", Access::Delegate, Owner::Denise),
    reg(0x15C, "SPR3DATA", Access::Delegate, Owner::Denise),
    reg(0x15E, "SPR3DATB", Access::Delegate, Owner::Denise),
    reg(0x160, "SPR4POS", Access::Delegate, Owner::Denise),
    reg(0x162, "SPR4CTL", Access::Delegate, Owner::Denise),
    reg(0x164, "SPR4DATA", Access::Delegate, Owner::Denise),
    reg(0x166, "SPR4DATB", Access::Delegate, Owner::Denise),
    reg(0x168, "SPR5POS", Access::Delegate, Owner::Denise),
    reg(0x16A, "SPR5CTL", Access::Delegate, Owner::Denise),
    reg(0x16C, "SPR5DATA", Access::Delegate, Owner::Denise),
    reg(0x16E, "SPR5DATB", Access::Delegate, Owner::Denise),
    reg(0x170, "SPR6POS", Access::Delegate, Owner::Denise),
    reg(0x172, "SPR6CTL", Access::Delegate, Owner::Denise),
    reg(0x174, "SPR6DATA", Access::Delegate, Owner::Denise),
    reg(0x176, "SPR6DATB", Access::Delegate, Owner::Denise),
    reg(0x178, "SPR7POS", Access::Delegate, Owner::Denise),
    reg(0x17A, "SPR7CTL", Access::Delegate, Owner::Denise),
    reg(0x17C, "SPR7DATA", Access::Delegate, Owner::Denise),
    reg(0x17E, "SPR7DATB", Access::Delegate, Owner::Denise),
    reg(0x180, "COLOR00", Access::Latch, Owner::Denise),
    reg(0x182, "COLOR01", Access::Latch, Owner::Denise),
    reg(0x184, "COLOR02", Access::Latch, Owner::Denise),
    reg(0x186, "COLOR03", Access::Latch, Owner::Denise),
    reg(0x188, "COLOR04", Access::Latch, Owner::Denise),
    reg(0x18A, "COLOR05", Access::Latch, Owner::Denise),
    reg(0x18C, "COLOR06", Access::Latch, Owner::Denise),
    reg(0x18E, "COLOR07", Access::Latch, Owner::Denise),
    reg(0x190, "COLOR08", Access::Latch, Owner::Denise),
    reg(0x192, "COLOR09", Access::Latch, Owner::Denise),
    reg(0x194, "COLOR10", Access::Latch, Owner::Denise),
    reg(0x196, "COLOR11", Access::Latch, Owner::Denise),
    reg(0x198, "COLOR12", Access::Latch, Owner::Denise),
    reg(0x19A, "COLOR13", Access::Latch, Owner::Denise),
    reg(0x19C, "COLOR14", Access::Latch, Owner::Denise),
    reg(0x19E, "COLOR15", Access::Latch, Owner::Denise),
    reg(0x1A0, "COLOR16", Access::Latch, Owner::Denise),
    reg(0x1A2, "COLOR17", Access::Latch, Owner::Denise),
    reg(0x1A4, "COLOR18", Access::Latch, Owner::Denise),
    reg(0x1A6, "COLOR19", Access::Latch, Owner::Denise),
    reg(0x1A8, "COLOR20", Access::Latch, Owner::Denise),
    reg(0x1AA, "COLOR21", Access::Latch, Owner::Denise),
    reg(0x1AC, "COLOR22", Access::Latch, Owner::Denise),
    reg(0x1AE, "COLOR23", Access::Latch, Owner::Denise),
    reg(0x1B0, "COLOR24", Access::Latch, Owner::Denise),
    reg(0x1B2, "COLOR25", Access::Latch, Owner::Denise),
    reg(0x1B4, "COLOR26", Access::Latch, Owner::Denise),
    reg(0x1B6, "COLOR27", Access::Latch, Owner::Denise),
    reg(0x1B8, "COLOR28", Access::Latch, Owner::Denise),
    reg(0x1BA, "COLOR29", Access::Latch, Owner::Denise),
    reg(0x1BC, "COLOR30", Access::Latch, Owner::Denise),
    reg(0x1BE, "COLOR31", Access::Latch, Owner::Denise),
    reg(0x1E4, "DIWHIGH", Access::Latch, Owner::AgnusDenise),
];

/// Every named port, in offset order.
#[must_use]
pub fn registers() -> &'static [RegisterInfo] {
    REGISTERS
}

#[must_use]
pub fn register_info(offset: u16) -> Option<&'static RegisterInfo> {
    REGISTERS
        .binary_search_by_key(&(offset & 0x1FE), |r| r.offset)
        .ok()
        .map(|i| &REGISTERS[i])
}

#[must_use]
pub fn register_named(name: &str) -> Option<&'static RegisterInfo> {
    REGISTERS.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// Agnus, Paula and Denise behind the register table.
#[derive(Debug, Clone)]
pub struct CustomRegisters {
    pub agnus: Agnus,
    pub paula: Paula8364,
    pub denise: Denise,
}

impl CustomRegisters {
    #[must_use]
    pub fn new(chipset: Chipset, standard: VideoStandard) -> Self {
        Self {
            agnus: Agnus::new(chipset, standard),
            paula: Paula8364::new(),
            denise: Denise::new(chipset),
        }
    }

    /// Documented power-on values: PAL display window and fetch window,
    /// blitter masks all ones, everything else clear.
    pub fn reset(&mut self) {
        self.agnus.reset();
        self.paula.reset();
        self.denise.reset();
    }

    /// Word read by offset. Write-only and unknown ports read 0.
    #[must_use]
    pub fn read(&self, pc: u32, offset: u16) -> u16 {
        let offset = offset & 0x1FE;
        let Some(info) = register_info(offset) else {
            log::trace!("${pc:06X}: read of unmapped custom ${offset:03X}");
            return 0;
        };
        if info.access != Access::ReadOnly {
            return 0;
        }
        let value = match info.owner {
            Owner::Agnus | Owner::AgnusDenise => self.agnus.read_register(offset),
            Owner::Paula => self.paula.read_register(offset),
            Owner::Denise => self.denise.read_register(offset),
            Owner::None => None,
        };
        value.unwrap_or_else(|| {
            log::trace!("${pc:06X}: read of unemulated {}", info.name);
            0
        })
    }

    /// Word write by offset. The CPU and the copper both land here.
    pub fn write(&mut self, pc: u32, offset: u16, value: u16) {
        let offset = offset & 0x1FE;
        let Some(info) = register_info(offset) else {
            log::trace!("${pc:06X}: write ${value:04X} to unmapped custom ${offset:03X}");
            return;
        };
        let handled = match info.owner {
            _ if info.access == Access::ReadOnly => false,
            Owner::Agnus => self.agnus.write_register(offset, value),
            Owner::Paula => self.paula.write_register(offset, value),
            Owner::Denise => self.denise.write_register(offset, value),
            Owner::AgnusDenise => {
                let agnus = self.agnus.write_register(offset, value);
                self.denise.write_register(offset, value) || agnus
            }
            Owner::None => false,
        };
        if !handled {
            log::trace!("${pc:06X}: write ${value:04X} to {} ignored", info.name);
            return;
        }
        if offset == agnus_regs::DMACON {
            let started = self.paula.audio.sync_dma(self.agnus.dmacon());
            self.paula.interrupts.raise_mask(started);
        }
    }

    /// CPU read at an address inside the custom window.
    pub fn read_bus(&self, pc: u32, addr: u32, size: Size) -> Result<u32, BusError> {
        BusError::check_alignment(addr, size)?;
        let offset = (addr & 0x1FE) as u16;
        match size {
            Size::Byte => {
                let word = self.read(pc, offset);
                Ok(if addr & 1 == 0 {
                    u32::from(word >> 8)
                } else {
                    u32::from(word & 0xFF)
                })
            }
            Size::Word => Ok(u32::from(self.read(pc, offset))),
            Size::Long => {
                let high = self.read(pc, offset);
                let low = self.read(pc, offset.wrapping_add(2) & 0x1FE);
                Ok(u32::from(high) << 16 | u32::from(low))
            }
            Size::Extended => Err(BusError::InvalidSize { addr, size }),
        }
    }

    /// CPU write at an address inside the custom window.
    pub fn write_bus(&mut self, pc: u32, addr: u32, size: Size, value: u32) -> Result<(), BusError> {
        BusError::check_alignment(addr, size)?;
        let offset = (addr & 0x1FE) as u16;
        match size {
            // The 68000 drives a byte on both halves of the data bus.
            Size::Byte => {
                let byte = value as u8;
                self.write(pc, offset, u16::from_be_bytes([byte, byte]));
            }
            Size::Word => self.write(pc, offset, value as u16),
            Size::Long => {
                self.write(pc, offset, (value >> 16) as u16);
                self.write(pc, offset.wrapping_add(2) & 0x1FE, value as u16);
            }
            Size::Extended => return Err(BusError::InvalidSize { addr, size }),
        }
        Ok(())
    }
}

impl Default for CustomRegisters {
    fn default() -> Self {
        Self::new(Chipset::Ocs, VideoStandard::Pal)
    }
}
