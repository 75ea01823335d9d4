//! The Amiga bus: address decoding, the colour-clock tick and CPU
//! contention for the chip bus.
//!
//! Every colour clock Agnus grants the slot to one requester. The CPU gets
//! a chip RAM or custom register access only in a slot it wins; until then
//! the bus keeps ticking the whole chipset and counts wait states.

use std::sync::Arc;
use std::time::Duration;

use commodore_agnus_ocs::{ChannelRequests, ChipMemory, ClockState, DmaEvent, DmaSource, SlotGrant};
use commodore_paula_8364::{DiskDmaMode, InterruptSource};
use emu_core::{AddressMap, AddressRange, BusError, MapError, MemoryMapped, RegisterPort, Size};
use mos_cia_8520::{Cia8520, ECLOCK_DIVISOR};

use crate::activity::{ActivityRecorder, DmaActivity};
use crate::barrier::TickBarrier;
use crate::cia::{CiaA, CiaB};
use crate::config::AmigaConfig;
use crate::context::EmulatorContext;
use crate::custom::CustomRegisters;
use crate::error::BarrierError;
use crate::memory::{
    CHIP_RAM_BASE, CHIP_WINDOW, CIA_A_BASE, CIA_B_BASE, CIA_WINDOW, CUSTOM_BASE, CUSTOM_WINDOW,
    FAST_RAM_BASE, Memory, ROM_BASE, ROM_WINDOW, SLOW_RAM_BASE,
};
use crate::peripherals::{AmigaKeyboard, DiskDrive, FloppyDrive, Keyboard, Mouse};

/// CPU clocks per colour clock.
pub const CPU_CYCLES_PER_CCK: u32 = 2;

/// What answers at an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    ChipRam,
    FastRam,
    CiaA,
    CiaB,
    SlowRam,
    Custom,
    Rom,
}

impl DeviceKind {
    const fn base(self) -> u32 {
        match self {
            DeviceKind::ChipRam => CHIP_RAM_BASE,
            DeviceKind::FastRam => FAST_RAM_BASE,
            DeviceKind::CiaA => CIA_A_BASE,
            DeviceKind::CiaB => CIA_B_BASE,
            DeviceKind::SlowRam => SLOW_RAM_BASE,
            DeviceKind::Custom => CUSTOM_BASE,
            DeviceKind::Rom => ROM_BASE,
        }
    }

    /// Accesses that need a chip bus slot.
    const fn on_chip_bus(self) -> bool {
        matches!(
            self,
            DeviceKind::ChipRam | DeviceKind::SlowRam | DeviceKind::Custom
        )
    }
}

/// Build the address map for a configuration. Fails on overlap.
pub fn build_map(config: &AmigaConfig) -> Result<AddressMap<DeviceKind>, MapError> {
    let mut map = AddressMap::with_width(config.address_bits);
    map.insert(AddressRange::new(CHIP_RAM_BASE, CHIP_WINDOW)?, DeviceKind::ChipRam)?;
    if config.fast_ram_size > 0 {
        map.insert(
            AddressRange::new(FAST_RAM_BASE, config.fast_ram_size as u32)?,
            DeviceKind::FastRam,
        )?;
    }
    map.insert(AddressRange::new(CIA_B_BASE, CIA_WINDOW)?, DeviceKind::CiaB)?;
    map.insert(AddressRange::new(CIA_A_BASE, CIA_WINDOW)?, DeviceKind::CiaA)?;
    if config.slow_ram_size > 0 {
        map.insert(
            AddressRange::new(SLOW_RAM_BASE, config.slow_ram_size as u32)?,
            DeviceKind::SlowRam,
        )?;
    }
    map.insert(AddressRange::new(CUSTOM_BASE, CUSTOM_WINDOW)?, DeviceKind::Custom)?;
    map.insert(AddressRange::new(ROM_BASE, ROM_WINDOW)?, DeviceKind::Rom)?;
    Ok(map)
}

pub struct AmigaBus {
    pub custom: CustomRegisters,
    pub cia_a: CiaA,
    pub cia_b: CiaB,
    pub memory: Memory,
    pub drive: Box<dyn DiskDrive>,
    pub keyboard: Box<dyn Keyboard>,
    pub mouse: Mouse,
    pub activity: ActivityRecorder,
    context: Arc<EmulatorContext>,
    map: AddressMap<DeviceKind>,
    barrier: Arc<TickBarrier>,
    barrier_timeout: Duration,
    barrier_fault: Option<BarrierError>,
    /// CPU clocks since the last barrier release.
    line_cycles: u32,
    /// CPU clocks already run for bus accesses, owed back by `sync`.
    cpu_credit: u32,
    /// Odd CPU clock left over from the last `sync`.
    cpu_phase: u32,
    /// Wait states since the last `take_waits`.
    waits: u32,
    /// What the pending CPU access does, for the activity recorder.
    cpu_access: DmaActivity,
    /// CPU clocks into the current E-clock, for the keyboard.
    eclock_phase: u32,
}

impl AmigaBus {
    pub fn new(
        config: &AmigaConfig,
        context: Arc<EmulatorContext>,
        barrier: Arc<TickBarrier>,
    ) -> Result<Self, MapError> {
        let map = build_map(config)?;
        let mut bus = Self {
            custom: CustomRegisters::new(config.chipset, config.region),
            cia_a: CiaA::new(),
            cia_b: if config.threaded_cia_b {
                CiaB::threaded(&barrier)
            } else {
                CiaB::new()
            },
            memory: Memory::new(
                config.chip_ram_size,
                config.slow_ram_size,
                config.fast_ram_size,
                config.kickstart.clone(),
            ),
            drive: Box::new(FloppyDrive::new()),
            keyboard: Box::new(AmigaKeyboard::new()),
            mouse: Mouse::new(),
            activity: ActivityRecorder::new(config.record_activity),
            context,
            map,
            barrier,
            barrier_timeout: config.barrier_timeout,
            barrier_fault: None,
            line_cycles: 0,
            cpu_credit: 0,
            cpu_phase: 0,
            waits: 0,
            cpu_access: DmaActivity::Read,
            eclock_phase: 0,
        };
        bus.sync_port_outputs();
        Ok(bus)
    }

    /// Chipset reset (the RESET instruction or power-on). Memory contents
    /// survive.
    pub fn reset(&mut self) {
        log::info!("chipset reset");
        self.custom.reset();
        self.cia_a.reset();
        self.cia_b.reset();
        self.cpu_credit = 0;
        self.cpu_phase = 0;
        self.waits = 0;
        self.sync_port_outputs();
    }

    #[must_use]
    pub fn map(&self) -> &AddressMap<DeviceKind> {
        &self.map
    }

    #[must_use]
    pub fn context(&self) -> &Arc<EmulatorContext> {
        &self.context
    }

    #[must_use]
    pub fn barrier(&self) -> &Arc<TickBarrier> {
        &self.barrier
    }

    /// First missed rendezvous under the strict policy, cleared on read.
    pub fn take_barrier_fault(&mut self) -> Option<BarrierError> {
        self.barrier_fault.take()
    }

    #[must_use]
    pub fn interrupt_level(&self) -> u8 {
        self.custom.paula.interrupt_level()
    }

    /// Wait states charged to the CPU since the last call.
    pub fn take_waits(&mut self) -> u32 {
        std::mem::take(&mut self.waits)
    }

    /// Advance the whole chipset by one colour clock.
    pub fn tick_cck(&mut self) -> SlotGrant {
        let paula = &self.custom.paula;
        let requests = ChannelRequests {
            disk: paula.disk.wants_dma() && self.drive.word_ready(),
            audio: [0, 1, 2, 3].map(|channel| paula.audio.wants_dma(channel)),
        };
        let cpu_waiting = self.custom.agnus.arbiter.is_pending(DmaSource::Cpu);
        let grant = self.custom.agnus.arbitrate(requests);
        let activity = self.transfer(grant);
        if self.activity.enabled() {
            let activity = if cpu_waiting && grant.source != DmaSource::Cpu {
                DmaActivity::CpuWait
            } else {
                activity
            };
            self.activity
                .record(grant.vpos, grant.hpos, activity, grant.source);
        }

        let edges = self.custom.agnus.end_cck();
        self.beam_edges(edges);
        self.tick_ports();
        self.custom.paula.audio.tick();
        grant
    }

    /// Move the data for a granted slot.
    fn transfer(&mut self, grant: SlotGrant) -> DmaActivity {
        match grant.source {
            DmaSource::None => DmaActivity::Idle,
            DmaSource::Refresh => DmaActivity::Refresh,
            DmaSource::Cpu => self.cpu_access,
            DmaSource::Disk => self.disk_transfer(),
            DmaSource::Audio0 | DmaSource::Audio1 | DmaSource::Audio2 | DmaSource::Audio3 => {
                let channel = usize::from(grant.unit);
                if let Some(addr) = self.custom.paula.audio.dma_address(channel) {
                    let word = self.memory.chip.read_word(addr);
                    let irq = self.custom.paula.audio.deliver(channel, word);
                    self.custom.paula.interrupts.raise_mask(irq);
                }
                DmaActivity::Read
            }
            DmaSource::Sprite | DmaSource::Blitter | DmaSource::Copper | DmaSource::Bitplane => {
                let event = self.custom.agnus.service(grant, &mut self.memory.chip);
                match event {
                    Some(DmaEvent::Register { offset, value }) => {
                        self.custom.denise.write_register(offset, value);
                    }
                    Some(DmaEvent::CopperMove(mv)) => {
                        log::trace!("copper: ${:03X} <- ${:04X}", mv.offset, mv.value);
                        let pc = self.custom.agnus.copper.pc();
                        self.custom.write(pc, mv.offset, mv.value);
                    }
                    Some(DmaEvent::BlitterDone) => {
                        self.custom.paula.interrupts.raise(InterruptSource::Blit);
                    }
                    None => {}
                }
                if grant.source == DmaSource::Blitter {
                    DmaActivity::Write
                } else {
                    DmaActivity::Read
                }
            }
        }
    }

    fn disk_transfer(&mut self) -> DmaActivity {
        let addr = self.custom.agnus.disk_pointer();
        if self.custom.paula.disk.mode() == DiskDmaMode::Write {
            let word = self.memory.chip.read_word(addr);
            self.custom.agnus.advance_disk_pointer();
            self.drive.write_word(word);
            if self.custom.paula.disk.wrote_word() {
                self.custom.paula.interrupts.raise(InterruptSource::DskBlk);
            }
            return DmaActivity::Read;
        }
        let Some(word) = self.drive.read_word() else {
            return DmaActivity::Idle;
        };
        let step = self.custom.paula.disk.read_word(word);
        if step.sync_found {
            self.custom.paula.interrupts.raise(InterruptSource::DskSyn);
        }
        if step.block_done {
            self.custom.paula.interrupts.raise(InterruptSource::DskBlk);
        }
        match step.store {
            Some(word) => {
                self.memory.chip.write_word(addr, word);
                self.custom.agnus.advance_disk_pointer();
                DmaActivity::Write
            }
            None => DmaActivity::Idle,
        }
    }

    fn beam_edges(&mut self, edges: ClockState) {
        if edges.contains(ClockState::START_OF_FRAME) {
            self.custom.paula.interrupts.raise(InterruptSource::Vertb);
            self.cia_a.chip.tod_pulse();
            self.context.frame_done();
            self.activity.end_frame();
        }
        if edges.contains(ClockState::START_OF_LINE) {
            self.cia_b.with_chip(Cia8520::tod_pulse);
            self.rendezvous();
        }
    }

    /// Hand the line's cycles to threads registered on the barrier, a
    /// threaded CIA-B among them.
    fn rendezvous(&mut self) {
        let cycles = std::mem::take(&mut self.line_cycles);
        if self.barrier.waiters() == 0 {
            return;
        }
        self.barrier.release(cycles);
        if let Err(error) = self.barrier.wait_for_acks(self.barrier_timeout) {
            self.barrier_fault.get_or_insert(error);
        }
    }

    /// CIAs, keyboard and drive for one colour clock.
    fn tick_ports(&mut self) {
        self.line_cycles += CPU_CYCLES_PER_CCK;
        self.cia_a.chip.emulate(CPU_CYCLES_PER_CCK);
        self.cia_b.clock(CPU_CYCLES_PER_CCK);

        self.eclock_phase += CPU_CYCLES_PER_CCK;
        if self.eclock_phase >= ECLOCK_DIVISOR {
            self.eclock_phase -= ECLOCK_DIVISOR;
            if let Some(byte) = self.keyboard.tick() {
                self.cia_a.chip.serial_input(byte);
            }
        }

        if self.drive.tick() {
            self.cia_b.with_chip(Cia8520::flag_pulse);
        }
        self.cia_a.set_inputs(self.drive.status(), &self.mouse);

        let interrupts = &mut self.custom.paula.interrupts;
        if self.cia_a.chip.irq_active() {
            interrupts.raise(InterruptSource::Ports);
        }
        if self.cia_b.irq_active() {
            interrupts.raise(InterruptSource::Exter);
        }
    }

    /// Push CIA port outputs to what they drive.
    fn sync_port_outputs(&mut self) {
        self.memory.overlay = self.cia_a.overlay();
        self.context.set_overlay(self.memory.overlay);
        self.context.set_power_led(self.cia_a.power_led());
        if self.cia_a.take_handshake() {
            self.keyboard.handshake();
        }
        self.drive.set_control(self.cia_b.disk_lines());
    }

    /// Re-derive what the loaded registers drive outside the chips.
    pub(crate) fn resync_after_load(&mut self) {
        let dmacon = self.custom.agnus.dmacon();
        // Interrupt requests came back with INTREQ; channel starts must not
        // raise them again.
        let _ = self.custom.paula.audio.sync_dma(dmacon);
        self.cia_a.set_inputs(self.drive.status(), &self.mouse);
        self.sync_port_outputs();
    }

    /// Tick until the CPU wins a chip bus slot. The granted colour clock
    /// is credited against the CPU's own cycle count.
    fn acquire_chip_bus(&mut self, access: DmaActivity) {
        self.cpu_access = access;
        self.custom.agnus.arbiter.request(DmaSource::Cpu);
        loop {
            let grant = self.tick_cck();
            if grant.source == DmaSource::Cpu {
                self.cpu_credit += CPU_CYCLES_PER_CCK;
                return;
            }
            self.waits += CPU_CYCLES_PER_CCK;
        }
    }

    /// Forget bus-slot credit and wait states of an instruction that will
    /// not settle.
    pub(crate) fn drop_cpu_debt(&mut self) {
        self.cpu_credit = 0;
        self.waits = 0;
    }

    /// Charge CPU clocks. Clocks already spent on bus accesses are
    /// consumed first.
    pub fn sync(&mut self, cycles: u32) {
        let credited = cycles.min(self.cpu_credit);
        self.cpu_credit -= credited;
        let mut remaining = cycles - credited + self.cpu_phase;
        while remaining >= CPU_CYCLES_PER_CCK {
            self.tick_cck();
            remaining -= CPU_CYCLES_PER_CCK;
        }
        self.cpu_phase = remaining;
    }

    fn decode(&self, addr: u32) -> Result<(DeviceKind, u32), BusError> {
        let addr = addr & self.map.mask();
        let kind = self.map.resolve(addr).ok_or(BusError::Unmapped { addr })?;
        Ok((kind, addr - kind.base()))
    }

    fn chip_bus_slots(kind: DeviceKind, size: Size) -> u32 {
        match (kind.on_chip_bus(), size) {
            (false, _) => 0,
            (true, Size::Long) => 2,
            (true, _) => 1,
        }
    }

    /// CPU read. `pc` is only used for tracing.
    pub fn cpu_read(&mut self, pc: u32, addr: u32, size: Size) -> Result<u32, BusError> {
        let (kind, offset) = self.decode(addr)?;
        if kind.on_chip_bus() {
            BusError::check_alignment(addr, size)?;
            if size == Size::Extended {
                return Err(BusError::InvalidSize { addr, size });
            }
        }
        for _ in 0..Self::chip_bus_slots(kind, size) {
            self.acquire_chip_bus(DmaActivity::Read);
        }
        match kind {
            DeviceKind::ChipRam => Ok(self.memory.read_chip_window(offset, size)),
            DeviceKind::SlowRam => Ok(self.memory.slow.read(offset, size)),
            DeviceKind::FastRam => Ok(self.memory.fast.read(offset, size)),
            DeviceKind::Rom => Ok(self.memory.rom.read(offset, size)),
            DeviceKind::Custom => self.custom.read_bus(pc, addr, size),
            DeviceKind::CiaA => self.cia_a.read(addr, size),
            DeviceKind::CiaB => self.cia_b.read(addr, size),
        }
    }

    /// CPU write. Writes to ROM are dropped.
    pub fn cpu_write(&mut self, pc: u32, addr: u32, size: Size, value: u32) -> Result<(), BusError> {
        let (kind, offset) = self.decode(addr)?;
        if kind.on_chip_bus() {
            BusError::check_alignment(addr, size)?;
            if size == Size::Extended {
                return Err(BusError::InvalidSize { addr, size });
            }
        }
        for _ in 0..Self::chip_bus_slots(kind, size) {
            self.acquire_chip_bus(DmaActivity::Write);
        }
        match kind {
            DeviceKind::ChipRam => self.memory.chip.write(offset, size, value),
            DeviceKind::SlowRam => self.memory.slow.write(offset, size, value),
            DeviceKind::FastRam => self.memory.fast.write(offset, size, value),
            DeviceKind::Rom => log::trace!("${pc:06X}: write to ROM at ${addr:06X} ignored"),
            DeviceKind::Custom => self.custom.write_bus(pc, addr, size, value)?,
            DeviceKind::CiaA => {
                self.cia_a.write(addr, size, value)?;
                self.sync_port_outputs();
            }
            DeviceKind::CiaB => {
                self.cia_b.write(addr, size, value)?;
                self.sync_port_outputs();
            }
        }
        Ok(())
    }

    /// Debugger read: no wait states, no side effects on CIAs.
    #[must_use]
    pub fn peek(&self, addr: u32, size: Size) -> Option<u32> {
        let (kind, offset) = self.decode(addr).ok()?;
        Some(match kind {
            DeviceKind::ChipRam => self.memory.read_chip_window(offset, size),
            DeviceKind::SlowRam => self.memory.slow.read(offset, size),
            DeviceKind::FastRam => self.memory.fast.read(offset, size),
            DeviceKind::Rom => self.memory.rom.read(offset, size),
            DeviceKind::Custom => self.custom.read_bus(0, addr, size).ok()?,
            DeviceKind::CiaA | DeviceKind::CiaB => return None,
        })
    }

    /// Replace the drive on the DF0: connector.
    pub fn attach_drive(&mut self, drive: Box<dyn DiskDrive>) {
        self.drive = drive;
        self.drive.set_control(self.cia_b.disk_lines());
    }

    pub fn attach_keyboard(&mut self, keyboard: Box<dyn Keyboard>) {
        self.keyboard = keyboard;
    }

    /// Move the port 0 mouse and update its buttons.
    pub fn update_mouse(&mut self, dx: i16, dy: i16, left: bool, right: bool) {
        self.mouse.move_by(dx, dy);
        self.mouse.set_buttons(left, right);
        self.custom.denise.set_joydat(0, self.mouse.joydat());
        self.custom.paula.set_pot_pins(self.mouse.apply_to_pot(0xFF00));
        self.cia_a.set_inputs(self.drive.status(), &self.mouse);
    }
}
