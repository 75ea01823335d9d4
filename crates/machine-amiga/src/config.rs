//! Configuration for the Amiga machine crate.

use std::time::Duration;

use commodore_agnus_ocs::{
    Chipset, NTSC_CCKS_PER_LINE, NTSC_LINES_PER_FRAME, PAL_CCKS_PER_LINE, PAL_LINES_PER_FRAME,
    RasterClock, VideoStandard,
};

use crate::barrier::BarrierPolicy;
use crate::error::ConfigError;

const KB: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmigaModel {
    /// OCS, 512K chip RAM, 512K trapdoor slow RAM.
    A500,
    /// ECS, 1M chip RAM.
    A500Plus,
}

impl AmigaModel {
    #[must_use]
    pub fn chipset(self) -> Chipset {
        match self {
            AmigaModel::A500 => Chipset::Ocs,
            AmigaModel::A500Plus => Chipset::Ecs,
        }
    }

    #[must_use]
    pub fn chip_ram_size(self) -> usize {
        match self {
            AmigaModel::A500 => 512 * KB,
            AmigaModel::A500Plus => 1024 * KB,
        }
    }

    #[must_use]
    pub fn slow_ram_size(self) -> usize {
        match self {
            AmigaModel::A500 => 512 * KB,
            AmigaModel::A500Plus => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AmigaConfig {
    pub model: AmigaModel,
    pub chipset: Chipset,
    pub region: VideoStandard,
    pub chip_ram_size: usize,
    /// Trapdoor RAM at $C00000.
    pub slow_ram_size: usize,
    /// Autoconfig-free fast RAM at $200000.
    pub fast_ram_size: usize,
    pub address_bits: u8,
    pub kickstart: Vec<u8>,
    pub record_activity: bool,
    pub barrier_policy: BarrierPolicy,
    pub barrier_timeout: Duration,
    /// Clock CIA-B from its own thread, once per line through the barrier.
    pub threaded_cia_b: bool,
}

impl AmigaConfig {
    /// Stock configuration of `model` in PAL.
    #[must_use]
    pub fn preset(model: AmigaModel, kickstart: Vec<u8>) -> Self {
        Self {
            model,
            chipset: model.chipset(),
            region: VideoStandard::Pal,
            chip_ram_size: model.chip_ram_size(),
            slow_ram_size: model.slow_ram_size(),
            fast_ram_size: 0,
            address_bits: 24,
            kickstart,
            record_activity: false,
            barrier_policy: BarrierPolicy::Lenient,
            barrier_timeout: Duration::from_millis(250),
            threaded_cia_b: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_chip = match self.chipset {
            Chipset::Ocs => 512 * KB,
            Chipset::Ecs => 2048 * KB,
        };
        if !self.chip_ram_size.is_power_of_two()
            || self.chip_ram_size < 256 * KB
            || self.chip_ram_size > max_chip
        {
            return Err(ConfigError::ChipRam {
                size: self.chip_ram_size,
            });
        }
        if self.slow_ram_size != 0
            && (!self.slow_ram_size.is_power_of_two()
                || self.slow_ram_size < 256 * KB
                || self.slow_ram_size > 1024 * KB)
        {
            return Err(ConfigError::SlowRam {
                size: self.slow_ram_size,
            });
        }
        if self.fast_ram_size != 0
            && (!self.fast_ram_size.is_power_of_two()
                || self.fast_ram_size < 64 * KB
                || self.fast_ram_size > 8192 * KB)
        {
            return Err(ConfigError::FastRam {
                size: self.fast_ram_size,
            });
        }
        if self.address_bits != 24 && self.address_bits != 32 {
            return Err(ConfigError::AddressWidth {
                bits: self.address_bits,
            });
        }
        if self.kickstart.len() != 256 * KB && self.kickstart.len() != 512 * KB {
            return Err(ConfigError::Kickstart {
                len: self.kickstart.len(),
            });
        }
        let (width, lines) = match self.region {
            VideoStandard::Pal => (PAL_CCKS_PER_LINE, PAL_LINES_PER_FRAME),
            VideoStandard::Ntsc => (NTSC_CCKS_PER_LINE, NTSC_LINES_PER_FRAME),
        };
        RasterClock::new(width, lines)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom() -> Vec<u8> {
        vec![0; 256 * KB]
    }

    #[test]
    fn presets_validate() {
        assert!(AmigaConfig::preset(AmigaModel::A500, rom()).validate().is_ok());
        assert!(
            AmigaConfig::preset(AmigaModel::A500Plus, rom())
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn ocs_refuses_a_megabyte_of_chip_ram() {
        let mut config = AmigaConfig::preset(AmigaModel::A500, rom());
        config.chip_ram_size = 1024 * KB;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ChipRam { size: 1024 * KB })
        );
        config.chipset = Chipset::Ecs;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn odd_sizes_are_rejected() {
        let mut config = AmigaConfig::preset(AmigaModel::A500, rom());
        config.slow_ram_size = 300 * KB;
        assert!(matches!(config.validate(), Err(ConfigError::SlowRam { .. })));

        let mut config = AmigaConfig::preset(AmigaModel::A500, vec![0; 100]);
        assert_eq!(config.validate(), Err(ConfigError::Kickstart { len: 100 }));
        config.kickstart = rom();
        config.address_bits = 20;
        assert_eq!(
            config.validate(),
            Err(ConfigError::AddressWidth { bits: 20 })
        );
    }
}
