//! Error types for the machine crate.

use std::time::Duration;

use commodore_agnus_ocs::RasterError;
use emu_core::{BusError, MapError};
use thiserror::Error;

/// Invalid machine configuration. Raised before anything is built.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chip RAM size {size:#X} is not supported by this chipset")]
    ChipRam { size: usize },
    #[error("slow RAM size {size:#X} is not supported")]
    SlowRam { size: usize },
    #[error("fast RAM size {size:#X} is not supported")]
    FastRam { size: usize },
    #[error("address bus must be 24 or 32 bits wide, not {bits}")]
    AddressWidth { bits: u8 },
    #[error("Kickstart image is {len} bytes; expected 256K or 512K")]
    Kickstart { len: usize },
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Raster(#[from] RasterError),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot has no \"{id}\" component")]
    MissingComponent { id: String },
    #[error("component \"{id}\" field \"{field}\" is missing or malformed")]
    BadField { id: String, field: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BarrierError {
    #[error("tick {generation}: {outstanding} waiter(s) did not ack within {timeout:?}")]
    MissedAck {
        generation: u64,
        outstanding: usize,
        timeout: Duration,
    },
}

/// Failure of a whole-machine operation.
#[derive(Debug, Error)]
pub enum AmigaError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Barrier(#[from] BarrierError),
}
