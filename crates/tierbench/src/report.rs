//! Periodic stats samples

use chrono::{DateTime, Local};
use serde::Serialize;
use tierstore::{EngineStats, NVM_BYTES_READ, NVM_BYTES_WRITTEN};

/// One sampling point, serialized as a JSON line by the driver
#[derive(Debug, Clone, Serialize)]
pub struct StatsSample {
    /// Wall-clock time of the sample
    pub timestamp: DateTime<Local>,
    /// Lookups issued since start
    pub lookups: u64,
    /// RAM hit ratio, percent
    pub ram_hit_ratio: f64,
    /// NVM hit ratio, percent
    pub nvm_hit_ratio: f64,
    /// Bytes written to NVM since start
    pub nvm_bytes_written: f64,
    /// Bytes read from NVM since start
    pub nvm_bytes_read: f64,
}

impl StatsSample {
    /// Sample `stats` now
    pub fn from_engine(stats: &EngineStats) -> Self {
        Self::at(Local::now(), stats)
    }

    /// Sample `stats` as of `timestamp`
    pub fn at(timestamp: DateTime<Local>, stats: &EngineStats) -> Self {
        let ram_hit_ratio = if stats.lookups == 0 {
            0.0
        } else {
            100.0 - stats.ram_miss_rate()
        };

        Self {
            timestamp,
            lookups: stats.lookups,
            ram_hit_ratio,
            nvm_hit_ratio: stats.nvm_hit_ratio(),
            nvm_bytes_written: stats.counter(NVM_BYTES_WRITTEN),
            nvm_bytes_read: stats.counter(NVM_BYTES_READ),
        }
    }
}
