//! Tier hierarchy descriptor
//!
//! Describes how the non-volatile side of the cache is laid out across two
//! devices. The descriptor is built once before the engine opens and is
//! never mutated afterwards.

use std::fmt;

/// 1 KiB
pub const KB: u64 = 1024;
/// 1 MiB
pub const MB: u64 = 1024 * KB;
/// 1 GiB
pub const GB: u64 = 1024 * MB;

/// Hierarchy flavour, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierMode {
    /// Devices form one logical pool
    Striping,
    /// Fast tier in front of a capacity tier with background migration
    Tiering,
    /// Tiering with hot-region auto-tuning enabled
    MostAggressive,
    /// Fast tier acts as a write-side cache for the capacity tier
    Caching,
}

impl TierMode {
    /// Parse a configuration string; `None` for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "striping" => Some(TierMode::Striping),
            "tiering" => Some(TierMode::Tiering),
            "most" => Some(TierMode::MostAggressive),
            "caching" => Some(TierMode::Caching),
            _ => None,
        }
    }

    /// Configuration name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            TierMode::Striping => "striping",
            TierMode::Tiering => "tiering",
            TierMode::MostAggressive => "most",
            TierMode::Caching => "caching",
        }
    }
}

impl fmt::Display for TierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write policy of the fast tier in caching mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Writes land on the fast tier and are flushed later
    WriteBack,
    /// Writes go to both tiers before completing
    WriteThrough,
}

impl WriteMode {
    /// Accepts `wb`/`write-back` and `wt`/`write-through`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "wb" | "write-back" => Some(WriteMode::WriteBack),
            "wt" | "write-through" => Some(WriteMode::WriteThrough),
            _ => None,
        }
    }
}

/// One backing device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Device path, already disambiguated per instance
    pub path: String,
    /// Capacity in bytes
    pub capacity: u64,
}

/// Hot-region auto-tuning, only present in the most-aggressive variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionTuning {
    /// Growth increment for the hot region, in bytes
    pub step_size: u64,
}

/// Migration parameters shared by the tiering variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieringParams {
    /// Bytes per second moved between tiers
    pub migrate_rate: u64,
    /// Accesses before a region counts as hot
    pub hot_threshold: u32,
    /// Accesses before a hot region cools down
    pub cooling_threshold: u32,
    /// Initial hot region size in bytes
    pub hot_region_size: u64,
    /// Upper bound on the offload ratio, percent
    pub offload_ratio_max: u8,
    /// Lower bound on the offload ratio, percent
    pub offload_ratio_min: u8,
    /// Migration page size in bytes
    pub page_size: u64,
    /// Set for the most-aggressive variant
    pub region_tuning: Option<RegionTuning>,
}

/// Mode-specific part of the hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierLayout {
    /// RAID-0 style; no promotion or demotion between devices
    Striping,
    /// Fast and capacity tiers with migration
    Tiering(TieringParams),
    /// Fast tier caches writes for the capacity tier
    Caching {
        /// Write policy of the fast tier
        write_mode: WriteMode,
        /// Page size in bytes
        page_size: u64,
    },
}

/// Small-item hash engine sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BigHashConfig {
    /// Share of each device given to the small-item engine, percent
    pub size_pct: u32,
    /// Bucket size in bytes
    pub bucket_size: u32,
    /// Bloom filter bits per bucket
    pub bloom_filter_bits: u32,
    /// Items at or below this size go to the small-item engine
    pub small_item_max_size: u32,
}

impl BigHashConfig {
    /// Fixed geometry used by the benchmark, sized by `size_pct`
    pub fn with_size_pct(size_pct: u32) -> Self {
        Self {
            size_pct,
            bucket_size: 4096,
            bloom_filter_bits: 8,
            small_item_max_size: 2048,
        }
    }
}

/// Device and I/O knobs that do not vary between modes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSettings {
    /// Device block size in bytes
    pub block_size: u32,
    /// Block-cache region size in bytes
    pub region_size: u64,
    /// Number of in-memory region buffers
    pub in_mem_buffers: u32,
    /// Request ordering shards (log2)
    pub req_ordering_shards: u32,
    /// Regions kept clean for incoming writes
    pub clean_regions: u32,
    /// Inserts allowed in flight
    pub max_concurrent_inserts: u32,
    /// Memory budget for queued inserts, MiB
    pub max_parcel_memory_mb: u64,
    /// Largest single device write in bytes
    pub device_max_write_size: u64,
    /// Checksum item payloads on the device
    pub data_checksum: bool,
    /// Answer misses from the index without device reads
    pub fast_negative_lookups: bool,
    /// Minimum TTL for NVM admission, seconds
    pub admission_min_ttl: u32,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            block_size: 4096,
            region_size: 2 * MB,
            in_mem_buffers: 128,
            req_ordering_shards: 21,
            clean_regions: 1,
            max_concurrent_inserts: 1_000_000,
            max_parcel_memory_mb: 1024,
            device_max_write_size: MB,
            data_checksum: false,
            fast_negative_lookups: true,
            admission_min_ttl: 0,
        }
    }
}

/// Complete description of the non-volatile hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyDescriptor {
    /// Mode-specific layout
    pub layout: TierLayout,
    /// Low-latency device
    pub fast: DeviceSpec,
    /// High-capacity device
    pub capacity: DeviceSpec,
    /// NVM reader threads
    pub reader_threads: u32,
    /// NVM writer threads
    pub writer_threads: u32,
    /// Present when the small-item engine is enabled
    pub big_hash: Option<BigHashConfig>,
    /// Fixed device settings
    pub block: BlockSettings,
}

impl HierarchyDescriptor {
    /// Mode this descriptor was built for
    pub fn mode(&self) -> TierMode {
        match &self.layout {
            TierLayout::Striping => TierMode::Striping,
            TierLayout::Tiering(params) if params.region_tuning.is_some() => {
                TierMode::MostAggressive
            }
            TierLayout::Tiering(_) => TierMode::Tiering,
            TierLayout::Caching { .. } => TierMode::Caching,
        }
    }

    /// Device paths in engine order (capacity tier first)
    pub fn paths(&self) -> [&str; 2] {
        [&self.capacity.path, &self.fast.path]
    }

    /// Bytes addressable by the engine.
    ///
    /// Striping and tiering expose both devices; in caching mode the fast
    /// device only mirrors the capacity device.
    pub fn logical_capacity(&self) -> u64 {
        match self.layout {
            TierLayout::Caching { .. } => self.capacity.capacity,
            _ => self.fast.capacity.saturating_add(self.capacity.capacity),
        }
    }

    /// Migration rate in bytes/sec, if the layout migrates at all
    pub fn migrate_rate(&self) -> Option<u64> {
        match &self.layout {
            TierLayout::Tiering(params) => Some(params.migrate_rate),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Small striping hierarchy for engine tests
    pub fn striping(fast: u64, capacity: u64) -> HierarchyDescriptor {
        HierarchyDescriptor {
            layout: TierLayout::Striping,
            fast: DeviceSpec {
                path: "fast_0".to_string(),
                capacity: fast,
            },
            capacity: DeviceSpec {
                path: "cap_0".to_string(),
                capacity,
            },
            reader_threads: 4,
            writer_threads: 2,
            big_hash: None,
            block: BlockSettings::default(),
        }
    }
}
