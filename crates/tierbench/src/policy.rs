//! Tier policy builder
//!
//! Turns the small tiering surface of [`TierConfig`] into the
//! [`HierarchyDescriptor`] the engine is opened with. The descriptor is
//! built once, before any pool exists, so a bad mode or device never
//! reaches the engine.

use tierstore::hierarchy::{GB, KB, MB};
use tierstore::{
    BigHashConfig, BlockSettings, DeviceSpec, HierarchyDescriptor, RegionTuning, TierLayout,
    TierMode, TieringParams, WriteMode,
};

use crate::config::{keys, TierConfig};
use crate::error::{Error, Result};

/// Accesses before a tiering region counts as hot
pub const HOT_THRESHOLD: u32 = 4;
/// Accesses before a hot region cools down
pub const COOLING_THRESHOLD: u32 = 200;
/// Initial hot region size
pub const HOT_REGION_SIZE: u64 = 100_000 * MB;
/// Migration page size for tiering and caching
pub const TIERING_PAGE_SIZE: u64 = 2048 * KB;

/// Build and validate the hierarchy for `config`
pub fn build(config: &TierConfig) -> Result<HierarchyDescriptor> {
    let mode = TierMode::parse(&config.mode)
        .ok_or_else(|| Error::UnknownTierMode(config.mode.clone()))?;

    let fast = device(
        keys::PERF_DEVICE,
        &config.perf_device,
        config.perf_capacity_gb,
        config.instance,
    )?;
    let capacity = device(
        keys::CAP_DEVICE,
        &config.cap_device,
        config.cap_capacity_gb,
        config.instance,
    )?;

    if config.reader_threads == 0 {
        return Err(Error::invalid_config(keys::READER_THREADS, "must be positive"));
    }
    if config.writer_threads == 0 {
        return Err(Error::invalid_config(keys::WRITER_THREADS, "must be positive"));
    }
    if config.bighash_size_pct > 100 {
        return Err(Error::invalid_config(
            keys::BIGHASH_SIZE_PCT,
            format!("{} is not a percentage", config.bighash_size_pct),
        ));
    }

    let layout = match mode {
        TierMode::Striping => TierLayout::Striping,
        TierMode::Tiering => TierLayout::Tiering(tiering(config, None)?),
        TierMode::MostAggressive => {
            if config.region_step_mb == 0 {
                return Err(Error::invalid_config(keys::REGION_STEP_MB, "must be positive"));
            }
            let step_size = config
                .region_step_mb
                .checked_mul(MB)
                .ok_or_else(|| Error::invalid_config(keys::REGION_STEP_MB, "overflows a byte count"))?;
            let tuning = RegionTuning { step_size };
            TierLayout::Tiering(tiering(config, Some(tuning))?)
        }
        TierMode::Caching => {
            let write_mode = WriteMode::parse(&config.caching_write_mode).ok_or_else(|| {
                Error::invalid_config(
                    keys::CACHING_WRITE_MODE,
                    format!("unknown write mode {:?}", config.caching_write_mode),
                )
            })?;
            TierLayout::Caching {
                write_mode,
                page_size: TIERING_PAGE_SIZE,
            }
        }
    };

    let big_hash = (config.bighash_size_pct > 0)
        .then(|| BigHashConfig::with_size_pct(config.bighash_size_pct));

    Ok(HierarchyDescriptor {
        layout,
        fast,
        capacity,
        reader_threads: config.reader_threads,
        writer_threads: config.writer_threads,
        big_hash,
        block: BlockSettings::default(),
    })
}

fn tiering(config: &TierConfig, region_tuning: Option<RegionTuning>) -> Result<TieringParams> {
    if config.migrate_rate_mb == 0 {
        return Err(Error::invalid_config(keys::MIGRATE_RATE_MB, "must be positive"));
    }
    let migrate_rate = config
        .migrate_rate_mb
        .checked_mul(MB)
        .ok_or_else(|| Error::invalid_config(keys::MIGRATE_RATE_MB, "overflows a byte count"))?;
    Ok(TieringParams {
        migrate_rate,
        hot_threshold: HOT_THRESHOLD,
        cooling_threshold: COOLING_THRESHOLD,
        hot_region_size: HOT_REGION_SIZE,
        offload_ratio_max: 100,
        offload_ratio_min: 0,
        page_size: TIERING_PAGE_SIZE,
        region_tuning,
    })
}

/// Validate one device and give it an instance-local path, so adapters
/// sharing a device family never open the same backing file.
fn device(key: &str, path: &str, capacity_gb: u64, instance: u32) -> Result<DeviceSpec> {
    if path.trim().is_empty() {
        return Err(Error::invalid_config(key, "device path is empty"));
    }
    if capacity_gb == 0 {
        return Err(Error::invalid_config(key, "device capacity must be positive"));
    }
    let capacity = capacity_gb
        .checked_mul(GB)
        .ok_or_else(|| Error::invalid_config(key, "device capacity overflows"))?;

    Ok(DeviceSpec {
        path: format!("{}_{}", path, instance),
        capacity,
    })
}
