//! Adapter configuration
//!
//! Options arrive as a flat string map (the benchmark's properties). Every
//! key has a literal default; only values that are present but unparsable
//! are rejected here. Semantic checks (mode names, capacities) happen in
//! the policy builder.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Property keys understood by the adapter
pub mod keys {
    #![allow(missing_docs)]

    pub const CACHE_SIZE_MB: &str = "cachelib.cache_size";
    pub const MODE: &str = "cachelib.mode";
    pub const PERF_DEVICE: &str = "cachelib.perf_device";
    pub const PERF_CAPACITY_GB: &str = "cachelib.perf_cap_gb";
    pub const CAP_DEVICE: &str = "cachelib.cap_device";
    pub const CAP_CAPACITY_GB: &str = "cachelib.cap_cap_gb";
    pub const CACHING_WRITE_MODE: &str = "cachelib.caching_write_mode";
    pub const BIGHASH_SIZE_PCT: &str = "cachelib.bighash_size_pct";
    pub const READER_THREADS: &str = "cachelib.reader_thread";
    pub const WRITER_THREADS: &str = "cachelib.writer_thread";
    pub const MIGRATE_RATE_MB: &str = "cachelib.migrate_rate_mb";
    pub const REGION_STEP_MB: &str = "cachelib.region_step_mb";
    pub const INSTANCE: &str = "cachelib.instance";
    pub const POOL_COUNT: &str = "cachelib.pool_count";
    pub const MAX_WORKERS: &str = "cachelib.max_workers";
    pub const READ_ROUTING: &str = "cachelib.read_routing";
    pub const SCAN_KEY_PREFIX: &str = "cachelib.scan_key_prefix";
    pub const SCAN_KEY_WIDTH: &str = "cachelib.scan_key_width";
    pub const SCAN_LOOKUP_LIMIT: &str = "cachelib.scan_lookup_limit";
    pub const FIELD_COUNT: &str = "fieldcount";
}

/// String-keyed option map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// Empty property set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` lines. Blank lines and lines starting with `#`
    /// are skipped; keys and values are trimmed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut props = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::invalid_config(line, format!("line {} is not key=value", lineno + 1))
            })?;
            props.set(key.trim(), value.trim());
        }
        Ok(props)
    }

    /// Set or replace a value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Merge `other` over `self`
    pub fn extend(&mut self, other: Properties) {
        self.values.extend(other.values);
    }

    /// Raw value, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value or `default`
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parsed value or `default`; a present but unparsable value is an error
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| Error::invalid_config(key, format!("{:?}: {}", raw, e))),
        }
    }
}

/// How reads pick a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRouting {
    /// Reads use the shard bound to the worker at registration
    Affinity,
    /// Reads hash the key like writes do
    Key,
}

impl FromStr for ReadRouting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "affinity" => Ok(ReadRouting::Affinity),
            "key" => Ok(ReadRouting::Key),
            other => Err(format!("expected affinity or key, got {}", other)),
        }
    }
}

/// Tiering parameters as configured, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Raw mode string
    pub mode: String,
    /// Fast device identifier
    pub perf_device: String,
    /// Fast device capacity, GB
    pub perf_capacity_gb: u64,
    /// Capacity device identifier
    pub cap_device: String,
    /// Capacity device capacity, GB
    pub cap_capacity_gb: u64,
    /// Raw write mode string, only read in caching mode
    pub caching_write_mode: String,
    /// Small-item engine share, percent (0 disables it)
    pub bighash_size_pct: u32,
    /// NVM reader threads
    pub reader_threads: u32,
    /// NVM writer threads
    pub writer_threads: u32,
    /// Migration rate, MB/s
    pub migrate_rate_mb: u64,
    /// Hot region growth step for the most-aggressive mode, MB
    pub region_step_mb: u64,
    /// Instance number appended to device paths
    pub instance: u32,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            mode: "striping".to_string(),
            perf_device: "optane0".to_string(),
            perf_capacity_gb: 100,
            cap_device: "nvme0".to_string(),
            cap_capacity_gb: 150,
            caching_write_mode: "wb".to_string(),
            bighash_size_pct: 50,
            reader_threads: 128,
            writer_threads: 64,
            migrate_rate_mb: 100,
            region_step_mb: 1024,
            instance: 0,
        }
    }
}

/// Synthetic key shape assumed by scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Fixed textual prefix
    pub prefix: String,
    /// Digits in the zero-padded numeric suffix
    pub width: usize,
    /// Offsets tried before giving up
    pub lookup_limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            prefix: "user".to_string(),
            width: 12,
            lookup_limit: 100,
        }
    }
}

/// Full adapter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// RAM cache size, MB
    pub cache_size_mb: usize,
    /// Non-volatile hierarchy settings
    pub tier: TierConfig,
    /// Number of pool shards
    pub pool_count: usize,
    /// Size of the worker registry
    pub max_workers: usize,
    /// Read routing variant
    pub read_routing: ReadRouting,
    /// Scan key shape
    pub scan: ScanConfig,
    /// Fields in a complete record
    pub field_count: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 1024,
            tier: TierConfig::default(),
            pool_count: 8,
            max_workers: 1024,
            read_routing: ReadRouting::Affinity,
            scan: ScanConfig::default(),
            field_count: 10,
        }
    }
}

impl AdapterConfig {
    /// Read every option from `props`, falling back to the defaults
    pub fn from_properties(props: &Properties) -> Result<Self> {
        use keys::*;

        let d = Self::default();
        let t = d.tier;
        Ok(Self {
            cache_size_mb: props.parse_or(CACHE_SIZE_MB, d.cache_size_mb)?,
            tier: TierConfig {
                mode: props.get_or(MODE, &t.mode).to_string(),
                perf_device: props.get_or(PERF_DEVICE, &t.perf_device).to_string(),
                perf_capacity_gb: props.parse_or(PERF_CAPACITY_GB, t.perf_capacity_gb)?,
                cap_device: props.get_or(CAP_DEVICE, &t.cap_device).to_string(),
                cap_capacity_gb: props.parse_or(CAP_CAPACITY_GB, t.cap_capacity_gb)?,
                caching_write_mode: props
                    .get_or(CACHING_WRITE_MODE, &t.caching_write_mode)
                    .to_string(),
                bighash_size_pct: props.parse_or(BIGHASH_SIZE_PCT, t.bighash_size_pct)?,
                reader_threads: props.parse_or(READER_THREADS, t.reader_threads)?,
                writer_threads: props.parse_or(WRITER_THREADS, t.writer_threads)?,
                migrate_rate_mb: props.parse_or(MIGRATE_RATE_MB, t.migrate_rate_mb)?,
                region_step_mb: props.parse_or(REGION_STEP_MB, t.region_step_mb)?,
                instance: props.parse_or(INSTANCE, t.instance)?,
            },
            pool_count: props.parse_or(POOL_COUNT, d.pool_count)?,
            max_workers: props.parse_or(MAX_WORKERS, d.max_workers)?,
            read_routing: props.parse_or(READ_ROUTING, d.read_routing)?,
            scan: ScanConfig {
                prefix: props.get_or(SCAN_KEY_PREFIX, &d.scan.prefix).to_string(),
                width: props.parse_or(SCAN_KEY_WIDTH, d.scan.width)?,
                lookup_limit: props.parse_or(SCAN_LOOKUP_LIMIT, d.scan.lookup_limit)?,
            },
            field_count: props.parse_or(FIELD_COUNT, d.field_count)?,
        })
    }
}
