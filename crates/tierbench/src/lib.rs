//! # tierbench
//!
//! Key/value benchmark adapter over a pooled, multi-tier cache engine.
//!
//! ## Layout
//! - **config**: flat property map and the typed adapter options
//! - **policy**: tier mode and devices to a [`tierstore::HierarchyDescriptor`]
//! - **router**: hash routing for writes, per-worker affinity for reads
//! - **codec**: length-prefixed field/value row format
//! - **scan**: ascending scans rebuilt from point lookups
//! - **adapter**: the read/scan/update/insert/delete façade
//!
//! ## Example
//! ```no_run
//! use tierbench::{AdapterConfig, CacheAdapter, Field};
//!
//! let adapter: CacheAdapter = CacheAdapter::init(&AdapterConfig::default())?;
//! adapter.register_worker(0)?;
//! adapter.insert("usertable", b"user000000000001", &[Field::new("field0", "v")])?;
//! let row = adapter.read(0, "usertable", b"user000000000001", None)?;
//! # Ok::<(), tierbench::Error>(())
//! ```

#![warn(missing_docs)]

mod adapter;
pub mod codec;
pub mod config;
mod error;
pub mod policy;
mod report;
mod router;
mod scan;

pub use adapter::{CacheAdapter, Status, CACHE_NAME};
pub use codec::{Field, Record};
pub use config::{AdapterConfig, Properties, ReadRouting, ScanConfig, TierConfig};
pub use error::{Error, Result};
pub use report::StatsSample;
pub use router::{PoolRouter, WorkerId};
pub use scan::ScanReconstructor;
