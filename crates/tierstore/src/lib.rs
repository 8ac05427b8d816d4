//! # tierstore
//!
//! Reference hybrid cache engine used behind the tierbench adapter.
//!
//! ## Architecture
//! - **Pools**: independent RAM partitions, each with its own lock
//! - **RAM tier**: byte-weighted LRU per pool (O(1) get/put)
//! - **NVM tier**: per-pool share of the hierarchy's logical capacity;
//!   receives items evicted from RAM and promotes them back on hit
//! - **Hierarchy**: striping, tiering, most-aggressive tiering or caching
//!   layout over two devices, described by [`HierarchyDescriptor`]

#![warn(missing_docs)]

mod engine;
mod error;
pub mod hierarchy;
mod lru;
mod stats;

pub use engine::{
    CacheEngine, EngineConfig, HybridCache, PoolId, RemoveOutcome, WriteHandle, MAX_ITEM_SIZE,
    MAX_KEY_SIZE, MAX_POOLS,
};
pub use error::{Error, Result};
pub use hierarchy::{
    BigHashConfig, BlockSettings, DeviceSpec, HierarchyDescriptor, RegionTuning, TierLayout,
    TierMode, TieringParams, WriteMode,
};
pub use stats::{EngineStats, NVM_BYTES_READ, NVM_BYTES_WRITTEN, NVM_EVICTIONS, RAM_EVICTIONS};
