//! HybridCache: pooled RAM tier backed by an NVM tier

use std::collections::HashMap;
use ahash::RandomState;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::hierarchy::HierarchyDescriptor;
use crate::lru::LruCache;
use crate::stats::{CacheStats, EngineStats};

/// Identifier handed out by `add_pool`
pub type PoolId = u8;

/// Most pools a single engine can carry
pub const MAX_POOLS: usize = 64;

/// Largest item the RAM tier will allocate (largest slab class)
pub const MAX_ITEM_SIZE: usize = 4 * 1024 * 1024;

/// Longest key the engine accepts
pub const MAX_KEY_SIZE: usize = 255;

/// Everything an engine needs to open
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name used in logs
    pub cache_name: String,
    /// RAM budget shared by all pools, in bytes
    pub ram_bytes: usize,
    /// Layout of the non-volatile tier
    pub hierarchy: HierarchyDescriptor,
}

/// Buffer reserved by `allocate`, installed with `insert_or_replace`
#[derive(Debug)]
pub struct WriteHandle {
    pool: PoolId,
    key: Vec<u8>,
    data: Vec<u8>,
}

impl WriteHandle {
    /// Pool the buffer was carved from
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    /// Key the item will be installed under
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Item payload, exactly the allocated size
    pub fn writable_memory(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Result of a remove call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Item was present in RAM or NVM and is gone now
    Removed,
    /// No tier held the key
    NotFound,
}

/// Contract between the benchmark adapter and a cache engine.
///
/// Pools are created during setup through `&mut self`; every other call
/// takes `&self` and may run concurrently from many threads. Each pool
/// locks independently.
pub trait CacheEngine: Send + Sync + Sized {
    /// Open an engine with the given RAM budget and hierarchy
    fn open(config: EngineConfig) -> Result<Self>;

    /// RAM budget available for pools
    fn ram_size(&self) -> usize;

    /// Reserve `bytes` of RAM for a new pool
    fn add_pool(&mut self, name: &str, bytes: usize) -> Result<PoolId>;

    /// Reserve an item buffer; `None` when the engine cannot fit it
    fn allocate(&self, pool: PoolId, key: &[u8], size: usize) -> Result<Option<WriteHandle>>;

    /// Install an allocated item, replacing any previous value for its key
    fn insert_or_replace(&self, handle: WriteHandle) -> Result<()>;

    /// Look up `key`, waiting for any NVM fetch to complete
    fn find(&self, pool: PoolId, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Drop `key` from every tier of the pool
    fn remove(&self, pool: PoolId, key: &[u8]) -> Result<RemoveOutcome>;

    /// Current counters
    fn stats(&self) -> EngineStats;
}

/// NVM side of one pool
struct NvmTier {
    items: HashMap<Vec<u8>, Vec<u8>, RandomState>,
    bytes: u64,
    capacity: u64,
}

impl NvmTier {
    fn new(capacity: u64) -> Self {
        Self {
            items: HashMap::with_hasher(RandomState::new()),
            bytes: 0,
            capacity,
        }
    }

    fn admit(&mut self, key: Vec<u8>, value: Vec<u8>) -> bool {
        let size = (key.len() + value.len()) as u64;
        let replaced = self
            .items
            .get(&key)
            .map_or(0, |old| (key.len() + old.len()) as u64);
        let bytes = self.bytes - replaced + size;
        if bytes > self.capacity {
            return false;
        }
        self.bytes = bytes;
        self.items.insert(key, value);
        true
    }

    fn take(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        let value = self.items.remove(key)?;
        self.bytes -= (key.len() + value.len()) as u64;
        Some(value)
    }
}

// Lock order is `nvm` then `ram`. Anything that moves an item between
// tiers or replaces it holds `nvm` for the whole move.
struct Pool {
    name: String,
    ram_bytes: usize,
    ram: Mutex<LruCache<Vec<u8>, Vec<u8>>>,
    nvm: Mutex<NvmTier>,
}

/// Reference engine: one byte-weighted LRU per pool in RAM, with evicted
/// items demoted into a per-pool share of the hierarchy's logical capacity.
///
/// The NVM tier is simulated in process memory. Its share only caps how
/// much may be demoted, so with the default multi-hundred-GB hierarchy
/// resident memory is bounded by the dataset, not by the RAM budget.
pub struct HybridCache {
    name: String,
    ram_bytes: usize,
    reserved: usize,
    hierarchy: HierarchyDescriptor,
    pools: Vec<Pool>,
    stats: CacheStats,
}

impl HybridCache {
    /// Hierarchy this engine was opened with
    pub fn hierarchy(&self) -> &HierarchyDescriptor {
        &self.hierarchy
    }

    /// Number of pools created so far
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Items currently resident in RAM for `pool`
    pub fn ram_len(&self, pool: PoolId) -> usize {
        self.pools
            .get(pool as usize)
            .map_or(0, |p| p.ram.lock().len())
    }

    /// NVM bytes `pool` may hold
    pub fn nvm_capacity(&self, pool: PoolId) -> u64 {
        self.pools
            .get(pool as usize)
            .map_or(0, |p| p.nvm.lock().capacity)
    }

    /// Items currently resident in NVM for `pool`
    pub fn nvm_len(&self, pool: PoolId) -> usize {
        self.pools
            .get(pool as usize)
            .map_or(0, |p| p.nvm.lock().items.len())
    }

    fn pool(&self, pool: PoolId) -> Result<&Pool> {
        self.pools.get(pool as usize).ok_or(Error::UnknownPool(pool))
    }

    fn demote(&self, pool: &Pool, nvm: &mut NvmTier, evicted: Vec<(Vec<u8>, Vec<u8>)>) {
        for (key, value) in evicted {
            let size = key.len() + value.len();
            if nvm.admit(key, value) {
                self.stats.record_demotion(size);
            } else {
                self.stats.record_drop();
                trace!(pool = %pool.name, size, "NVM tier full, dropping item");
            }
        }
    }
}

impl CacheEngine for HybridCache {
    fn open(config: EngineConfig) -> Result<Self> {
        if config.ram_bytes == 0 {
            return Err(Error::InvalidConfig("RAM size must be positive".to_string()));
        }

        let hierarchy = &config.hierarchy;
        info!(
            cache = %config.cache_name,
            ram_bytes = config.ram_bytes,
            mode = %hierarchy.mode(),
            paths = ?hierarchy.paths(),
            nvm_bytes = hierarchy.logical_capacity(),
            "Opening hybrid cache"
        );

        Ok(Self {
            name: config.cache_name,
            ram_bytes: config.ram_bytes,
            reserved: 0,
            hierarchy: config.hierarchy,
            pools: Vec::new(),
            stats: CacheStats::new(),
        })
    }

    fn ram_size(&self) -> usize {
        self.ram_bytes
    }

    fn add_pool(&mut self, name: &str, bytes: usize) -> Result<PoolId> {
        if self.pools.len() >= MAX_POOLS {
            return Err(Error::TooManyPools(MAX_POOLS));
        }
        let available = self.ram_bytes - self.reserved;
        if bytes == 0 || bytes > available {
            return Err(Error::PoolTooLarge {
                name: name.to_string(),
                requested: bytes,
                available,
            });
        }

        // NVM share follows the pool's RAM share
        let nvm_capacity = (self.hierarchy.logical_capacity() as u128 * bytes as u128
            / self.ram_bytes as u128) as u64;

        let id = self.pools.len() as PoolId;
        self.pools.push(Pool {
            name: name.to_string(),
            ram_bytes: bytes,
            ram: Mutex::new(LruCache::new(bytes)),
            nvm: Mutex::new(NvmTier::new(nvm_capacity)),
        });
        self.reserved += bytes;

        debug!(cache = %self.name, pool = name, id, bytes, nvm_capacity, "Added pool");
        Ok(id)
    }

    fn allocate(&self, pool: PoolId, key: &[u8], size: usize) -> Result<Option<WriteHandle>> {
        let p = self.pool(pool)?;
        if key.len() > MAX_KEY_SIZE || size > MAX_ITEM_SIZE || key.len() + size > p.ram_bytes {
            return Ok(None);
        }
        Ok(Some(WriteHandle {
            pool,
            key: key.to_vec(),
            data: vec![0u8; size],
        }))
    }

    fn insert_or_replace(&self, handle: WriteHandle) -> Result<()> {
        let pool = self.pool(handle.pool)?;
        let WriteHandle { key, data, .. } = handle;

        let mut nvm = pool.nvm.lock();
        // A stale NVM copy must not resurface once the new value leaves RAM
        nvm.take(&key);

        let weight = key.len() + data.len();
        let evicted = pool.ram.lock().put(key, data, weight);
        self.demote(pool, &mut nvm, evicted);
        Ok(())
    }

    fn find(&self, pool: PoolId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let p = self.pool(pool)?;
        self.stats.record_lookup();

        if let Some(value) = p.ram.lock().get(key) {
            self.stats.record_ram_hit();
            return Ok(Some(value.clone()));
        }

        // Held until the promotion lands, so a concurrent replace cannot be
        // overwritten by the value taken here
        let mut nvm = p.nvm.lock();
        let fetched = nvm.take(key);
        self.stats.record_nvm_lookup(fetched.as_ref().map(|v| v.len()));

        let Some(value) = fetched else {
            return Ok(None);
        };
        let weight = key.len() + value.len();
        let evicted = p.ram.lock().put(key.to_vec(), value.clone(), weight);
        self.demote(p, &mut nvm, evicted);
        Ok(Some(value))
    }

    fn remove(&self, pool: PoolId, key: &[u8]) -> Result<RemoveOutcome> {
        let p = self.pool(pool)?;
        let mut nvm = p.nvm.lock();
        let in_ram = p.ram.lock().remove(key).is_some();
        let in_nvm = nvm.take(key).is_some();

        if in_ram || in_nvm {
            Ok(RemoveOutcome::Removed)
        } else {
            Ok(RemoveOutcome::NotFound)
        }
    }

    fn stats(&self) -> EngineStats {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::fixtures;
    use crate::stats::{NVM_BYTES_READ, NVM_BYTES_WRITTEN};

    fn open(ram_bytes: usize, nvm_bytes: u64) -> HybridCache {
        HybridCache::open(EngineConfig {
            cache_name: "test".to_string(),
            ram_bytes,
            hierarchy: fixtures::striping(nvm_bytes / 2, nvm_bytes / 2),
        })
        .unwrap()
    }

    fn put(cache: &HybridCache, pool: PoolId, key: &[u8], value: &[u8]) {
        let mut handle = cache.allocate(pool, key, value.len()).unwrap().unwrap();
        handle.writable_memory().copy_from_slice(value);
        cache.insert_or_replace(handle).unwrap();
    }

    #[test]
    fn test_insert_and_find() {
        let mut cache = open(1024, 1024);
        let pool = cache.add_pool("default", 1024).unwrap();

        put(&cache, pool, b"k1", b"hello");

        assert_eq!(cache.find(pool, b"k1").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(cache.find(pool, b"k2").unwrap(), None);

        let stats = cache.stats();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.ram_hits, 1);
        assert_eq!(stats.nvm_lookups, 1);
    }

    #[test]
    fn test_replace() {
        let mut cache = open(1024, 1024);
        let pool = cache.add_pool("default", 1024).unwrap();

        put(&cache, pool, b"k", b"one");
        put(&cache, pool, b"k", b"two");

        assert_eq!(cache.find(pool, b"k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(cache.ram_len(pool), 1);
    }

    #[test]
    fn test_demotion_and_promotion() {
        let mut cache = open(64, 1024);
        let pool = cache.add_pool("default", 64).unwrap();

        put(&cache, pool, b"a", &[1u8; 30]);
        put(&cache, pool, b"b", &[2u8; 30]);
        put(&cache, pool, b"c", &[3u8; 30]);

        // `a` no longer fits in RAM and went to NVM
        assert_eq!(cache.nvm_len(pool), 1);
        assert_eq!(cache.find(pool, b"a").unwrap(), Some(vec![1u8; 30]));

        let stats = cache.stats();
        assert_eq!(stats.nvm_hits, 1);
        assert_eq!(stats.counter(NVM_BYTES_WRITTEN), 62.0);
        assert_eq!(stats.counter(NVM_BYTES_READ), 30.0);
    }

    #[test]
    fn test_pools_are_isolated() {
        let mut cache = open(1024, 1024);
        let p0 = cache.add_pool("p0", 512).unwrap();
        let p1 = cache.add_pool("p1", 512).unwrap();

        put(&cache, p0, b"k", b"v");

        assert!(cache.find(p0, b"k").unwrap().is_some());
        assert!(cache.find(p1, b"k").unwrap().is_none());
    }

    #[test]
    fn test_pool_budget() {
        let mut cache = open(1024, 1024);
        cache.add_pool("p0", 1000).unwrap();

        let result = cache.add_pool("p1", 100);
        assert!(matches!(result, Err(Error::PoolTooLarge { available: 24, .. })));
    }

    #[test]
    fn test_allocate_too_large() {
        let mut cache = open(1024, 1024);
        let pool = cache.add_pool("default", 1024).unwrap();

        assert!(cache.allocate(pool, b"k", 2048).unwrap().is_none());
        assert!(cache.allocate(pool, &[b'k'; 300], 8).unwrap().is_none());
        assert!(matches!(cache.allocate(9, b"k", 8), Err(Error::UnknownPool(9))));
    }

    #[test]
    fn test_remove() {
        let mut cache = open(1024, 1024);
        let pool = cache.add_pool("default", 1024).unwrap();

        put(&cache, pool, b"k", b"v");

        assert_eq!(cache.remove(pool, b"k").unwrap(), RemoveOutcome::Removed);
        assert_eq!(cache.remove(pool, b"k").unwrap(), RemoveOutcome::NotFound);
        assert!(cache.find(pool, b"k").unwrap().is_none());
    }

    #[test]
    fn test_readmit_same_key_at_capacity() {
        let mut nvm = NvmTier::new(10);

        assert!(nvm.admit(b"k".to_vec(), vec![0u8; 8]));
        // Replacing the only entry frees its bytes first
        assert!(nvm.admit(b"k".to_vec(), vec![1u8; 9]));
        assert_eq!(nvm.bytes, 10);
        assert_eq!(nvm.take(b"k"), Some(vec![1u8; 9]));
        assert_eq!(nvm.bytes, 0);

        assert!(nvm.admit(b"a".to_vec(), vec![0u8; 5]));
        assert!(!nvm.admit(b"b".to_vec(), vec![0u8; 5]));
    }

    #[test]
    fn test_nvm_share_follows_ram_share() {
        let mut cache = open(1024, 1000);
        let p0 = cache.add_pool("p0", 256).unwrap();
        let p1 = cache.add_pool("p1", 768).unwrap();

        assert_eq!(cache.nvm_capacity(p0), 250);
        assert_eq!(cache.nvm_capacity(p1), 750);
        assert_eq!(cache.nvm_capacity(9), 0);
    }

    #[test]
    fn test_promotion_does_not_clobber_replace() {
        let mut cache = open(64, 1024);
        let pool = cache.add_pool("default", 64).unwrap();

        for _ in 0..500 {
            for key in [&b"k"[..], b"f1", b"f2"] {
                cache.remove(pool, key).unwrap();
            }
            put(&cache, pool, b"k", &[1u8; 30]);
            put(&cache, pool, b"f1", &[0u8; 30]);
            put(&cache, pool, b"f2", &[0u8; 30]);
            assert_eq!(cache.nvm_len(pool), 1);

            std::thread::scope(|s| {
                s.spawn(|| cache.find(pool, b"k").unwrap());
                s.spawn(|| put(&cache, pool, b"k", &[2u8; 30]));
            });

            assert_eq!(cache.find(pool, b"k").unwrap(), Some(vec![2u8; 30]));
        }
    }

    #[test]
    fn test_zero_ram_rejected() {
        let result = HybridCache::open(EngineConfig {
            cache_name: "test".to_string(),
            ram_bytes: 0,
            hierarchy: fixtures::striping(1, 1),
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
