//! CacheAdapter: the five benchmark operations over a pooled engine

use tierstore::{CacheEngine, EngineConfig, HybridCache, PoolId, RemoveOutcome};
use tracing::{info, trace};

use crate::codec::{self, Field, Record};
use crate::config::{keys, AdapterConfig, ReadRouting};
use crate::error::{Error, Result};
use crate::policy;
use crate::report::StatsSample;
use crate::router::{PoolRouter, WorkerId};
use crate::scan::ScanReconstructor;

/// Name the engine is opened under
pub const CACHE_NAME: &str = "tierbench";

/// Outcome of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The key existed and was removed
    Ok,
    /// The key was not in its shard
    NotFound,
}

/// State shared by every operation variant
struct Core<E> {
    engine: E,
    pools: Vec<PoolId>,
    router: PoolRouter,
    scanner: ScanReconstructor,
    field_count: usize,
}

impl<E: CacheEngine> Core<E> {
    fn find(&self, shard: usize, key: &[u8], fields: Option<&[Vec<u8>]>) -> Result<Option<Record>> {
        let Some(bytes) = self.engine.find(self.pools[shard], key)? else {
            return Ok(None);
        };

        let record = match fields {
            Some(fields) => codec::decode_filtered(&bytes, fields)?,
            None => {
                let record = codec::decode(&bytes)?;
                if record.len() != self.field_count {
                    return Err(Error::IncompleteRecord {
                        expected: self.field_count,
                        found: record.len(),
                    });
                }
                record
            }
        };
        Ok(Some(record))
    }

    fn insert_or_replace(&self, key: &[u8], values: &[Field]) -> Result<()> {
        let shard = self.router.route_for_write(key);
        let bytes = codec::encode(values)?;

        let mut handle = self
            .engine
            .allocate(self.pools[shard], key, bytes.len())?
            .ok_or(Error::AllocationFailed {
                pool: shard,
                size: bytes.len(),
            })?;
        handle.writable_memory().copy_from_slice(&bytes);
        self.engine.insert_or_replace(handle)?;
        Ok(())
    }

    // Deletes must land where the insert did, so they reuse write routing
    fn remove(&self, key: &[u8]) -> Result<Status> {
        let shard = self.router.route_for_write(key);
        match self.engine.remove(self.pools[shard], key)? {
            RemoveOutcome::Removed => Ok(Status::Ok),
            RemoveOutcome::NotFound => Ok(Status::NotFound),
        }
    }
}

/// Operation set chosen once at init.
///
/// Variants differ only in how reads and scan lookups pick a shard; writes
/// and deletes always follow write routing.
trait Operations<E: CacheEngine>: Send + Sync {
    fn read(
        &self,
        core: &Core<E>,
        worker: WorkerId,
        key: &[u8],
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Option<Record>>;

    fn scan(
        &self,
        core: &Core<E>,
        worker: WorkerId,
        start: &[u8],
        len: usize,
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Vec<Record>>;

    fn update(&self, core: &Core<E>, key: &[u8], values: &[Field]) -> Result<()> {
        core.insert_or_replace(key, values)
    }

    fn insert(&self, core: &Core<E>, key: &[u8], values: &[Field]) -> Result<()> {
        core.insert_or_replace(key, values)
    }

    fn delete(&self, core: &Core<E>, key: &[u8]) -> Result<Status> {
        core.remove(key)
    }
}

/// Reads go to the worker's registered shard
struct AffinityOps;

impl<E: CacheEngine> Operations<E> for AffinityOps {
    fn read(
        &self,
        core: &Core<E>,
        worker: WorkerId,
        key: &[u8],
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Option<Record>> {
        let shard = core.router.route_for_read(worker)?;
        core.find(shard, key, fields)
    }

    fn scan(
        &self,
        core: &Core<E>,
        worker: WorkerId,
        start: &[u8],
        len: usize,
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Vec<Record>> {
        let shard = core.router.route_for_read(worker)?;
        core.scanner.scan(start, len, |key| core.find(shard, key, fields))
    }
}

/// Reads hash the key, same as writes
struct KeyedOps;

impl<E: CacheEngine> Operations<E> for KeyedOps {
    fn read(
        &self,
        core: &Core<E>,
        _worker: WorkerId,
        key: &[u8],
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Option<Record>> {
        core.find(core.router.route_for_write(key), key, fields)
    }

    fn scan(
        &self,
        core: &Core<E>,
        _worker: WorkerId,
        start: &[u8],
        len: usize,
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Vec<Record>> {
        core.scanner.scan(start, len, |key| {
            core.find(core.router.route_for_write(key), key, fields)
        })
    }
}

/// Benchmark-facing façade.
///
/// `init` builds the tier hierarchy, opens the engine and carves out every
/// pool before returning, so a constructed adapter is always complete.
/// Share it across workers behind an `Arc`; each worker must call
/// [`register_worker`](Self::register_worker) before its first read.
///
/// With the default affinity routing, reads only look in the worker's own
/// shard and can miss keys that write routing placed elsewhere.
pub struct CacheAdapter<E: CacheEngine = HybridCache> {
    core: Core<E>,
    ops: Box<dyn Operations<E>>,
}

impl<E: CacheEngine> CacheAdapter<E> {
    /// Validate `config`, open the engine and create all pools
    pub fn init(config: &AdapterConfig) -> Result<Self> {
        // Hierarchy first: a bad mode must fail before any pool exists
        let hierarchy = policy::build(&config.tier)?;
        let router = PoolRouter::new(config.pool_count, config.max_workers)?;
        let scanner = ScanReconstructor::new(&config.scan)?;

        let ram_bytes = config
            .cache_size_mb
            .checked_mul(1 << 20)
            .filter(|&bytes| bytes > 0)
            .ok_or_else(|| Error::invalid_config(keys::CACHE_SIZE_MB, "must be positive"))?;

        info!(
            mode = %hierarchy.mode(),
            fast = %hierarchy.fast.path,
            capacity = %hierarchy.capacity.path,
            migrate_rate = ?hierarchy.migrate_rate(),
            pools = config.pool_count,
            routing = ?config.read_routing,
            "Initializing cache adapter"
        );

        let mut engine = E::open(EngineConfig {
            cache_name: CACHE_NAME.to_string(),
            ram_bytes,
            hierarchy,
        })?;

        let pool_bytes = engine.ram_size() / config.pool_count;
        if pool_bytes == 0 {
            return Err(Error::invalid_config(
                keys::POOL_COUNT,
                "more pools than bytes of cache",
            ));
        }
        let pools = (0..config.pool_count)
            .map(|i| engine.add_pool(&format!("pool{}", i), pool_bytes))
            .collect::<tierstore::Result<Vec<_>>>()?;

        let ops: Box<dyn Operations<E>> = match config.read_routing {
            ReadRouting::Affinity => Box::new(AffinityOps),
            ReadRouting::Key => Box::new(KeyedOps),
        };

        Ok(Self {
            core: Core {
                engine,
                pools,
                router,
                scanner,
                field_count: config.field_count,
            },
            ops,
        })
    }

    /// Bind `worker` to shard `worker % pool_count` for its reads
    pub fn register_worker(&self, worker: WorkerId) -> Result<usize> {
        let shard = worker % self.core.router.pool_count();
        self.core.router.register_worker(worker, shard)
    }

    /// Read one record; `Ok(None)` on a miss.
    ///
    /// With `fields`, only those fields are returned, in the requested
    /// order. Blocks until any NVM fetch completes.
    pub fn read(
        &self,
        worker: WorkerId,
        table: &str,
        key: &[u8],
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Option<Record>> {
        trace!(worker, table, key = %String::from_utf8_lossy(key), "read");
        self.ops.read(&self.core, worker, key, fields)
    }

    /// Up to `len` records with ids ascending from `start`.
    ///
    /// An approximation of a range scan: ids are looked up one by one up to
    /// the configured ceiling and missing ones are skipped.
    pub fn scan(
        &self,
        worker: WorkerId,
        table: &str,
        start: &[u8],
        len: usize,
        fields: Option<&[Vec<u8>]>,
    ) -> Result<Vec<Record>> {
        trace!(worker, table, start = %String::from_utf8_lossy(start), len, "scan");
        self.ops.scan(&self.core, worker, start, len, fields)
    }

    /// Replace the record stored under `key`
    pub fn update(&self, table: &str, key: &[u8], values: &[Field]) -> Result<()> {
        trace!(table, key = %String::from_utf8_lossy(key), "update");
        self.ops.update(&self.core, key, values)
    }

    /// Store a record under `key`, replacing any existing one
    pub fn insert(&self, table: &str, key: &[u8], values: &[Field]) -> Result<()> {
        trace!(table, key = %String::from_utf8_lossy(key), "insert");
        self.ops.insert(&self.core, key, values)
    }

    /// Remove `key` from the shard write routing placed it in
    pub fn delete(&self, table: &str, key: &[u8]) -> Result<Status> {
        trace!(table, key = %String::from_utf8_lossy(key), "delete");
        self.ops.delete(&self.core, key)
    }

    /// Current stats sample
    pub fn sample(&self) -> StatsSample {
        StatsSample::from_engine(&self.core.engine.stats())
    }

    /// Shutdown hook. The engine lives as long as the adapter, so this
    /// only reports final counters.
    pub fn cleanup(&self) {
        let sample = self.sample();
        info!(
            lookups = sample.lookups,
            ram_hit_ratio = sample.ram_hit_ratio,
            nvm_hit_ratio = sample.nvm_hit_ratio,
            "Cache adapter cleanup"
        );
    }

    /// Routing used by this adapter
    pub fn router(&self) -> &PoolRouter {
        &self.core.router
    }

    /// Underlying engine
    pub fn engine(&self) -> &E {
        &self.core.engine
    }

    /// Pool id backing `shard`
    pub fn pool_id(&self, shard: usize) -> Option<PoolId> {
        self.core.pools.get(shard).copied()
    }
}
