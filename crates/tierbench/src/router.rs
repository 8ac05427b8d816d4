//! Pool router
//!
//! Writes pick a shard by hashing the key. Reads pick the shard bound to
//! the calling worker when it registered, whatever the key.
//!
//! The two rules disagree whenever a worker reads a key that was written
//! to another shard: the read misses even though the key is cached. This
//! gap is part of the sharding scheme and is kept as is. The `Key` read
//! routing variant in [`crate::adapter`] routes reads by hash instead.

use std::hash::BuildHasher;
use std::sync::OnceLock;

use ahash::RandomState;
use tracing::debug;

use crate::error::{Error, Result};

/// Worker identity, the logical thread index assigned by the driver
pub type WorkerId = usize;

// Fixed seeds keep routing stable for the lifetime of a process
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

/// Maps keys and workers to pool shards
pub struct PoolRouter {
    pool_count: usize,
    hasher: RandomState,
    affinity: Box<[OnceLock<usize>]>,
}

impl PoolRouter {
    /// Router over `pool_count` shards accepting worker ids below `max_workers`
    pub fn new(pool_count: usize, max_workers: usize) -> Result<Self> {
        if pool_count == 0 {
            return Err(Error::invalid_config(
                crate::config::keys::POOL_COUNT,
                "must be positive",
            ));
        }
        Ok(Self {
            pool_count,
            hasher: RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]),
            affinity: (0..max_workers).map(|_| OnceLock::new()).collect(),
        })
    }

    /// Number of shards
    pub fn pool_count(&self) -> usize {
        self.pool_count
    }

    /// Shard for a write (and delete) of `key`
    pub fn route_for_write(&self, key: &[u8]) -> usize {
        (BuildHasher::hash_one(&self.hasher, key) % self.pool_count as u64) as usize
    }

    /// Shard bound to `worker`.
    ///
    /// Fails with `WorkerNotRegistered` instead of falling back to shard 0.
    pub fn route_for_read(&self, worker: WorkerId) -> Result<usize> {
        self.affinity
            .get(worker)
            .and_then(OnceLock::get)
            .copied()
            .ok_or(Error::WorkerNotRegistered(worker))
    }

    /// Bind `worker` to `shard` for all of its reads.
    ///
    /// The first binding wins; registering again returns the shard already
    /// bound. Steady-state reads never take a lock.
    pub fn register_worker(&self, worker: WorkerId, shard: usize) -> Result<usize> {
        if shard >= self.pool_count {
            return Err(Error::ShardOutOfRange {
                shard,
                count: self.pool_count,
            });
        }
        let slot = self.affinity.get(worker).ok_or(Error::WorkerOutOfRange {
            worker,
            capacity: self.affinity.len(),
        })?;

        let bound = *slot.get_or_init(|| shard);
        debug!(worker, shard = bound, "Registered worker");
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_route_is_deterministic() {
        let router = PoolRouter::new(8, 4).unwrap();
        let other = PoolRouter::new(8, 4).unwrap();

        for i in 0..100 {
            let key = format!("user{:012}", i);
            let shard = router.route_for_write(key.as_bytes());
            assert!(shard < 8);
            assert_eq!(shard, router.route_for_write(key.as_bytes()));
            assert_eq!(shard, other.route_for_write(key.as_bytes()));
        }
    }

    #[test]
    fn test_write_route_is_uniform() {
        let router = PoolRouter::new(8, 1).unwrap();
        let mut counts = [0usize; 8];

        for i in 0..10_000u64 {
            // Spread-out ids stand in for random keys
            let id = i.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            let key = format!("user{:020}", id);
            counts[router.route_for_write(key.as_bytes())] += 1;
        }

        let mean = 10_000 / 8;
        for (shard, &count) in counts.iter().enumerate() {
            assert!(count <= 2 * mean, "shard {} got {} of 10000", shard, count);
            assert!(count > 0);
        }
    }

    #[test]
    fn test_read_affinity_ignores_key() {
        let router = PoolRouter::new(8, 4).unwrap();
        router.register_worker(2, 5).unwrap();

        for _ in 0..10 {
            assert_eq!(router.route_for_read(2).unwrap(), 5);
        }
    }

    #[test]
    fn test_unregistered_worker() {
        let router = PoolRouter::new(8, 4).unwrap();

        assert!(matches!(router.route_for_read(1), Err(Error::WorkerNotRegistered(1))));
        assert!(matches!(router.route_for_read(99), Err(Error::WorkerNotRegistered(99))));
    }

    #[test]
    fn test_register_is_idempotent() {
        let router = PoolRouter::new(8, 4).unwrap();

        assert_eq!(router.register_worker(0, 3).unwrap(), 3);
        assert_eq!(router.register_worker(0, 3).unwrap(), 3);
        // First binding sticks
        assert_eq!(router.register_worker(0, 6).unwrap(), 3);
        assert_eq!(router.route_for_read(0).unwrap(), 3);
    }

    #[test]
    fn test_register_bounds() {
        let router = PoolRouter::new(8, 4).unwrap();

        assert!(matches!(
            router.register_worker(0, 8),
            Err(Error::ShardOutOfRange { shard: 8, count: 8 })
        ));
        assert!(matches!(
            router.register_worker(4, 0),
            Err(Error::WorkerOutOfRange { worker: 4, capacity: 4 })
        ));
    }

    #[test]
    fn test_zero_pools_rejected() {
        assert!(PoolRouter::new(0, 4).is_err());
    }
}
