//! Engine statistics tracking

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter map key: bytes demoted into the NVM tier
pub const NVM_BYTES_WRITTEN: &str = "nvm_bytes_written";
/// Counter map key: bytes served from the NVM tier
pub const NVM_BYTES_READ: &str = "nvm_bytes_read";
/// Counter map key: items dropped from the NVM tier for lack of space
pub const NVM_EVICTIONS: &str = "nvm_evictions";
/// Counter map key: items evicted from RAM
pub const RAM_EVICTIONS: &str = "ram_evictions";

/// Live counters, shared by all pools
#[derive(Debug, Default)]
pub struct CacheStats {
    lookups: AtomicU64,
    ram_hits: AtomicU64,
    nvm_lookups: AtomicU64,
    nvm_hits: AtomicU64,
    nvm_bytes_written: AtomicU64,
    nvm_bytes_read: AtomicU64,
    nvm_evictions: AtomicU64,
    ram_evictions: AtomicU64,
}

impl CacheStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    // Release pairs with the Acquire in `snapshot`, so a sampled hit always
    // has its lookup counted
    pub(crate) fn record_ram_hit(&self) {
        self.ram_hits.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn record_nvm_lookup(&self, hit_bytes: Option<usize>) {
        self.nvm_lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = hit_bytes {
            self.nvm_hits.fetch_add(1, Ordering::Relaxed);
            self.nvm_bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_demotion(&self, bytes: usize) {
        self.ram_evictions.fetch_add(1, Ordering::Relaxed);
        self.nvm_bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.nvm_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> EngineStats {
        // Hits before lookups keeps `ram_hits <= lookups`
        let ram_hits = self.ram_hits.load(Ordering::Acquire);
        let lookups = self.lookups.load(Ordering::Relaxed);

        let mut counters = HashMap::new();
        counters.insert(
            NVM_BYTES_WRITTEN.to_string(),
            self.nvm_bytes_written.load(Ordering::Relaxed) as f64,
        );
        counters.insert(
            NVM_BYTES_READ.to_string(),
            self.nvm_bytes_read.load(Ordering::Relaxed) as f64,
        );
        counters.insert(
            NVM_EVICTIONS.to_string(),
            self.nvm_evictions.load(Ordering::Relaxed) as f64,
        );
        counters.insert(
            RAM_EVICTIONS.to_string(),
            self.ram_evictions.load(Ordering::Relaxed) as f64,
        );

        EngineStats {
            lookups,
            ram_hits,
            nvm_lookups: self.nvm_lookups.load(Ordering::Relaxed),
            nvm_hits: self.nvm_hits.load(Ordering::Relaxed),
            counters,
        }
    }
}

/// Snapshot returned by `CacheEngine::stats`
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Lookups issued against any pool
    pub lookups: u64,
    /// Lookups answered from RAM
    pub ram_hits: u64,
    /// Lookups that fell through to NVM
    pub nvm_lookups: u64,
    /// NVM lookups that found the item
    pub nvm_hits: u64,
    /// Named counters, see the `NVM_*`/`RAM_*` keys
    pub counters: HashMap<String, f64>,
}

impl EngineStats {
    /// RAM miss rate in percent (0.0 to 100.0)
    pub fn ram_miss_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.lookups.saturating_sub(self.ram_hits) as f64 * 100.0 / self.lookups as f64
        }
    }

    /// NVM hit ratio in percent (0.0 to 100.0)
    pub fn nvm_hit_ratio(&self) -> f64 {
        if self.nvm_lookups == 0 {
            0.0
        } else {
            self.nvm_hits as f64 * 100.0 / self.nvm_lookups as f64
        }
    }

    /// Named counter, 0 when the engine does not report it
    pub fn counter(&self, name: &str) -> f64 {
        self.counters.get(name).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_ratios() {
        let stats = CacheStats::new();

        for _ in 0..4 {
            stats.record_lookup();
        }
        stats.record_ram_hit();
        stats.record_nvm_lookup(Some(100));
        stats.record_nvm_lookup(None);
        stats.record_nvm_lookup(None);
        stats.record_nvm_lookup(Some(50));

        let snap = stats.snapshot();
        assert_eq!(snap.ram_miss_rate(), 75.0);
        assert_eq!(snap.nvm_hit_ratio(), 50.0);
        assert_eq!(snap.counter(NVM_BYTES_READ), 150.0);
    }

    #[test]
    fn test_miss_rate_with_excess_hits() {
        let snap = EngineStats {
            lookups: 2,
            ram_hits: 3,
            ..EngineStats::default()
        };
        assert_eq!(snap.ram_miss_rate(), 0.0);
    }

    #[test]
    fn test_snapshot_under_concurrent_hits() {
        let stats = CacheStats::new();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50_000 {
                        stats.record_lookup();
                        stats.record_ram_hit();
                    }
                });
            }
            for _ in 0..20_000 {
                let snap = stats.snapshot();
                assert!(snap.ram_hits <= snap.lookups, "{} hits > {} lookups", snap.ram_hits, snap.lookups);
                assert!((0.0..=100.0).contains(&snap.ram_miss_rate()));
            }
        });

        let snap = stats.snapshot();
        assert_eq!(snap.lookups, 200_000);
        assert_eq!(snap.ram_miss_rate(), 0.0);
    }

    #[test]
    fn test_stats_empty() {
        let snap = CacheStats::new().snapshot();

        assert_eq!(snap.ram_miss_rate(), 0.0);
        assert_eq!(snap.nvm_hit_ratio(), 0.0);
        assert_eq!(snap.counter("no_such_counter"), 0.0);
    }
}
