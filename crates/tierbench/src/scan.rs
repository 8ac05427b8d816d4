//! Scan reconstruction over point lookups
//!
//! The engine has no ordered iteration, so a scan walks synthetic keys
//! upward from the start key's numeric suffix and keeps whatever exists.
//! Keys look like `prefix + zero-padded id`, e.g. `user000000000042`.
//! Probing is capped so a sparse keyspace cannot make a scan unbounded.

use crate::config::{keys, ScanConfig};
use crate::error::{Error, Result};

// u64::MAX has 20 digits
const MAX_WIDTH: usize = 20;

/// Rebuilds ascending scans from point lookups
#[derive(Debug, Clone)]
pub struct ScanReconstructor {
    prefix: Vec<u8>,
    width: usize,
    lookup_limit: usize,
}

impl ScanReconstructor {
    /// Validate the key shape
    pub fn new(config: &ScanConfig) -> Result<Self> {
        if config.width == 0 || config.width > MAX_WIDTH {
            return Err(Error::invalid_config(
                keys::SCAN_KEY_WIDTH,
                format!("width must be 1..={}", MAX_WIDTH),
            ));
        }
        Ok(Self {
            prefix: config.prefix.as_bytes().to_vec(),
            width: config.width,
            lookup_limit: config.lookup_limit,
        })
    }

    /// Most offsets a single scan will try
    pub fn lookup_limit(&self) -> usize {
        self.lookup_limit
    }

    /// Numeric id encoded in `key`
    pub fn parse_id(&self, key: &[u8]) -> Result<u64> {
        let invalid = || Error::InvalidScanKey(String::from_utf8_lossy(key).into_owned());

        let suffix = key.strip_prefix(self.prefix.as_slice()).ok_or_else(invalid)?;
        if suffix.len() != self.width || !suffix.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        std::str::from_utf8(suffix)
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(invalid)
    }

    /// Key for `id`, or `None` once the id no longer fits the width
    pub fn key_for(&self, id: u64) -> Option<Vec<u8>> {
        let digits = format!("{:0width$}", id, width = self.width);
        if digits.len() > self.width {
            return None;
        }
        let mut key = Vec::with_capacity(self.prefix.len() + self.width);
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(digits.as_bytes());
        Some(key)
    }

    /// Collect up to `len` existing rows starting at `start`, in ascending
    /// id order.
    ///
    /// `lookup` returns `Ok(None)` for a missing key; missing keys are
    /// skipped, so a sparse keyspace yields fewer than `len` rows rather
    /// than an error. Lookup errors abort the scan.
    pub fn scan<R, F>(&self, start: &[u8], len: usize, mut lookup: F) -> Result<Vec<R>>
    where
        F: FnMut(&[u8]) -> Result<Option<R>>,
    {
        let base = self.parse_id(start)?;
        let mut rows = Vec::with_capacity(len.min(self.lookup_limit));

        for offset in 0..self.lookup_limit as u64 {
            if rows.len() >= len {
                break;
            }
            let Some(key) = base.checked_add(offset).and_then(|id| self.key_for(id)) else {
                break;
            };
            if let Some(row) = lookup(&key)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }
}
