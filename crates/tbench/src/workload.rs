//! Core workload: operation mix, key space and record generation

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tierbench::{Field, Properties, Record};

/// Workload property keys
pub mod keys {
    pub const TABLE: &str = "table";
    pub const RECORD_COUNT: &str = "recordcount";
    pub const OPERATION_COUNT: &str = "operationcount";
    pub const FIELD_COUNT: &str = "fieldcount";
    pub const FIELD_LENGTH: &str = "fieldlength";
    pub const READ_PROPORTION: &str = "readproportion";
    pub const UPDATE_PROPORTION: &str = "updateproportion";
    pub const SCAN_PROPORTION: &str = "scanproportion";
    pub const INSERT_PROPORTION: &str = "insertproportion";
    pub const DELETE_PROPORTION: &str = "deleteproportion";
    pub const MAX_SCAN_LENGTH: &str = "maxscanlength";
    pub const READ_ALL_FIELDS: &str = "readallfields";
}

/// Benchmark operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Update,
    Scan,
    Insert,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Read,
        Operation::Update,
        Operation::Scan,
        Operation::Insert,
        Operation::Delete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Update => "UPDATE",
            Operation::Scan => "SCAN",
            Operation::Insert => "INSERT",
            Operation::Delete => "DELETE",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Workload definition shared by every worker
#[derive(Debug)]
pub struct Workload {
    pub table: String,
    pub record_count: u64,
    pub operation_count: u64,
    pub field_count: usize,
    pub field_length: usize,
    pub max_scan_length: usize,
    pub read_all_fields: bool,
    key_prefix: String,
    key_width: usize,
    // (operation, cumulative weight)
    mix: Vec<(Operation, f64)>,
    next_insert: AtomicU64,
}

impl Workload {
    /// Build from workload properties; keys follow the adapter's scan shape
    pub fn from_properties(props: &Properties, key_prefix: &str, key_width: usize) -> Result<Self> {
        let record_count: u64 = props.parse_or(keys::RECORD_COUNT, 1000)?;
        let operation_count: u64 = props.parse_or(keys::OPERATION_COUNT, 1000)?;
        let field_count: usize = props.parse_or(keys::FIELD_COUNT, 10)?;
        let max_scan_length: usize = props.parse_or(keys::MAX_SCAN_LENGTH, 100)?;

        if field_count == 0 {
            bail!("{} must be positive", keys::FIELD_COUNT);
        }
        if max_scan_length == 0 {
            bail!("{} must be positive", keys::MAX_SCAN_LENGTH);
        }

        // Every id this run can reach must fit the key width
        let key_space = u32::try_from(key_width)
            .ok()
            .and_then(|w| 10u64.checked_pow(w))
            .unwrap_or(u64::MAX);
        if record_count.saturating_add(operation_count) > key_space {
            bail!(
                "{} records plus {} operations overflow {}-digit keys",
                record_count,
                operation_count,
                key_width
            );
        }

        let mut mix = Vec::new();
        let mut total = 0.0;
        for (op, key, default) in [
            (Operation::Read, keys::READ_PROPORTION, 0.95),
            (Operation::Update, keys::UPDATE_PROPORTION, 0.05),
            (Operation::Scan, keys::SCAN_PROPORTION, 0.0),
            (Operation::Insert, keys::INSERT_PROPORTION, 0.0),
            (Operation::Delete, keys::DELETE_PROPORTION, 0.0),
        ] {
            let weight: f64 = props.parse_or(key, default)?;
            if !(weight >= 0.0 && weight.is_finite()) {
                bail!("{} must be a non-negative number, got {}", key, weight);
            }
            if weight > 0.0 {
                total += weight;
                mix.push((op, total));
            }
        }
        if mix.is_empty() {
            bail!("operation proportions are all zero");
        }

        Ok(Self {
            table: props.get_or(keys::TABLE, "usertable").to_string(),
            record_count,
            operation_count,
            field_count,
            field_length: props.parse_or(keys::FIELD_LENGTH, 100)?,
            max_scan_length,
            read_all_fields: props.parse_or(keys::READ_ALL_FIELDS, true)?,
            key_prefix: key_prefix.to_string(),
            key_width,
            mix,
            next_insert: AtomicU64::new(record_count),
        })
    }

    /// Key for sequence id `id`
    pub fn key(&self, id: u64) -> Vec<u8> {
        format!("{}{:0width$}", self.key_prefix, id, width = self.key_width).into_bytes()
    }

    /// Name of field `i`
    pub fn field_name(i: usize) -> Vec<u8> {
        format!("field{}", i).into_bytes()
    }

    /// Weighted random operation
    pub fn next_operation<R: Rng>(&self, rng: &mut R) -> Operation {
        let total = self.mix.last().map_or(0.0, |(_, w)| *w);
        let pick = rng.gen::<f64>() * total;
        self.mix
            .iter()
            .find(|(_, cumulative)| pick < *cumulative)
            .or(self.mix.last())
            .map_or(Operation::Read, |(op, _)| *op)
    }

    /// A full record of random alphanumeric values
    pub fn record<R: Rng>(&self, rng: &mut R) -> Record {
        (0..self.field_count)
            .map(|i| {
                let value: Vec<u8> = (0..self.field_length)
                    .map(|_| rng.sample(Alphanumeric))
                    .collect();
                Field::new(Self::field_name(i), value)
            })
            .collect()
    }

    /// One random field name, for single-field reads
    pub fn random_field<R: Rng>(&self, rng: &mut R) -> Vec<u8> {
        Self::field_name(rng.gen_range(0..self.field_count))
    }

    /// Uniform id among those handed out so far; `None` on an empty table
    pub fn existing_id<R: Rng>(&self, rng: &mut R) -> Option<u64> {
        let upper = self.next_insert.load(Ordering::Relaxed);
        (upper > 0).then(|| rng.gen_range(0..upper))
    }

    /// Claim the next id for a run-phase insert
    pub fn claim_insert_id(&self) -> u64 {
        self.next_insert.fetch_add(1, Ordering::Relaxed)
    }

    /// Scan length, uniform in `1..=maxscanlength`
    pub fn scan_length<R: Rng>(&self, rng: &mut R) -> usize {
        rng.gen_range(1..=self.max_scan_length)
    }
}

/// Share of `total` assigned to `worker` out of `workers`
pub fn share(total: u64, worker: usize, workers: usize) -> u64 {
    let workers = workers as u64;
    let worker = worker as u64;
    total / workers + u64::from(worker < total % workers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn workload(pairs: &[(&str, &str)]) -> Result<Workload> {
        let mut props = Properties::new();
        for (k, v) in pairs {
            props.set(*k, *v);
        }
        Workload::from_properties(&props, "user", 12)
    }

    #[test]
    fn test_defaults() {
        let w = workload(&[]).unwrap();

        assert_eq!(w.table, "usertable");
        assert_eq!(w.record_count, 1000);
        assert_eq!(w.operation_count, 1000);
        assert_eq!(w.field_count, 10);
        assert_eq!(w.field_length, 100);
        assert_eq!(w.max_scan_length, 100);
        assert!(w.read_all_fields);
        assert_eq!(w.mix.len(), 2);
    }

    #[test]
    fn test_key_shape() {
        let w = workload(&[]).unwrap();
        assert_eq!(w.key(42), b"user000000000042");
    }

    #[test]
    fn test_single_operation_mix() {
        let w = workload(&[
            (keys::READ_PROPORTION, "0"),
            (keys::UPDATE_PROPORTION, "0"),
            (keys::SCAN_PROPORTION, "1"),
        ])
        .unwrap();
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..100 {
            assert_eq!(w.next_operation(&mut rng), Operation::Scan);
        }
    }

    #[test]
    fn test_mix_follows_weights() {
        let w = workload(&[]).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let reads = (0..10_000)
            .filter(|_| w.next_operation(&mut rng) == Operation::Read)
            .count();

        assert!((9_000..=9_900).contains(&reads), "reads = {}", reads);
    }

    #[test]
    fn test_rejects_bad_mix() {
        assert!(workload(&[(keys::READ_PROPORTION, "0"), (keys::UPDATE_PROPORTION, "0")]).is_err());
        assert!(workload(&[(keys::READ_PROPORTION, "-1")]).is_err());
        assert!(workload(&[(keys::READ_PROPORTION, "lots")]).is_err());
    }

    #[test]
    fn test_rejects_key_overflow() {
        let mut props = Properties::new();
        props.set(keys::RECORD_COUNT, "990");
        props.set(keys::OPERATION_COUNT, "20");
        assert!(Workload::from_properties(&props, "user", 3).is_err());
    }

    #[test]
    fn test_record_shape() {
        let w = workload(&[(keys::FIELD_COUNT, "3"), (keys::FIELD_LENGTH, "8")]).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let record = w.record(&mut rng);

        assert_eq!(record.len(), 3);
        assert_eq!(record[2].name, b"field2");
        assert!(record.iter().all(|f| f.value.len() == 8));
        assert!(record.iter().all(|f| f.value.iter().all(u8::is_ascii_alphanumeric)));
    }

    #[test]
    fn test_insert_ids_extend_key_space() {
        let w = workload(&[(keys::RECORD_COUNT, "10")]).unwrap();
        let mut rng = SmallRng::seed_from_u64(5);

        assert_eq!(w.claim_insert_id(), 10);
        assert_eq!(w.claim_insert_id(), 11);
        for _ in 0..100 {
            assert!(w.existing_id(&mut rng).unwrap() < 12);
        }
    }

    #[test]
    fn test_empty_table() {
        let w = workload(&[(keys::RECORD_COUNT, "0")]).unwrap();
        let mut rng = SmallRng::seed_from_u64(5);
        assert_eq!(w.existing_id(&mut rng), None);
    }

    #[test]
    fn test_share_covers_total() {
        let total: u64 = (0..7).map(|w| share(1000, w, 7)).sum();
        assert_eq!(total, 1000);
        assert_eq!(share(10, 0, 4), 3);
        assert_eq!(share(10, 3, 4), 2);
    }
}
