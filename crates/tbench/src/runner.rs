//! Load and run phases over a shared adapter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use tierbench::{CacheAdapter, Status};
use tracing::{info, warn};

use crate::workload::{share, Operation, Workload};

/// Benchmark phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Insert `recordcount` records
    Load,
    /// Issue `operationcount` mixed operations
    Run,
}

impl Phase {
    fn name(self) -> &'static str {
        match self {
            Phase::Load => "load",
            Phase::Run => "run",
        }
    }
}

enum Outcome {
    Ok,
    NotFound,
}

#[derive(Default)]
struct Tally {
    ok: [AtomicU64; 5],
    not_found: [AtomicU64; 5],
    failed: [AtomicU64; 5],
}

impl Tally {
    fn record(&self, op: Operation, outcome: Outcome) {
        let slot = match outcome {
            Outcome::Ok => &self.ok,
            Outcome::NotFound => &self.not_found,
        };
        slot[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn fail(&self, op: Operation) {
        self.failed[op.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> Vec<OpSummary> {
        Operation::ALL
            .iter()
            .map(|&op| {
                let i = op.index();
                OpSummary {
                    op: op.name(),
                    ok: self.ok[i].load(Ordering::Relaxed),
                    not_found: self.not_found[i].load(Ordering::Relaxed),
                    failed: self.failed[i].load(Ordering::Relaxed),
                }
            })
            .filter(|s| s.ok + s.not_found + s.failed > 0)
            .collect()
    }
}

/// Counts for one operation kind
#[derive(Debug, Serialize)]
pub struct OpSummary {
    pub op: &'static str,
    pub ok: u64,
    pub not_found: u64,
    pub failed: u64,
}

/// Result of one phase
#[derive(Debug, Serialize)]
pub struct PhaseReport {
    pub phase: &'static str,
    pub threads: usize,
    pub runtime_ms: u128,
    pub operations: u64,
    pub throughput: f64,
    pub ops: Vec<OpSummary>,
}

/// Drives one phase with `threads` workers.
///
/// Worker `i` registers as worker id `i` before its first operation. With
/// `status` set, a stats sample is printed as a JSON line at that interval
/// until the workers finish. Fatal errors (corrupted rows, failed
/// allocations, engine failures) abort the phase; any other operation
/// error is logged and counted.
pub fn execute(
    adapter: &CacheAdapter,
    workload: &Workload,
    phase: Phase,
    threads: usize,
    seed: u64,
    status: Option<Duration>,
) -> Result<PhaseReport> {
    let tally = Tally::default();
    let start = Instant::now();
    info!(phase = phase.name(), threads, "Starting phase");

    thread::scope(|s| -> Result<()> {
        let (stop, stopped) = mpsc::channel::<()>();
        if let Some(interval) = status {
            s.spawn(move || {
                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    match serde_json::to_string(&adapter.sample()) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(error = %e, "Failed to serialize stats sample"),
                    }
                }
            });
        }

        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                let tally = &tally;
                s.spawn(move || -> Result<()> {
                    adapter.register_worker(worker)?;
                    let mut rng = SmallRng::seed_from_u64(seed.wrapping_add(worker as u64));
                    match phase {
                        Phase::Load => load(adapter, workload, worker, threads, &mut rng, tally),
                        Phase::Run => run(adapter, workload, worker, threads, &mut rng, tally),
                    }
                })
            })
            .collect();

        let mut result = Ok(());
        for handle in workers {
            let joined = handle
                .join()
                .map_err(|_| anyhow!("worker thread panicked"))
                .and_then(|r| r);
            if result.is_ok() {
                result = joined;
            }
        }
        drop(stop);
        result
    })?;

    let elapsed = start.elapsed();
    let ops = tally.summary();
    let operations: u64 = ops.iter().map(|s| s.ok + s.not_found + s.failed).sum();
    let secs = elapsed.as_secs_f64();

    let report = PhaseReport {
        phase: phase.name(),
        threads,
        runtime_ms: elapsed.as_millis(),
        operations,
        throughput: if secs > 0.0 { operations as f64 / secs } else { 0.0 },
        ops,
    };
    info!(
        phase = report.phase,
        operations = report.operations,
        runtime_ms = report.runtime_ms as u64,
        throughput = report.throughput,
        "Phase complete"
    );
    Ok(report)
}

fn load(
    adapter: &CacheAdapter,
    workload: &Workload,
    worker: usize,
    threads: usize,
    rng: &mut SmallRng,
    tally: &Tally,
) -> Result<()> {
    for id in (worker as u64..workload.record_count).step_by(threads) {
        let key = workload.key(id);
        let record = workload.record(rng);
        match adapter.insert(&workload.table, &key, &record) {
            Ok(()) => tally.record(Operation::Insert, Outcome::Ok),
            Err(e) if e.is_fatal() => {
                tally.fail(Operation::Insert);
                return Err(anyhow!(e).context(format!("load aborted at record {}", id)));
            }
            Err(e) => {
                warn!(worker, error = %e, "Load insert failed");
                tally.fail(Operation::Insert);
            }
        }
    }
    Ok(())
}

fn run(
    adapter: &CacheAdapter,
    workload: &Workload,
    worker: usize,
    threads: usize,
    rng: &mut SmallRng,
    tally: &Tally,
) -> Result<()> {
    for _ in 0..share(workload.operation_count, worker, threads) {
        let op = workload.next_operation(rng);
        match step(adapter, workload, worker, op, rng) {
            Ok(outcome) => tally.record(op, outcome),
            Err(e) if e.is_fatal() => {
                tally.fail(op);
                return Err(anyhow!(e).context(format!("{} aborted the run", op.name())));
            }
            Err(e) => {
                warn!(worker, op = op.name(), error = %e, "Operation failed");
                tally.fail(op);
            }
        }
    }
    Ok(())
}

fn step(
    adapter: &CacheAdapter,
    workload: &Workload,
    worker: usize,
    op: Operation,
    rng: &mut SmallRng,
) -> tierbench::Result<Outcome> {
    let table = workload.table.as_str();

    let found = match op {
        Operation::Insert => {
            let key = workload.key(workload.claim_insert_id());
            adapter.insert(table, &key, &workload.record(rng))?;
            true
        }
        Operation::Read => match existing_key(workload, rng) {
            Some(key) => {
                let fields = projection(workload, rng);
                adapter.read(worker, table, &key, fields.as_deref())?.is_some()
            }
            None => false,
        },
        Operation::Scan => match existing_key(workload, rng) {
            Some(start) => {
                let len = workload.scan_length(rng);
                let fields = projection(workload, rng);
                !adapter.scan(worker, table, &start, len, fields.as_deref())?.is_empty()
            }
            None => false,
        },
        // Rows are replaced whole, so updates always write every field
        Operation::Update => match existing_key(workload, rng) {
            Some(key) => {
                adapter.update(table, &key, &workload.record(rng))?;
                true
            }
            None => false,
        },
        Operation::Delete => match existing_key(workload, rng) {
            Some(key) => adapter.delete(table, &key)? == Status::Ok,
            None => false,
        },
    };

    Ok(if found { Outcome::Ok } else { Outcome::NotFound })
}

fn existing_key(workload: &Workload, rng: &mut SmallRng) -> Option<Vec<u8>> {
    workload.existing_id(rng).map(|id| workload.key(id))
}

fn projection(workload: &Workload, rng: &mut SmallRng) -> Option<Vec<Vec<u8>>> {
    (!workload.read_all_fields).then(|| vec![workload.random_field(rng)])
}
