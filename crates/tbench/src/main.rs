//! tbench - multi-threaded key/value workload driver for tierbench

mod runner;
mod workload;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tierbench::{AdapterConfig, CacheAdapter, Properties};
use tracing::info;

use crate::runner::Phase;
use crate::workload::Workload;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Property file, may be repeated; later files override earlier ones
    #[arg(short = 'P', long = "property-file")]
    property_files: Vec<PathBuf>,

    /// Single property override as key=value, applied after the files
    #[arg(short = 'p', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Run the load phase
    #[arg(long)]
    load: bool,

    /// Run the transaction phase
    #[arg(long)]
    run: bool,

    /// Worker threads
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Print a stats sample every N seconds while a phase runs
    #[arg(short = 's', long = "status")]
    status_secs: Option<u64>,

    /// RNG seed (0 picks one at random)
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn parse_property(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))
}

fn load_properties(args: &Args) -> Result<Properties> {
    let mut props = Properties::new();
    for path in &args.property_files {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading property file {}", path.display()))?;
        let file = Properties::parse(&text)
            .with_context(|| format!("parsing property file {}", path.display()))?;
        props.extend(file);
    }
    for (key, value) in &args.properties {
        props.set(key.as_str(), value.as_str());
    }
    Ok(props)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }

    let props = load_properties(&args)?;
    let config = AdapterConfig::from_properties(&props)?;
    let workload = Workload::from_properties(&props, &config.scan.prefix, config.scan.width)?;

    let phases: Vec<Phase> = match (args.load, args.run) {
        (false, false) | (true, true) => vec![Phase::Load, Phase::Run],
        (true, false) => vec![Phase::Load],
        (false, true) => vec![Phase::Run],
    };
    let seed = if args.seed == 0 {
        rand::random()
    } else {
        args.seed
    };
    let status = args.status_secs.filter(|&s| s > 0).map(Duration::from_secs);

    info!("Starting tbench v{}", env!("CARGO_PKG_VERSION"));
    info!(
        threads = args.threads,
        seed,
        records = workload.record_count,
        operations = workload.operation_count,
        "Workload loaded"
    );

    // Built once on the main thread and borrowed by every worker
    let adapter: CacheAdapter = CacheAdapter::init(&config)?;

    for phase in phases {
        let report = runner::execute(&adapter, &workload, phase, args.threads, seed, status)?;
        println!("{}", serde_json::to_string(&report)?);
        println!("{}", serde_json::to_string(&adapter.sample())?);
    }

    adapter.cleanup();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        assert_eq!(
            parse_property("cachelib.mode = tiering").unwrap(),
            ("cachelib.mode".to_string(), "tiering".to_string())
        );
        assert!(parse_property("threads").is_err());
    }

    #[test]
    fn test_cli_args() {
        let args = Args::try_parse_from([
            "tbench",
            "-P",
            "a.properties",
            "-p",
            "recordcount=10",
            "-p",
            "cachelib.mode=caching",
            "--run",
            "--threads",
            "4",
            "-s",
            "2",
        ])
        .unwrap();

        assert_eq!(args.property_files, vec![PathBuf::from("a.properties")]);
        assert_eq!(args.properties.len(), 2);
        assert!(args.run && !args.load);
        assert_eq!(args.threads, 4);
        assert_eq!(args.status_secs, Some(2));
    }

    #[test]
    fn test_overrides_win() {
        let args = Args::try_parse_from(["tbench", "-p", "fieldcount=3", "-p", "fieldcount=4"])
            .unwrap();
        let props = load_properties(&args).unwrap();
        assert_eq!(props.get("fieldcount"), Some("4"));
    }

    #[test]
    fn test_small_run() {
        let mut props = Properties::new();
        props.set("cachelib.cache_size", "16");
        props.set("cachelib.read_routing", "key");
        props.set("recordcount", "200");
        props.set("operationcount", "400");
        props.set("fieldcount", "4");
        props.set("fieldlength", "16");
        props.set("scanproportion", "0.1");
        props.set("insertproportion", "0.05");

        let config = AdapterConfig::from_properties(&props).unwrap();
        let workload = Workload::from_properties(&props, "user", 12).unwrap();
        let adapter: CacheAdapter = CacheAdapter::init(&config).unwrap();

        let load = runner::execute(&adapter, &workload, Phase::Load, 4, 1, None).unwrap();
        assert_eq!(load.operations, 200);
        assert!(load.ops.iter().all(|s| s.failed == 0));

        let run = runner::execute(&adapter, &workload, Phase::Run, 4, 1, None).unwrap();
        assert_eq!(run.operations, 400);
        assert!(run.ops.iter().all(|s| s.failed == 0));
    }

    #[test]
    fn test_allocation_failure_aborts_load() {
        let mut props = Properties::new();
        props.set("cachelib.cache_size", "16");
        props.set("recordcount", "3");
        props.set("fieldcount", "1");
        // Larger than the biggest item the engine will allocate
        props.set("fieldlength", "5000000");

        let config = AdapterConfig::from_properties(&props).unwrap();
        let workload = Workload::from_properties(&props, "user", 12).unwrap();
        let adapter: CacheAdapter = CacheAdapter::init(&config).unwrap();

        let err = runner::execute(&adapter, &workload, Phase::Load, 1, 1, None).unwrap_err();
        assert!(format!("{:#}", err).contains("allocation"), "{:#}", err);
    }
}
