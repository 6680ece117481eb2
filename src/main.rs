use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use freqcap::aggregate::{Reduction, WindowAggregator};
use freqcap::bench::BenchmarkHarness;
use freqcap::clock::{Clock, SystemClock};
use freqcap::config::{BackendKind, FreqCapConfig};
use freqcap::schema::{BinColumnSchema, CompoundKeySchema, Scheme, WindowSchema};
use freqcap::storage::{MemoryStore, RecordStore, RedisStore, StorageGateway};
use freqcap::workload::{Loader, WorkloadGenerator};

/// Frequency-cap counters: load synthetic exposures or benchmark window lookups.
#[derive(Parser, Debug)]
#[command(name = "freqcap", version, about, long_about = None)]
struct Cli {
    /// Server hostname (default: 127.0.0.1)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Server port (default: 6379)
    #[arg(short, long)]
    port: Option<u16>,

    /// Namespace prefixed to every key (default: test)
    #[arg(short, long)]
    namespace: Option<String>,

    /// Set name, logged only (default: demo)
    #[arg(short, long)]
    set: Option<String>,

    /// Load data instead of running the benchmark
    #[arg(short, long)]
    load: bool,

    /// Print usage and exit
    #[arg(short, long)]
    usage: bool,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Layout to load or benchmark (repeatable; default: both)
    #[arg(long, value_enum)]
    scheme: Vec<Scheme>,

    /// Number of users to generate
    #[arg(long)]
    users: Option<u32>,

    /// Number of users to benchmark
    #[arg(long)]
    sample: Option<u32>,

    /// Trailing window in days
    #[arg(long)]
    window_days: Option<u32>,

    /// Seed for reproducible data
    #[arg(long, conflicts_with = "organic")]
    seed: Option<u64>,

    /// Seed the generator from entropy
    #[arg(long)]
    organic: bool,

    /// How per-day values are combined
    #[arg(long, value_enum)]
    reduction: Option<Reduction>,

    /// Users benchmarked concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Print load summaries and benchmark reports as JSON
    #[arg(long)]
    json: bool,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Merge the configuration file (if any) with command-line overrides.
    fn resolve_config(&self) -> freqcap::error::Result<FreqCapConfig> {
        let mut config = match &self.config {
            Some(path) => FreqCapConfig::from_file(path)?,
            None => FreqCapConfig::default(),
        };

        if let Some(host) = &self.host {
            config.storage.host = host.clone();
        }
        if let Some(port) = self.port {
            config.storage.port = port;
        }
        if let Some(namespace) = &self.namespace {
            config.storage.namespace = namespace.clone();
        }
        if let Some(set) = &self.set {
            config.storage.set = set.clone();
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if !self.scheme.is_empty() {
            config.query.schemes = self.scheme.clone();
        }
        if let Some(users) = self.users {
            config.workload.total_users = users;
        }
        if let Some(sample) = self.sample {
            config.query.user_sample = sample;
        }
        if let Some(window_days) = self.window_days {
            config.query.window_days = window_days;
        }
        if let Some(seed) = self.seed {
            config.workload.seed = Some(seed);
        }
        if self.organic {
            config.workload.seed = None;
        }
        if let Some(reduction) = self.reduction {
            config.query.reduction = reduction;
        }
        if let Some(concurrency) = self.concurrency {
            config.query.concurrency = concurrency;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_schemas(config: &FreqCapConfig) -> Vec<Arc<dyn WindowSchema>> {
    config
        .query
        .schemes
        .iter()
        .map(|scheme| -> Arc<dyn WindowSchema> {
            match scheme {
                Scheme::CompoundKey => Arc::new(CompoundKeySchema::new(
                    config.storage.namespace.clone(),
                    config.retention.compound_ttl(),
                )),
                Scheme::BinColumn => Arc::new(
                    BinColumnSchema::new(config.storage.namespace.clone())
                        .with_record_ttl(config.retention.bin_record_ttl()),
                ),
            }
        })
        .collect()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.usage {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    }

    init_tracing(&cli.log_level, cli.log_json);

    let config = cli.resolve_config().context("invalid configuration")?;
    info!(
        backend = ?config.storage.backend,
        host = %config.storage.host,
        port = config.storage.port,
        namespace = %config.storage.namespace,
        set = %config.storage.set,
        "Configuration loaded"
    );

    let catalog = Arc::new(config.catalog()?);
    let store: Arc<dyn RecordStore> = match config.storage.backend {
        BackendKind::Redis => Arc::new(
            RedisStore::connect(&config.storage.redis_url(), config.storage.timeout())
                .await
                .context("storage setup failed")?,
        ),
        BackendKind::Memory => {
            warn!("Using the in-memory backend; data is loaded and queried within this run");
            Arc::new(MemoryStore::new())
        }
    };
    let gateway = StorageGateway::with_timeout(store, config.storage.timeout());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let schemas = build_schemas(&config);

    let in_process = config.storage.backend == BackendKind::Memory;
    let run_load = cli.load || in_process;
    let run_benchmark = !cli.load || in_process;

    if run_load {
        let generator = WorkloadGenerator::new(Arc::clone(&catalog), config.workload.generator_settings())?;
        let loader = Loader::new(gateway.clone(), schemas.clone())
            .with_progress_interval(config.workload.progress_interval);

        let summary = loader
            .load(generator.stream(clock.today()))
            .await
            .context("load aborted")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    if run_benchmark {
        for schema in &schemas {
            let aggregator = WindowAggregator::new(gateway.clone(), Arc::clone(schema), Arc::clone(&clock))
                .with_reduction(config.query.reduction);
            let harness = BenchmarkHarness::new(
                Arc::new(aggregator),
                Arc::clone(&catalog),
                config.query.benchmark_settings(),
            );

            let report = harness.run().await.context("benchmark aborted")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
    }

    info!("freqcap finished");
    Ok(())
}
