//! Configuration management for freqcap.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::aggregate::{Reduction, DEFAULT_WINDOW_DAYS};
use crate::bench::{BenchmarkSettings, DEFAULT_USER_SAMPLE};
use crate::catalog::{CampaignCatalog, DEFAULT_CAMPAIGNS};
use crate::error::{FreqCapError, Result};
use crate::schema::{days, Scheme, DEFAULT_RETENTION_DAYS};
use crate::workload::{
    GeneratorSettings, Seeding, DEFAULT_HISTORY_DAYS, DEFAULT_MAX_VIEWS, DEFAULT_PROGRESS_INTERVAL,
    DEFAULT_SEED, DEFAULT_TOTAL_USERS,
};

/// Main configuration for a freqcap run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreqCapConfig {
    /// Storage connection configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Synthetic workload configuration
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// Window query and benchmark configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Expiry configuration for both layouts
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Ordered campaign catalog
    #[serde(default = "default_campaigns")]
    pub campaigns: Vec<String>,
}

impl Default for FreqCapConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            workload: WorkloadConfig::default(),
            query: QueryConfig::default(),
            retention: RetentionConfig::default(),
            campaigns: default_campaigns(),
        }
    }
}

fn default_campaigns() -> Vec<String> {
    DEFAULT_CAMPAIGNS.iter().map(|c| c.to_string()).collect()
}

/// Which key-value backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// A Redis server at `host:port`
    Redis,
    /// An in-process store that lives for one run
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Namespace prefixed to every record key
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Accepted for command-line compatibility; records always live in the
    /// fixed layout collections
    #[serde(default = "default_set")]
    pub set: String,

    /// Deadline for a single storage call in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            host: default_host(),
            port: default_port(),
            namespace: default_namespace(),
            set: default_set(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_backend() -> BackendKind {
    BackendKind::Redis
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_namespace() -> String {
    "test".to_string()
}

fn default_set() -> String {
    "demo".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

impl StorageConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Workload generator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    #[serde(default = "default_total_users")]
    pub total_users: u32,

    #[serde(default = "default_history_days")]
    pub history_days: u32,

    #[serde(default = "default_max_views")]
    pub max_views: u32,

    /// Seed for reproducible data; `null` seeds from entropy
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,

    #[serde(default = "default_progress_interval")]
    pub progress_interval: u32,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            total_users: default_total_users(),
            history_days: default_history_days(),
            max_views: default_max_views(),
            seed: default_seed(),
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_total_users() -> u32 {
    DEFAULT_TOTAL_USERS
}

fn default_history_days() -> u32 {
    DEFAULT_HISTORY_DAYS
}

fn default_max_views() -> u32 {
    DEFAULT_MAX_VIEWS
}

fn default_seed() -> Option<u64> {
    Some(DEFAULT_SEED)
}

fn default_progress_interval() -> u32 {
    DEFAULT_PROGRESS_INTERVAL
}

impl WorkloadConfig {
    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            total_users: self.total_users,
            history_days: self.history_days,
            max_views: self.max_views,
            seeding: match self.seed {
                Some(seed) => Seeding::Seeded(seed),
                None => Seeding::Organic,
            },
        }
    }
}

/// Window query and benchmark configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_user_sample")]
    pub user_sample: u32,

    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default)]
    pub reduction: Reduction,

    /// Layouts to load and benchmark, in order
    #[serde(default = "default_schemes")]
    pub schemes: Vec<Scheme>,

    /// Users evaluated at once during a benchmark
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            user_sample: default_user_sample(),
            window_days: default_window_days(),
            reduction: Reduction::default(),
            schemes: default_schemes(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_user_sample() -> u32 {
    DEFAULT_USER_SAMPLE
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_schemes() -> Vec<Scheme> {
    vec![Scheme::CompoundKey, Scheme::BinColumn]
}

fn default_concurrency() -> usize {
    1
}

impl QueryConfig {
    pub fn benchmark_settings(&self) -> BenchmarkSettings {
        BenchmarkSettings {
            user_sample: self.user_sample,
            window_days: self.window_days,
            concurrency: self.concurrency,
        }
    }
}

/// Expiry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// TTL of each compound-key record, in days
    #[serde(default = "default_compound_ttl_days")]
    pub compound_ttl_days: u32,

    /// Optional whole-record TTL for bin-column records, in days. Without it
    /// bin-column records grow without bound.
    #[serde(default)]
    pub bin_record_ttl_days: Option<u32>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            compound_ttl_days: default_compound_ttl_days(),
            bin_record_ttl_days: None,
        }
    }
}

fn default_compound_ttl_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl RetentionConfig {
    pub fn compound_ttl(&self) -> Duration {
        days(self.compound_ttl_days)
    }

    pub fn bin_record_ttl(&self) -> Option<Duration> {
        self.bin_record_ttl_days.map(days)
    }
}

impl FreqCapConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FreqCapError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Build the campaign catalog.
    pub fn catalog(&self) -> Result<CampaignCatalog> {
        CampaignCatalog::new(self.campaigns.iter().cloned())
    }

    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(FreqCapError::Config(msg.to_string()));

        if self.storage.host.trim().is_empty() {
            return fail("storage.host must not be empty");
        }
        if self.storage.port == 0 {
            return fail("storage.port must not be 0");
        }
        if self.storage.namespace.trim().is_empty() || self.storage.namespace.contains('|') {
            return fail("storage.namespace must be non-empty and must not contain '|'");
        }
        if self.storage.timeout_ms == 0 {
            return fail("storage.timeout_ms must be at least 1");
        }
        if self.workload.history_days == 0 {
            return fail("workload.history_days must be at least 1");
        }
        if self.workload.max_views == 0 {
            return fail("workload.max_views must be at least 1");
        }
        if self.workload.progress_interval == 0 {
            return fail("workload.progress_interval must be at least 1");
        }
        if self.query.window_days == 0 {
            return fail("query.window_days must be at least 1");
        }
        if self.query.concurrency == 0 {
            return fail("query.concurrency must be at least 1");
        }
        if self.query.schemes.is_empty() {
            return fail("query.schemes must name at least one layout");
        }
        if self.retention.compound_ttl_days == 0 {
            return fail("retention.compound_ttl_days must be at least 1");
        }
        if self.retention.bin_record_ttl_days == Some(0) {
            return fail("retention.bin_record_ttl_days must be at least 1 when set");
        }
        self.catalog().map(|_| ())
    }
}
