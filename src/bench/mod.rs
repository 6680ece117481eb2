//! Latency benchmark for window lookups.
//!
//! For each sampled user the harness looks up every catalog campaign, adds
//! up the results and times the whole user. The same harness runs against
//! either layout, so the reports are directly comparable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregate::{Reduction, WindowAggregator, DEFAULT_WINDOW_DAYS};
use crate::catalog::CampaignCatalog;
use crate::error::Result;
use crate::schema::Scheme;
use crate::workload::user_id;

/// Users sampled by a default benchmark.
pub const DEFAULT_USER_SAMPLE: u32 = 100;

/// Benchmark parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchmarkSettings {
    /// Users `user-id-0 .. user-id-{user_sample - 1}` are queried
    pub user_sample: u32,
    pub window_days: u32,
    /// Users evaluated at once; 1 runs strictly one after another
    pub concurrency: usize,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            user_sample: DEFAULT_USER_SAMPLE,
            window_days: DEFAULT_WINDOW_DAYS,
            concurrency: 1,
        }
    }
}

/// Result of querying every campaign for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserTiming {
    pub user_id: String,
    /// Sum of the per-campaign results
    pub count: u64,
    /// Campaign lookups that failed and contributed nothing
    pub failures: u32,
    pub elapsed_micros: u64,
}

/// Summary of one benchmark run against one layout.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub scheme: Scheme,
    pub reduction: Reduction,
    pub window_days: u32,
    pub campaigns: usize,
    pub users: Vec<UserTiming>,
    pub total_count: u64,
    pub total_failures: u64,
    pub elapsed_micros: u64,
    pub mean_micros: u64,
    pub p50_micros: u64,
    pub p99_micros: u64,
    pub max_micros: u64,
}

impl BenchmarkReport {
    fn new(
        scheme: Scheme,
        reduction: Reduction,
        window_days: u32,
        campaigns: usize,
        users: Vec<UserTiming>,
        elapsed: Duration,
    ) -> Self {
        let mut latencies: Vec<u64> = users.iter().map(|u| u.elapsed_micros).collect();
        latencies.sort_unstable();

        let mean_micros = if latencies.is_empty() {
            0
        } else {
            latencies.iter().sum::<u64>() / latencies.len() as u64
        };

        Self {
            run_id: Uuid::new_v4(),
            scheme,
            reduction,
            window_days,
            campaigns,
            total_count: users.iter().map(|u| u.count).sum(),
            total_failures: users.iter().map(|u| u64::from(u.failures)).sum(),
            elapsed_micros: elapsed.as_micros() as u64,
            mean_micros,
            p50_micros: percentile(&latencies, 50),
            p99_micros: percentile(&latencies, 99),
            max_micros: latencies.last().copied().unwrap_or(0),
            users,
        }
    }
}

/// Nearest-rank percentile of sorted values.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

/// Drives a `WindowAggregator` over a user sample.
pub struct BenchmarkHarness {
    aggregator: Arc<WindowAggregator>,
    catalog: Arc<CampaignCatalog>,
    settings: BenchmarkSettings,
}

impl BenchmarkHarness {
    pub fn new(aggregator: Arc<WindowAggregator>, catalog: Arc<CampaignCatalog>, settings: BenchmarkSettings) -> Self {
        Self {
            aggregator,
            catalog,
            settings,
        }
    }

    /// Run the benchmark. Failed lookups are logged and counted. Losing the
    /// store altogether stops the run and returns that error.
    pub async fn run(&self) -> Result<BenchmarkReport> {
        let scheme = self.aggregator.scheme();
        info!(
            scheme = %scheme,
            users = self.settings.user_sample,
            window_days = self.settings.window_days,
            "Counting activity by user and campaign"
        );

        let started = Instant::now();
        let users: Vec<UserTiming> = stream::iter(0..self.settings.user_sample)
            .map(|index| self.measure_user(index))
            .buffered(self.settings.concurrency.max(1))
            .try_collect()
            .await?;

        let report = BenchmarkReport::new(
            scheme,
            self.aggregator.reduction(),
            self.settings.window_days,
            self.catalog.len(),
            users,
            started.elapsed(),
        );

        info!(
            scheme = %scheme,
            users = report.users.len(),
            total_count = report.total_count,
            failures = report.total_failures,
            mean_micros = report.mean_micros,
            p50_micros = report.p50_micros,
            p99_micros = report.p99_micros,
            max_micros = report.max_micros,
            "Benchmark complete"
        );
        Ok(report)
    }

    /// Query every campaign for one user. Shares no mutable state with other
    /// users, so users can be measured concurrently.
    async fn measure_user(&self, index: u32) -> Result<UserTiming> {
        let user_id = user_id(index);
        let started = Instant::now();
        let mut count = 0;
        let mut failures = 0;

        for campaign_id in self.catalog.iter() {
            match self
                .aggregator
                .count_or_flag(&user_id, campaign_id, self.settings.window_days)
                .await
            {
                Ok(n) => count += n,
                Err(e) if e.is_fatal() => {
                    error!(user_id = %user_id, campaign = %campaign_id, error = %e, "Storage lost, aborting benchmark");
                    return Err(e);
                }
                Err(e) => {
                    failures += 1;
                    warn!(user_id = %user_id, campaign = %campaign_id, error = %e, "Lookup failed");
                }
            }
        }

        let elapsed = started.elapsed();
        info!(
            user_id = %user_id,
            count = count,
            elapsed_ms = elapsed.as_millis() as u64,
            "User window count"
        );

        Ok(UserTiming {
            user_id,
            count,
            failures,
            elapsed_micros: elapsed.as_micros() as u64,
        })
    }
}
