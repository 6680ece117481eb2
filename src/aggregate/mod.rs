//! Rolling-window aggregation over either storage layout.
//!
//! A lookup reads the last `window_days` days for one user and campaign and
//! reduces them to a single number. Records or bins that are missing, because
//! they expired or were never written, contribute nothing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clock::Clock;
use crate::error::Result;
use crate::schema::{ReadPlan, Scheme, WindowSchema};
use crate::storage::StorageGateway;

/// Default trailing window, in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 10;

/// How per-day values are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// Number of days with at least one view (the frequency-cap answer)
    #[default]
    DaysActive,
    /// Total views across the window
    SumViews,
}

impl Reduction {
    /// Fold per-day values; `None` and non-positive values count as no activity.
    pub fn reduce<I>(&self, values: I) -> u64
    where
        I: IntoIterator<Item = Option<i64>>,
    {
        let active = values.into_iter().flatten().filter(|v| *v > 0);
        match self {
            Reduction::DaysActive => active.count() as u64,
            Reduction::SumViews => active.map(|v| v as u64).sum(),
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::DaysActive => write!(f, "days_active"),
            Reduction::SumViews => write!(f, "sum_views"),
        }
    }
}

/// Answers "how often has this user seen this campaign lately".
pub struct WindowAggregator {
    gateway: StorageGateway,
    schema: Arc<dyn WindowSchema>,
    clock: Arc<dyn Clock>,
    reduction: Reduction,
}

impl WindowAggregator {
    pub fn new(gateway: StorageGateway, schema: Arc<dyn WindowSchema>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            schema,
            clock,
            reduction: Reduction::default(),
        }
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.schema.scheme()
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// Reduce the last `window_days` days (ending today) for one user and
    /// campaign.
    ///
    /// With the default reduction the result is the number of days with at
    /// least one view, so it never exceeds `window_days`. Storage errors are
    /// returned to the caller.
    pub async fn count_or_flag(&self, user_id: &str, campaign_id: &str, window_days: u32) -> Result<u64> {
        if window_days == 0 {
            return Ok(0);
        }

        let today = self.clock.today();
        let result = match self.schema.plan_read(user_id, campaign_id, window_days, today) {
            ReadPlan::Records { keys, bin } => {
                let records = self.gateway.get_records(&keys).await?;
                self.reduction
                    .reduce(records.iter().map(|r| r.as_ref().and_then(|r| r.get_int(bin))))
            }
            ReadPlan::Bins { key, bins } => match self.gateway.get_record_bins(&key, &bins).await? {
                Some(record) => self.reduction.reduce(bins.iter().map(|b| record.get_int(b))),
                None => 0,
            },
        };

        trace!(
            user_id = %user_id,
            campaign = %campaign_id,
            scheme = %self.scheme(),
            window_days = window_days,
            result = result,
            "Window aggregated"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::FreqCapError;
    use crate::schema::{days, BinColumnSchema, CompoundKeySchema};
    use crate::storage::{Bins, MemoryStore};
    use chrono::{Days, NaiveDate};
    use std::time::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn ago(n: u64) -> NaiveDate {
        today() - Days::new(n)
    }

    fn setup(schema: Arc<dyn WindowSchema>) -> (StorageGateway, WindowAggregator) {
        let gateway = StorageGateway::new(Arc::new(MemoryStore::new()));
        let aggregator = WindowAggregator::new(gateway.clone(), schema, Arc::new(FixedClock(today())));
        (gateway, aggregator)
    }

    #[test]
    fn test_reduce_days_active_and_sum() {
        let values = vec![Some(2), None, Some(0), Some(3), Some(-1)];
        assert_eq!(Reduction::DaysActive.reduce(values.clone()), 2);
        assert_eq!(Reduction::SumViews.reduce(values), 5);
        assert_eq!(Reduction::DaysActive.reduce(Vec::new()), 0);
    }

    #[tokio::test]
    async fn test_compound_key_zero_views_do_not_count() {
        let schema = CompoundKeySchema::new("test", days(10));
        let (gateway, aggregator) = setup(Arc::new(schema.clone()));

        for (date, freq) in [(today(), 2), (ago(3), 0)] {
            let key = schema.record_key("user-id-0", "Shoes", date);
            let bins = Bins::from([("FREQ".to_string(), freq)]);
            gateway.put_record(&key, &bins, Some(schema.ttl())).await.unwrap();
        }

        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap(), 1);
        assert_eq!(aggregator.count_or_flag("user-id-0", "Cats", 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bin_column_counts_positive_fields() {
        let schema = BinColumnSchema::new("test");
        let (gateway, aggregator) = setup(Arc::new(schema.clone()));

        let key = schema.record_key("user-id-0", "Shoes");
        let bins: Bins = [(ago(0), 1), (ago(4), 3), (ago(7), 0)]
            .into_iter()
            .map(|(d, v)| (crate::schema::date_string(d), v))
            .collect();
        gateway.put_record(&key, &bins, None).await.unwrap();

        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap(), 2);
        assert_eq!(aggregator.count_or_flag("user-id-1", "Shoes", 10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_days_outside_window_are_ignored() {
        let schema = BinColumnSchema::new("test");
        let (gateway, aggregator) = setup(Arc::new(schema.clone()));

        let key = schema.record_key("user-id-0", "Shoes");
        let bins: Bins = [(ago(1), 1), (ago(5), 1), (ago(12), 4)]
            .into_iter()
            .map(|(d, v)| (crate::schema::date_string(d), v))
            .collect();
        gateway.put_record(&key, &bins, None).await.unwrap();

        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 3).await.unwrap(), 1);
        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap(), 2);
        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sum_views_reduction() {
        let schema = CompoundKeySchema::new("test", days(10));
        let (gateway, aggregator) = setup(Arc::new(schema.clone()));
        let aggregator = aggregator.with_reduction(Reduction::SumViews);

        for (date, freq) in [(today(), 2), (ago(1), 4), (ago(2), 0)] {
            let key = schema.record_key("user-id-0", "Shoes", date);
            gateway
                .put_record(&key, &Bins::from([("FREQ".to_string(), freq)]), None)
                .await
                .unwrap();
        }

        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_count_never_exceeds_window() {
        let schema = CompoundKeySchema::new("test", days(10));
        let (gateway, aggregator) = setup(Arc::new(schema.clone()));

        for n in 0..20 {
            let key = schema.record_key("user-id-0", "Shoes", ago(n));
            gateway
                .put_record(&key, &Bins::from([("FREQ".to_string(), 4)]), None)
                .await
                .unwrap();
        }

        for window in [1, 5, 10, 15] {
            let count = aggregator.count_or_flag("user-id-0", "Shoes", window).await.unwrap();
            assert_eq!(count, u64::from(window));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_compound_records_are_absent() {
        let schema = CompoundKeySchema::new("test", Duration::from_secs(60));
        let (gateway, aggregator) = setup(Arc::new(schema.clone()));

        let key = schema.record_key("user-id-0", "Shoes", today());
        gateway
            .put_record(&key, &Bins::from([("FREQ".to_string(), 3)]), Some(schema.ttl()))
            .await
            .unwrap();
        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_timeout_is_surfaced() {
        let store = MemoryStore::new().with_latency(Duration::from_millis(30));
        let gateway = StorageGateway::with_timeout(Arc::new(store), Duration::from_millis(10));
        let aggregator = WindowAggregator::new(
            gateway,
            Arc::new(BinColumnSchema::new("test")),
            Arc::new(FixedClock(today())),
        );

        let err = aggregator.count_or_flag("user-id-0", "Shoes", 10).await.unwrap_err();
        assert!(matches!(err, FreqCapError::StorageTimeout { operation: "get_record_bins", .. }));
    }
}
