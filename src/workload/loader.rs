//! Write path: generated events into one or more storage layouts.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::generator::UserExposures;
use crate::error::Result;
use crate::schema::{Scheme, WindowSchema};
use crate::storage::StorageGateway;

/// Progress is logged every this many users.
pub const DEFAULT_PROGRESS_INTERVAL: u32 = 500;

/// Totals for one load run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub users: u64,
    pub events: u64,
    pub writes: u64,
    pub failed_writes: u64,
}

/// Persists generated users into every configured layout.
///
/// Each user is generated once and written to all layouts, so the layouts
/// always hold the same data. A failed write is logged and counted, unless
/// the store has become unreachable, which ends the load with that error.
pub struct Loader {
    gateway: StorageGateway,
    schemas: Vec<Arc<dyn WindowSchema>>,
    progress_interval: u32,
}

impl Loader {
    pub fn new(gateway: StorageGateway, schemas: Vec<Arc<dyn WindowSchema>>) -> Self {
        Self {
            gateway,
            schemas,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: u32) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn schemes(&self) -> Vec<Scheme> {
        self.schemas.iter().map(|s| s.scheme()).collect()
    }

    /// Write every user produced by `users`.
    pub async fn load<I>(&self, users: I) -> Result<LoadSummary>
    where
        I: IntoIterator<Item = UserExposures>,
    {
        info!(schemes = ?self.schemes(), "Generating data");
        let mut summary = LoadSummary::default();

        for user in users {
            summary.users += 1;
            summary.events += user.events.len() as u64;

            for schema in &self.schemas {
                for op in schema.encode_writes(&user.events) {
                    summary.writes += 1;
                    if let Err(e) = self.gateway.put_record(&op.key, &op.bins, op.ttl).await {
                        if e.is_fatal() {
                            error!(user_id = %user.user_id, key = %op.key, error = %e, "Storage lost, aborting load");
                            return Err(e);
                        }
                        summary.failed_writes += 1;
                        warn!(
                            user_id = %user.user_id,
                            key = %op.key,
                            scheme = %schema.scheme(),
                            error = %e,
                            "Write failed"
                        );
                    }
                }
            }

            if user.user_index % self.progress_interval == 0 {
                info!(users = user.user_index, "Loaded users");
            }
            debug!(user_id = %user.user_id, events = user.events.len(), "User loaded");
        }

        info!(
            users = summary.users,
            events = summary.events,
            writes = summary.writes,
            failed_writes = summary.failed_writes,
            "Load complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CampaignCatalog;
    use crate::schema::{days, BinColumnSchema, CompoundKeySchema};
    use crate::error::FreqCapError;
    use crate::storage::{Bins, MemoryStore, Record, RecordKey, RecordStore};
    use crate::workload::{GeneratorSettings, Seeding, WorkloadGenerator};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn schemas() -> Vec<Arc<dyn WindowSchema>> {
        vec![
            Arc::new(CompoundKeySchema::new("test", days(10))),
            Arc::new(BinColumnSchema::new("test")),
        ]
    }

    #[tokio::test]
    async fn test_load_writes_both_layouts() {
        let store = Arc::new(MemoryStore::new());
        let loader = Loader::new(StorageGateway::new(store.clone()), schemas());

        let catalog = Arc::new(CampaignCatalog::new(["Shoes", "Cats", "Dogs", "Helicopters"]).unwrap());
        let generator = WorkloadGenerator::new(
            catalog,
            GeneratorSettings {
                total_users: 2,
                seeding: Seeding::Seeded(3690),
                ..GeneratorSettings::default()
            },
        )
        .unwrap();

        let summary = loader.load(generator.stream(today())).await.unwrap();

        // user-id-1 sees Shoes, Cats and Dogs over 19 events
        assert_eq!(summary.users, 2);
        assert_eq!(summary.events, 19);
        assert_eq!(summary.writes, 19 + 3);
        assert_eq!(summary.failed_writes, 0);

        let gateway = StorageGateway::new(store.clone());
        let cats = gateway
            .get_record(&RecordKey::new("test", "freq_date_in_bin", "user-id-1:Cats"))
            .await
            .unwrap()
            .unwrap();
        // Offsets 9, 3, 5, 2, 8 with 8 written last as 1
        assert_eq!(cats.len(), 5);
        assert_eq!(cats.get_int("20240607"), Some(1));

        let shoes_today = gateway
            .get_record(&RecordKey::new("test", "freq_compound_key", "user-id-1:Shoes:20240615"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shoes_today.get_int("FREQ"), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_writes_are_counted_not_fatal() {
        let store = MemoryStore::new().with_latency(std::time::Duration::from_millis(20));
        let gateway = StorageGateway::with_timeout(Arc::new(store), std::time::Duration::from_millis(5));
        let loader = Loader::new(gateway, schemas());

        let user = UserExposures {
            user_index: 0,
            user_id: "user-id-0".to_string(),
            events: vec![crate::workload::ExposureEvent {
                user_id: "user-id-0".to_string(),
                campaign_id: "Shoes".to_string(),
                date: today(),
                views: 2,
            }],
        };

        let summary = loader
            .load(vec![user.clone(), UserExposures { user_index: 1, ..user }])
            .await
            .unwrap();
        assert_eq!(summary.users, 2);
        assert_eq!(summary.writes, 4);
        assert_eq!(summary.failed_writes, 4);
    }

    /// Store whose connection is gone; counts the calls it receives.
    #[derive(Default)]
    struct UnreachableStore {
        calls: AtomicUsize,
    }

    impl UnreachableStore {
        fn unavailable(&self) -> FreqCapError {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FreqCapError::StorageUnavailable("connection dropped".to_string())
        }
    }

    #[async_trait]
    impl RecordStore for UnreachableStore {
        async fn put(&self, _key: &RecordKey, _bins: &Bins, _ttl: Option<Duration>) -> Result<()> {
            Err(self.unavailable())
        }

        async fn get(&self, _key: &RecordKey) -> Result<Option<Record>> {
            Err(self.unavailable())
        }

        async fn get_bins(&self, _key: &RecordKey, _bins: &[String]) -> Result<Option<Record>> {
            Err(self.unavailable())
        }

        async fn batch_get(&self, _keys: &[RecordKey]) -> Result<Vec<Option<Record>>> {
            Err(self.unavailable())
        }
    }

    #[tokio::test]
    async fn test_lost_connection_aborts_load() {
        let store = Arc::new(UnreachableStore::default());
        let loader = Loader::new(StorageGateway::new(store.clone()), schemas());

        let catalog = Arc::new(CampaignCatalog::default());
        let generator = WorkloadGenerator::new(
            catalog,
            GeneratorSettings {
                total_users: 50,
                seeding: Seeding::Seeded(3690),
                ..GeneratorSettings::default()
            },
        )
        .unwrap();

        let err = loader.load(generator.stream(today())).await.unwrap_err();
        assert!(matches!(err, FreqCapError::StorageUnavailable(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
