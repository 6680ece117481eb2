//! Compound-key layout: the date is part of the record key.

use std::time::Duration;

use chrono::NaiveDate;

use super::{date_string, window_dates, ReadPlan, Scheme, WindowSchema, WriteOp};
use crate::storage::{Bins, RecordKey};
use crate::workload::ExposureEvent;

/// Collection holding one record per user, campaign and day.
pub const COMPOUND_KEY_SET: &str = "freq_compound_key";

/// The single bin of a compound-key record.
pub const FREQ_BIN: &str = "FREQ";

/// Encoder for `userID:campaignID:yyyyMMdd` records.
#[derive(Debug, Clone)]
pub struct CompoundKeySchema {
    namespace: String,
    /// Applied to every write so records older than the retention age
    /// disappear without explicit deletes
    ttl: Duration,
}

impl CompoundKeySchema {
    pub fn new(namespace: impl Into<String>, ttl: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn record_key(&self, user_id: &str, campaign_id: &str, date: NaiveDate) -> RecordKey {
        RecordKey::new(
            &self.namespace,
            COMPOUND_KEY_SET,
            format!("{}:{}:{}", user_id, campaign_id, date_string(date)),
        )
    }

    pub fn encode_write(&self, event: &ExposureEvent) -> WriteOp {
        WriteOp {
            key: self.record_key(&event.user_id, &event.campaign_id, event.date),
            bins: Bins::from([(FREQ_BIN.to_string(), i64::from(event.views))]),
            ttl: Some(self.ttl),
        }
    }

    /// One key per window day, anchored to `today` rather than to any write.
    pub fn encode_read(&self, user_id: &str, campaign_id: &str, window_days: u32, today: NaiveDate) -> Vec<RecordKey> {
        window_dates(today, window_days)
            .map(|date| self.record_key(user_id, campaign_id, date))
            .collect()
    }
}

impl WindowSchema for CompoundKeySchema {
    fn scheme(&self) -> Scheme {
        Scheme::CompoundKey
    }

    fn encode_writes(&self, events: &[ExposureEvent]) -> Vec<WriteOp> {
        // Same-day duplicates stay separate writes; the later one wins.
        events.iter().map(|event| self.encode_write(event)).collect()
    }

    fn plan_read(&self, user_id: &str, campaign_id: &str, window_days: u32, today: NaiveDate) -> ReadPlan {
        ReadPlan::Records {
            keys: self.encode_read(user_id, campaign_id, window_days, today),
            bin: FREQ_BIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{days, DEFAULT_RETENTION_DAYS};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(campaign: &str, day: NaiveDate, views: u32) -> ExposureEvent {
        ExposureEvent {
            user_id: "user-id-0".to_string(),
            campaign_id: campaign.to_string(),
            date: day,
            views,
        }
    }

    #[test]
    fn test_encode_write_key_and_bins() {
        let schema = CompoundKeySchema::new("test", days(DEFAULT_RETENTION_DAYS));
        let op = schema.encode_write(&event("Shoes", date(2024, 1, 9), 3));

        assert_eq!(op.key.namespace, "test");
        assert_eq!(op.key.set, "freq_compound_key");
        assert_eq!(op.key.user_key, "user-id-0:Shoes:20240109");
        assert_eq!(op.bins.get("FREQ"), Some(&3));
        assert_eq!(op.ttl, Some(Duration::from_secs(864_000)));
    }

    #[test]
    fn test_encode_writes_keeps_duplicates_in_order() {
        let schema = CompoundKeySchema::new("test", days(10));
        let day = date(2024, 1, 9);
        let ops = schema.encode_writes(&[event("Shoes", day, 1), event("Shoes", day, 4)]);

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].key, ops[1].key);
        assert_eq!(ops[1].bins.get("FREQ"), Some(&4));
    }

    #[test]
    fn test_encode_read_is_anchored_to_today() {
        let schema = CompoundKeySchema::new("test", days(10));
        let keys = schema.encode_read("user-id-0", "Cats", 3, date(2024, 1, 1));

        let user_keys: Vec<&str> = keys.iter().map(|k| k.user_key.as_str()).collect();
        assert_eq!(
            user_keys,
            vec![
                "user-id-0:Cats:20240101",
                "user-id-0:Cats:20231231",
                "user-id-0:Cats:20231230"
            ]
        );
    }
}
