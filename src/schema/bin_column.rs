//! Bin-column layout: one record per user and campaign, one bin per date.
//!
//! The store can only expire whole records, so date bins accumulate for as
//! long as the record keeps being written. With no record TTL configured the
//! record grows without bound; with one, every write pushes the expiry of all
//! of its dates forward.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;

use super::{date_string, window_dates, ReadPlan, Scheme, WindowSchema, WriteOp};
use crate::storage::{Bins, RecordKey};
use crate::workload::ExposureEvent;

/// Collection holding one record per user and campaign.
pub const BIN_SET: &str = "freq_date_in_bin";

/// Encoder for `userID:campaignID` records with `yyyyMMdd` bins.
#[derive(Debug, Clone)]
pub struct BinColumnSchema {
    namespace: String,
    record_ttl: Option<Duration>,
}

impl BinColumnSchema {
    /// A layout whose records never expire.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            record_ttl: None,
        }
    }

    /// Expire the whole record `ttl` after its most recent write.
    pub fn with_record_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn record_ttl(&self) -> Option<Duration> {
        self.record_ttl
    }

    pub fn record_key(&self, user_id: &str, campaign_id: &str) -> RecordKey {
        RecordKey::new(&self.namespace, BIN_SET, format!("{}:{}", user_id, campaign_id))
    }

    /// Fold the events of one user/campaign pair into a single multi-bin
    /// write. A repeated date keeps its last value.
    pub fn encode_group<'a, I>(&self, user_id: &str, campaign_id: &str, events: I) -> WriteOp
    where
        I: IntoIterator<Item = &'a ExposureEvent>,
    {
        let bins: Bins = events
            .into_iter()
            .map(|event| (date_string(event.date), i64::from(event.views)))
            .collect();

        WriteOp {
            key: self.record_key(user_id, campaign_id),
            bins,
            ttl: self.record_ttl,
        }
    }

    /// The record key plus one bin name per window day.
    pub fn encode_read(&self, user_id: &str, campaign_id: &str, window_days: u32, today: NaiveDate) -> (RecordKey, Vec<String>) {
        (
            self.record_key(user_id, campaign_id),
            window_dates(today, window_days).map(date_string).collect(),
        )
    }
}

impl WindowSchema for BinColumnSchema {
    fn scheme(&self) -> Scheme {
        Scheme::BinColumn
    }

    fn encode_writes(&self, events: &[ExposureEvent]) -> Vec<WriteOp> {
        // Group by (user, campaign) in order of first appearance.
        let mut order: Vec<(&str, &str)> = Vec::new();
        let mut groups: HashMap<(&str, &str), Vec<&ExposureEvent>> = HashMap::new();
        for event in events {
            let pair = (event.user_id.as_str(), event.campaign_id.as_str());
            groups
                .entry(pair)
                .or_insert_with(|| {
                    order.push(pair);
                    Vec::new()
                })
                .push(event);
        }

        order
            .into_iter()
            .filter_map(|pair| {
                let group = groups.remove(&pair)?;
                Some(self.encode_group(pair.0, pair.1, group))
            })
            .collect()
    }

    fn plan_read(&self, user_id: &str, campaign_id: &str, window_days: u32, today: NaiveDate) -> ReadPlan {
        let (key, bins) = self.encode_read(user_id, campaign_id, window_days, today);
        ReadPlan::Bins { key, bins }
    }
}
