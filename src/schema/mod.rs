//! Key-value layouts for per-day exposure counts.
//!
//! Two interchangeable layouts map a trailing window of days onto records:
//!
//! - **Compound key** (`freq_compound_key`): one record per user, campaign
//!   and day, with the date embedded in the key and a single `FREQ` bin.
//!   Records carry a TTL and expire on their own.
//! - **Bin column** (`freq_date_in_bin`): one record per user and campaign,
//!   with one bin per date. Writes are batched per record, but old date bins
//!   are never removed by the store because expiry applies to whole records.

mod bin_column;
mod compound_key;

use std::fmt;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::storage::{Bins, RecordKey};
use crate::workload::ExposureEvent;

pub use bin_column::{BinColumnSchema, BIN_SET};
pub use compound_key::{CompoundKeySchema, COMPOUND_KEY_SET, FREQ_BIN};

/// Date format used in record keys and bin names (`yyyyMMdd`).
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Days a compound-key record lives after its last write.
pub const DEFAULT_RETENTION_DAYS: u32 = 10;

/// Selects one of the two layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// One record per user, campaign and day
    CompoundKey,
    /// One record per user and campaign, one bin per day
    BinColumn,
}

impl Scheme {
    /// The collection (set) name records of this layout live in.
    pub fn set_name(&self) -> &'static str {
        match self {
            Scheme::CompoundKey => COMPOUND_KEY_SET,
            Scheme::BinColumn => BIN_SET,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::CompoundKey => write!(f, "compound_key"),
            Scheme::BinColumn => write!(f, "bin_column"),
        }
    }
}

/// A single record write produced by an encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub key: RecordKey,
    pub bins: Bins,
    pub ttl: Option<Duration>,
}

/// How to read one user/campaign window back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPlan {
    /// One record per window day, read in a single batch; each holds `bin`.
    Records { keys: Vec<RecordKey>, bin: &'static str },
    /// A single record restricted to one bin per window day.
    Bins { key: RecordKey, bins: Vec<String> },
}

/// Encoder for one storage layout.
pub trait WindowSchema: Send + Sync {
    fn scheme(&self) -> Scheme;

    /// Encode one user's events into record writes, in the order they
    /// should be applied.
    fn encode_writes(&self, events: &[ExposureEvent]) -> Vec<WriteOp>;

    /// Plan the read of the last `window_days` days ending at `today`.
    fn plan_read(&self, user_id: &str, campaign_id: &str, window_days: u32, today: NaiveDate) -> ReadPlan;
}

/// Format a date the way keys and bin names spell it.
pub fn date_string(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// The dates `today - k` for `k` in `0..window_days`, most recent first.
pub fn window_dates(today: NaiveDate, window_days: u32) -> impl Iterator<Item = NaiveDate> {
    (0..window_days).filter_map(move |offset| today.checked_sub_days(Days::new(u64::from(offset))))
}

/// Convert a day count into a TTL.
pub fn days(n: u32) -> Duration {
    Duration::from_secs(u64::from(n) * 24 * 60 * 60)
}
