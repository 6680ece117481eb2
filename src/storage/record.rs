//! Record keys and record contents.

use std::collections::BTreeMap;
use std::fmt;

/// Named integer fields of a record.
pub type Bins = BTreeMap<String, i64>;

/// A key that uniquely identifies a record in the store.
///
/// Keys are triples of namespace, collection (set) name, and a user key
/// built by the schema encoders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Namespace the record lives in
    pub namespace: String,
    /// Collection name, one of the fixed schema sets
    pub set: String,
    /// Schema-specific key, e.g. `user-id-7:Shoes:20240101`
    pub user_key: String,
}

impl RecordKey {
    pub fn new(namespace: &str, set: &str, user_key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.to_string(),
            set: set.to_string(),
            user_key: user_key.into(),
        }
    }

    /// Flatten the key into a single string.
    ///
    /// Format: "{namespace}|{set}|{user_key}". `|` does not occur in the
    /// generated user keys, which use `:` internally.
    pub fn to_storage_key(&self) -> String {
        format!("{}|{}|{}", self.namespace, self.set, self.user_key)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_storage_key())
    }
}

/// A record read back from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    bins: Bins,
}

impl Record {
    pub fn new(bins: Bins) -> Self {
        Self { bins }
    }

    /// Integer value of a bin, if the record carries it.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.bins.get(name).copied()
    }

    pub fn bins(&self) -> &Bins {
        &self.bins
    }

    pub fn into_bins(self) -> Bins {
        self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

impl FromIterator<(String, i64)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, i64)>>(iter: T) -> Self {
        Self {
            bins: iter.into_iter().collect(),
        }
    }
}
