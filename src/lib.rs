//! Freqcap - frequency-capping counters over a key-value store
//!
//! This crate answers "on how many of the last N days has this user seen this
//! campaign" using two competing record layouts: one record per user,
//! campaign and day (`freq_compound_key`), or one record per user and
//! campaign with a bin per day (`freq_date_in_bin`). It also ships a
//! reproducible workload generator to populate either layout and a benchmark
//! harness to compare their read latency.

pub mod aggregate;
pub mod bench;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod schema;
pub mod storage;
pub mod workload;
