//! Synthetic workload generation and loading.

mod generator;
mod loader;

pub use generator::{
    user_id, ExposureEvent, ExposureStream, GeneratorSettings, Seeding, UserExposures,
    WorkloadGenerator, DEFAULT_HISTORY_DAYS, DEFAULT_MAX_VIEWS, DEFAULT_SEED, DEFAULT_TOTAL_USERS,
};
pub use loader::{LoadSummary, Loader, DEFAULT_PROGRESS_INTERVAL};
