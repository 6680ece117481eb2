//! Synthetic exposure events.
//!
//! For every user the generator draws how many campaigns the user saw, then
//! walks that many campaigns from the front of the catalog. For each campaign
//! it draws a number of active days and, for each of those days plus one, a
//! fresh day offset and a view count. Offsets are redrawn on every iteration
//! rather than counting down, so the same date can come up twice for one
//! campaign; the later write then replaces the earlier one. Seeded fixtures
//! depend on this exact draw order.
//!
//! Campaign counts, day draws and view counts come from three separate
//! generators so that changing one distribution leaves the other sequences
//! untouched.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::catalog::CampaignCatalog;
use crate::error::{FreqCapError, Result};

/// Seed used when reproducible data is requested without an explicit seed.
pub const DEFAULT_SEED: u64 = 3690;
/// Users generated by a default load.
pub const DEFAULT_TOTAL_USERS: u32 = 5000;
/// Activity is spread over this many days back from today.
pub const DEFAULT_HISTORY_DAYS: u32 = 10;
/// View counts are drawn from `0..DEFAULT_MAX_VIEWS`.
pub const DEFAULT_MAX_VIEWS: u32 = 5;

/// Identifier of the synthetic user at `index`.
pub fn user_id(index: u32) -> String {
    format!("user-id-{}", index)
}

/// How the random streams are seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seeding {
    /// All three streams start from the same seed; runs are reproducible
    Seeded(u64),
    /// Each stream is seeded from OS entropy
    Organic,
}

impl Seeding {
    fn rng(&self) -> ChaCha8Rng {
        match self {
            Seeding::Seeded(seed) => ChaCha8Rng::seed_from_u64(*seed),
            Seeding::Organic => ChaCha8Rng::from_entropy(),
        }
    }
}

/// Number of views of one campaign by one user on one day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExposureEvent {
    pub user_id: String,
    pub campaign_id: String,
    pub date: NaiveDate,
    pub views: u32,
}

/// All events generated for one user, in generation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserExposures {
    pub user_index: u32,
    pub user_id: String,
    pub events: Vec<ExposureEvent>,
}

/// Shape of the generated workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorSettings {
    pub total_users: u32,
    pub history_days: u32,
    pub max_views: u32,
    pub seeding: Seeding,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            total_users: DEFAULT_TOTAL_USERS,
            history_days: DEFAULT_HISTORY_DAYS,
            max_views: DEFAULT_MAX_VIEWS,
            seeding: Seeding::Seeded(DEFAULT_SEED),
        }
    }
}

/// Produces per-user exposure events over the campaign catalog.
#[derive(Debug, Clone)]
pub struct WorkloadGenerator {
    catalog: Arc<CampaignCatalog>,
    settings: GeneratorSettings,
}

impl WorkloadGenerator {
    pub fn new(catalog: Arc<CampaignCatalog>, settings: GeneratorSettings) -> Result<Self> {
        if settings.history_days == 0 {
            return Err(FreqCapError::Config("history_days must be at least 1".to_string()));
        }
        if settings.max_views == 0 {
            return Err(FreqCapError::Config("max_views must be at least 1".to_string()));
        }
        Ok(Self { catalog, settings })
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Start a fresh pass over all users with dates relative to `today`.
    ///
    /// In seeded mode every call yields the same sequence.
    pub fn stream(&self, today: NaiveDate) -> ExposureStream {
        ExposureStream {
            catalog: Arc::clone(&self.catalog),
            settings: self.settings,
            today,
            campaign_rng: self.settings.seeding.rng(),
            day_rng: self.settings.seeding.rng(),
            view_rng: self.settings.seeding.rng(),
            next_user: 0,
        }
    }
}

/// Iterator over the users of one generation pass.
#[derive(Debug)]
pub struct ExposureStream {
    catalog: Arc<CampaignCatalog>,
    settings: GeneratorSettings,
    today: NaiveDate,
    campaign_rng: ChaCha8Rng,
    day_rng: ChaCha8Rng,
    view_rng: ChaCha8Rng,
    next_user: u32,
}

impl ExposureStream {
    fn generate_user(&mut self, user_index: u32) -> UserExposures {
        let user_id = user_id(user_index);
        let mut events = Vec::new();

        let campaign_total = self.campaign_rng.gen_range(0..self.catalog.len() as u32) as usize;
        for campaign_id in self.catalog.prefix(campaign_total) {
            let active_days = self.day_rng.gen_range(0..self.settings.history_days);
            for _ in 0..=active_days {
                let day_offset = self.day_rng.gen_range(0..self.settings.history_days);
                let views = self.view_rng.gen_range(0..self.settings.max_views);

                if let Some(date) = self.today.checked_sub_days(Days::new(u64::from(day_offset))) {
                    events.push(ExposureEvent {
                        user_id: user_id.clone(),
                        campaign_id: campaign_id.clone(),
                        date,
                        views,
                    });
                }
            }
        }

        UserExposures {
            user_index,
            user_id,
            events,
        }
    }
}

impl Iterator for ExposureStream {
    type Item = UserExposures;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_user >= self.settings.total_users {
            return None;
        }
        let index = self.next_user;
        self.next_user += 1;
        Some(self.generate_user(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.settings.total_users - self.next_user) as usize;
        (remaining, Some(remaining))
    }
}
