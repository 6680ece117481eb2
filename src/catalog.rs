//! The campaign catalog.
//!
//! The catalog is an ordered, read-only list of campaign identifiers shared by
//! the generator and the benchmark. Order matters: the generator always picks
//! a prefix of the catalog.

use std::collections::HashSet;

use crate::error::{FreqCapError, Result};

/// Campaigns used when no catalog is configured.
pub const DEFAULT_CAMPAIGNS: [&str; 16] = [
    "Shoes",
    "Cats",
    "Dogs",
    "Helicopters",
    "Computers",
    "Dresses",
    "Cars",
    "Travel",
    "RealEstate",
    "Suits",
    "Wine",
    "Food",
    "Hats",
    "Ski",
    "Boats",
    "Planes",
];

/// An ordered set of campaign identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignCatalog {
    campaigns: Vec<String>,
}

impl CampaignCatalog {
    /// Build a catalog, rejecting empty, blank, or duplicate identifiers.
    pub fn new<I, S>(campaigns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let campaigns: Vec<String> = campaigns.into_iter().map(Into::into).collect();
        if campaigns.is_empty() {
            return Err(FreqCapError::Config("campaign catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for campaign in &campaigns {
            if campaign.trim().is_empty() {
                return Err(FreqCapError::Config(
                    "campaign identifiers must not be blank".to_string(),
                ));
            }
            // ':' separates the parts of a record key
            if campaign.contains(':') {
                return Err(FreqCapError::Config(format!(
                    "campaign identifier `{}` must not contain ':'",
                    campaign
                )));
            }
            if !seen.insert(campaign.as_str()) {
                return Err(FreqCapError::Config(format!(
                    "duplicate campaign identifier `{}`",
                    campaign
                )));
            }
        }

        Ok(Self { campaigns })
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.campaigns.get(index).map(String::as_str)
    }

    /// The first `n` campaigns in catalog order.
    pub fn prefix(&self, n: usize) -> &[String] {
        &self.campaigns[..n.min(self.campaigns.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.campaigns.iter().map(String::as_str)
    }
}

impl Default for CampaignCatalog {
    fn default() -> Self {
        Self {
            campaigns: DEFAULT_CAMPAIGNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order() {
        let catalog = CampaignCatalog::default();
        assert_eq!(catalog.len(), 16);
        assert_eq!(catalog.get(0), Some("Shoes"));
        assert_eq!(catalog.get(15), Some("Planes"));
        assert_eq!(catalog.get(16), None);
    }

    #[test]
    fn test_prefix_is_clamped() {
        let catalog = CampaignCatalog::new(["Shoes", "Cats"]).unwrap();
        assert_eq!(catalog.prefix(0).len(), 0);
        assert_eq!(catalog.prefix(1), &["Shoes".to_string()]);
        assert_eq!(catalog.prefix(5).len(), 2);
    }

    #[test]
    fn test_rejects_invalid_catalogs() {
        assert!(CampaignCatalog::new(Vec::<String>::new()).is_err());
        assert!(CampaignCatalog::new(["Shoes", "Shoes"]).is_err());
        assert!(CampaignCatalog::new(["Shoes", " "]).is_err());
        assert!(CampaignCatalog::new(["Sho:es"]).is_err());
    }
}
