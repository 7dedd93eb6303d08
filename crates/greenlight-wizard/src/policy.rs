//! Restriction policy for bulk selection.
//!
//! Only shapes which affordances are rendered. Denying bulk for a filter
//! value forces users through per-item confirmation.

use greenlight_types::config::RestrictionConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictionPolicy {
    allow_bulk: bool,
    denied: Vec<String>,
    allowed: Vec<String>,
}

impl Default for RestrictionPolicy {
    fn default() -> Self {
        Self::from(&RestrictionConfig::default())
    }
}

impl From<&RestrictionConfig> for RestrictionPolicy {
    fn from(config: &RestrictionConfig) -> Self {
        Self {
            allow_bulk: config.allow_bulk,
            denied: config.denied_filters.clone(),
            allowed: config.allowed_filters.clone(),
        }
    }
}

impl RestrictionPolicy {
    /// Whether the synthetic "all" option and bulk submission are offered
    /// for the active filter.
    ///
    /// Without a filter the view mixes every filter value, so any deny entry
    /// suppresses bulk selection.
    pub fn permits_bulk(&self, filter: Option<&str>) -> bool {
        if !self.allow_bulk {
            return false;
        }
        match filter {
            None => self.denied.is_empty(),
            Some(value) => {
                let denied = self.denied.iter().any(|d| d.eq_ignore_ascii_case(value));
                let allowed = self.allowed.is_empty()
                    || self.allowed.iter().any(|a| a.eq_ignore_ascii_case(value));
                !denied && allowed
            }
        }
    }
}
