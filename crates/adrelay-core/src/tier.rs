//! Subscription tiers: free accounts get a fixed delay and forced branding,
//! premium accounts pick their own delay and post without the footer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AdRelayConfig;
use crate::error::{AdRelayError, Result};
use crate::types::Account;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    /// Premium only while the flag is set and the expiry (if any) is ahead.
    pub fn of(account: &Account, now: DateTime<Utc>) -> Self {
        let unexpired = account.premium_until.is_none_or(|until| until > now);
        if account.is_premium && unexpired {
            Tier::Premium
        } else {
            Tier::Free
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => write!(f, "free"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

/// Tier rules resolved from config.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    pub free_delay_secs: u64,
    pub footer: String,
    pub min_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Delay a new premium account starts from when its own is out of bounds.
    pub default_delay_secs: u64,
}

impl TierPolicy {
    pub fn from_config(config: &AdRelayConfig) -> Self {
        Self {
            free_delay_secs: config.free.delay_secs,
            footer: config.footer(),
            min_delay_secs: config.premium.min_delay_secs,
            max_delay_secs: config.premium.max_delay_secs,
            default_delay_secs: config.premium.default_delay_secs,
        }
    }

    /// Time to sleep between two full forwarding cycles.
    pub fn cycle_delay(&self, account: &Account, now: DateTime<Utc>) -> Duration {
        match Tier::of(account, now) {
            Tier::Free => Duration::from_secs(self.free_delay_secs),
            Tier::Premium => Duration::from_secs(account.delay_secs),
        }
    }

    /// Outgoing text for an ad; free accounts get the footer appended.
    pub fn compose(&self, text: &str, tier: Tier) -> String {
        match tier {
            Tier::Free => format!("{text}{}", self.footer),
            Tier::Premium => text.to_string(),
        }
    }

    /// The account's own delay if a premium account could use it, else the default.
    pub fn premium_start_delay(&self, account: &Account) -> u64 {
        if (self.min_delay_secs..=self.max_delay_secs).contains(&account.delay_secs) {
            account.delay_secs
        } else {
            self.default_delay_secs
        }
    }

    /// Check a requested custom delay against the tier rules.
    pub fn validate_delay(&self, tier: Tier, delay_secs: u64) -> Result<()> {
        if tier == Tier::Free {
            return Err(AdRelayError::PremiumRequired(format!(
                "custom delay is a premium feature; free accounts wait {}s",
                self.free_delay_secs
            )));
        }
        if !(self.min_delay_secs..=self.max_delay_secs).contains(&delay_secs) {
            return Err(AdRelayError::InvalidInput(format!(
                "delay must be between {} and {} seconds",
                self.min_delay_secs, self.max_delay_secs
            )));
        }
        Ok(())
    }
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self::from_config(&AdRelayConfig::default())
    }
}
