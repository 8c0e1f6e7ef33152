//! AdRelay configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AdRelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdRelayConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub free: FreeTierConfig,
    #[serde(default)]
    pub premium: PremiumTierConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
}

impl AdRelayConfig {
    /// Load config from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            tracing::warn!("Config {} not found, using defaults", path.display());
            Ok(Self::default().with_env_overrides())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AdRelayError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parse a TOML document, then apply environment overrides.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AdRelayError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config.with_env_overrides())
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AdRelayError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `ADRELAY_BOT_TOKEN` and `ADRELAY_OWNER_ID` win over the file.
    fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("ADRELAY_BOT_TOKEN")
            && !token.is_empty()
        {
            self.bot.token = token;
        }
        if let Ok(owner) = std::env::var("ADRELAY_OWNER_ID")
            && let Ok(id) = owner.parse()
        {
            self.bot.owner_id = id;
        }
        self
    }

    /// Check the values the bot cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.bot.token.is_empty() {
            return Err(AdRelayError::Config(
                "bot.token is empty (set it in config.toml or ADRELAY_BOT_TOKEN)".into(),
            ));
        }
        if self.premium.min_delay_secs > self.premium.max_delay_secs {
            return Err(AdRelayError::Config(format!(
                "premium.min_delay_secs ({}) exceeds premium.max_delay_secs ({})",
                self.premium.min_delay_secs, self.premium.max_delay_secs
            )));
        }
        if !(self.premium.min_delay_secs..=self.premium.max_delay_secs)
            .contains(&self.premium.default_delay_secs)
        {
            return Err(AdRelayError::Config(
                "premium.default_delay_secs must lie within the premium delay bounds".into(),
            ));
        }
        Ok(())
    }

    /// The forced footer with `{bot}` replaced by the bot username.
    pub fn footer(&self) -> String {
        self.free.footer.replace("{bot}", &self.bot.username)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the AdRelay home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".adrelay")
    }
}

/// Command bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    /// Username without `@`, used in the forced footer.
    #[serde(default = "default_bot_username")]
    pub username: String,
    /// Operator allowed to run admin commands.
    #[serde(default)]
    pub owner_id: i64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn default_bot_username() -> String { "AdRelayBot".into() }
fn default_poll_interval() -> u64 { 1 }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            username: default_bot_username(),
            owner_id: 0,
            poll_interval: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.adrelay/adrelay.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

impl DatabaseConfig {
    /// Database path with `~` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Free tier: fixed cycle delay and forced branding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreeTierConfig {
    #[serde(default = "default_free_delay")]
    pub delay_secs: u64,
    /// Appended to every free-tier ad. `{bot}` expands to the bot username.
    #[serde(default = "default_footer")]
    pub footer: String,
}

fn default_free_delay() -> u64 { 300 }
fn default_footer() -> String { "\n\n🤖 Sent via @{bot}".into() }

impl Default for FreeTierConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_free_delay(),
            footer: default_footer(),
        }
    }
}

/// Premium tier: custom cycle delay within bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremiumTierConfig {
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    #[serde(default = "default_free_delay")]
    pub default_delay_secs: u64,
}

fn default_min_delay() -> u64 { 10 }
fn default_max_delay() -> u64 { 600 }

impl Default for PremiumTierConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            default_delay_secs: default_free_delay(),
        }
    }
}

/// Timing of the forwarding loop and its side schedulers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingConfig {
    /// Pause between two destinations after a successful send.
    #[serde(default = "default_destination_gap")]
    pub destination_gap_secs: u64,
    /// Wait when an account has no ad or no destinations yet.
    #[serde(default = "default_idle_retry")]
    pub idle_retry_secs: u64,
    /// Wait after an unexpected error in a loop iteration.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
    /// Pause between sends of an operator broadcast.
    #[serde(default = "default_broadcast_gap")]
    pub broadcast_gap_secs: u64,
    #[serde(default = "default_campaign_check")]
    pub campaign_check_secs: u64,
}

fn default_destination_gap() -> u64 { 2 }
fn default_idle_retry() -> u64 { 300 }
fn default_error_backoff() -> u64 { 60 }
fn default_broadcast_gap() -> u64 { 3 }
fn default_campaign_check() -> u64 { 30 }

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            destination_gap_secs: default_destination_gap(),
            idle_retry_secs: default_idle_retry(),
            error_backoff_secs: default_error_backoff(),
            broadcast_gap_secs: default_broadcast_gap(),
            campaign_check_secs: default_campaign_check(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: AdRelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.free.delay_secs, 300);
        assert_eq!(config.premium.min_delay_secs, 10);
        assert_eq!(config.premium.max_delay_secs, 600);
        assert_eq!(config.forwarding.destination_gap_secs, 2);
        assert_eq!(config.forwarding.idle_retry_secs, 300);
        assert_eq!(config.forwarding.error_backoff_secs, 60);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: AdRelayConfig = toml::from_str(
            r#"
            [bot]
            token = "123:abc"
            username = "PromoBot"
            owner_id = 42

            [forwarding]
            destination_gap_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.bot.owner_id, 42);
        assert_eq!(config.forwarding.destination_gap_secs, 5);
        assert_eq!(config.forwarding.broadcast_gap_secs, 3);
        assert_eq!(config.footer(), "\n\n🤖 Sent via @PromoBot");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_token_and_bad_bounds() {
        let config: AdRelayConfig = toml::from_str("").unwrap();
        assert!(config.validate().is_err());

        let mut config = config;
        config.bot.token = "t".into();
        config.premium.min_delay_secs = 700;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("adrelay-config-test");
        let path = dir.join("config.toml");
        let mut config = AdRelayConfig::default();
        config.bot.username = "SavedBot".into();
        config.save_to(&path).unwrap();

        let loaded = AdRelayConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.bot.username, "SavedBot");
        std::fs::remove_dir_all(&dir).ok();

        let missing = AdRelayConfig::load_or_default(&path).unwrap();
        assert_eq!(missing.bot.username, "AdRelayBot");
    }
}
