//! Engine configuration loading from config.toml
//!
//! All settings have defaults, so an absent file or an empty `[engine]` table
//! yields a working engine. Entity profiles describe, per entity type, which
//! statuses count as still open and which column holds the reference date.

use crate::entities::EntityType;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "REMINDER_CONFIG";

/// Largest accepted `anti_spam_hours` (one year)
pub const MAX_ANTI_SPAM_HOURS: i64 = 24 * 365;
/// Largest accepted `retention_days` (ten years)
pub const MAX_RETENTION_DAYS: i64 = 3650;
/// Largest accepted `tick_lock_lease_minutes` (one day)
pub const MAX_LEASE_MINUTES: i64 = 24 * 60;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Scheduling and anti-spam settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Open-status / reference-date table per entity type
    #[serde(default)]
    pub profiles: EntityProfiles,
}

/// Tunables for the reminder engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Anti-spam window in hours
    pub anti_spam_hours: i64,
    /// Maximum candidates returned per scan
    pub page_size: u64,
    /// Ledger rows older than this many days are purged
    pub retention_days: i64,
    /// Minutes between scheduled ticks
    pub tick_interval_minutes: u64,
    /// Candidates processed concurrently within one rule
    pub candidate_concurrency: usize,
    /// Lease length of the cross-instance tick lock
    pub tick_lock_lease_minutes: i64,
    /// Name of the cross-instance tick lock
    pub lock_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Just under a day so a daily cron never drifts past the window
            anti_spam_hours: 23,
            page_size: 100,
            retention_days: 90,
            tick_interval_minutes: 5,
            candidate_concurrency: 4,
            tick_lock_lease_minutes: 10,
            lock_key: "reminder-engine".to_string(),
        }
    }
}

/// Scanner knowledge about one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityProfile {
    /// Statuses for which a reminder is still relevant
    pub open_statuses: Vec<String>,
    /// Column holding the date the trigger window is measured against
    pub reference_date_field: String,
}

impl EntityProfile {
    fn new(open_statuses: &[&str], reference_date_field: &str) -> Self {
        Self {
            open_statuses: open_statuses.iter().map(ToString::to_string).collect(),
            reference_date_field: reference_date_field.to_string(),
        }
    }

    fn default_task() -> Self {
        Self::new(&["todo", "in_progress"], "due_date")
    }

    fn default_quote() -> Self {
        Self::new(&["draft", "sent"], "valid_until")
    }

    fn default_invoice() -> Self {
        Self::new(&["sent", "overdue"], "due_date")
    }
}

/// Lookup table `entity type -> profile`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityProfiles {
    /// Task profile
    #[serde(default = "EntityProfile::default_task")]
    pub task: EntityProfile,
    /// Quote profile
    #[serde(default = "EntityProfile::default_quote")]
    pub quote: EntityProfile,
    /// Invoice profile
    #[serde(default = "EntityProfile::default_invoice")]
    pub invoice: EntityProfile,
}

impl Default for EntityProfiles {
    fn default() -> Self {
        Self {
            task: EntityProfile::default_task(),
            quote: EntityProfile::default_quote(),
            invoice: EntityProfile::default_invoice(),
        }
    }
}

impl EntityProfiles {
    /// Returns the profile for an entity type.
    #[must_use]
    pub const fn get(&self, entity_type: EntityType) -> &EntityProfile {
        match entity_type {
            EntityType::Task => &self.task,
            EntityType::Quote => &self.quote,
            EntityType::Invoice => &self.invoice,
        }
    }
}

/// Parses configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    let engine = &config.engine;
    if !(1..=MAX_ANTI_SPAM_HOURS).contains(&engine.anti_spam_hours) {
        return Err(Error::Config {
            message: format!("engine.anti_spam_hours must be between 1 and {MAX_ANTI_SPAM_HOURS}"),
        });
    }
    if engine.page_size == 0 {
        return Err(Error::Config {
            message: "engine.page_size must be positive".to_string(),
        });
    }
    if engine.tick_interval_minutes == 0 {
        return Err(Error::Config {
            message: "engine.tick_interval_minutes must be positive".to_string(),
        });
    }
    if !(1..=MAX_RETENTION_DAYS).contains(&engine.retention_days) {
        return Err(Error::Config {
            message: format!("engine.retention_days must be between 1 and {MAX_RETENTION_DAYS}"),
        });
    }
    if !(1..=MAX_LEASE_MINUTES).contains(&engine.tick_lock_lease_minutes) {
        return Err(Error::Config {
            message: format!(
                "engine.tick_lock_lease_minutes must be between 1 and {MAX_LEASE_MINUTES}"
            ),
        });
    }
    if engine.candidate_concurrency == 0 {
        return Err(Error::Config {
            message: "engine.candidate_concurrency must be positive".to_string(),
        });
    }
    Ok(())
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A numeric setting is out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads configuration from `$REMINDER_CONFIG` or `./config.toml`, falling back
/// to defaults when the file does not exist.
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    if !Path::new(&path).exists() {
        tracing::info!(path = %path, "No config file found, using engine defaults");
        return Ok(AppConfig::default());
    }
    tracing::debug!(path = %path, "Loading engine configuration");
    load_config(path)
}
