use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::parser::Rank;

/// Bot configuration loaded from YAML file
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub rules: RuleConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Admin user allowed to run commands (overridden by ADMIN_ID)
    #[serde(default)]
    pub admin_id: i64,
    /// Long-poll timeout for getUpdates (seconds)
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// API request timeout (ms)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_poll_timeout() -> u64 { 30 }
fn default_request_timeout() -> u64 { 10_000 }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            admin_id: 0,
            poll_timeout_secs: 30,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelConfig {
    /// Channel whose result stream is watched
    #[serde(default)]
    pub stat_channel: Option<i64>,
    /// Channel predictions are broadcast to
    #[serde(default)]
    pub display_channel: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Rank symbol the trigger rule watches for
    #[serde(default = "default_watched_rank")]
    pub watched_rank: String,
    /// Minimum seconds between triggered predictions
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u32,
    /// Minutes after startup before trigger evaluation begins
    #[serde(default = "default_prediction_interval")]
    pub prediction_interval_minutes: u32,
}

fn default_watched_rank() -> String { "J".to_string() }
fn default_cooldown_seconds() -> u32 { 5 }
fn default_prediction_interval() -> u32 { 1 }

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            watched_rank: default_watched_rank(),
            cooldown_seconds: default_cooldown_seconds(),
            prediction_interval_minutes: default_prediction_interval(),
        }
    }
}

impl RuleConfig {
    /// Watched rank as a typed value; unknown symbols fall back to Jack
    pub fn watched_rank(&self) -> Rank {
        match Rank::from_symbol(self.watched_rank.trim()) {
            Some(rank) => rank,
            None => {
                warn!(
                    symbol = %self.watched_rank,
                    "unknown watched rank symbol, falling back to J"
                );
                Rank::Jack
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Number of scheduled predictions generated per day
    #[serde(default = "default_slots_per_day")]
    pub slots_per_day: u32,
    /// First launch hour of the day (0-23)
    #[serde(default = "default_start_hour")]
    pub start_hour: u32,
    /// Hour after which no slot launches (exclusive)
    #[serde(default = "default_end_hour")]
    pub end_hour: u32,
    /// Game number assigned to the first generated slot
    #[serde(default = "default_first_game_number")]
    pub first_game_number: u32,
    /// Game-number distance between consecutive slots
    #[serde(default = "default_game_number_step")]
    pub game_number_step: u32,
    /// Scheduler tick period (seconds)
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// Start the scheduler automatically when channels are configured
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

fn default_slots_per_day() -> u32 { 16 }
fn default_start_hour() -> u32 { 8 }
fn default_end_hour() -> u32 { 23 }
fn default_first_game_number() -> u32 { 5 }
fn default_game_number_step() -> u32 { 5 }
fn default_tick_seconds() -> u64 { 5 }
fn default_true() -> bool { true }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slots_per_day: default_slots_per_day(),
            start_hour: default_start_hour(),
            end_hour: default_end_hour(),
            first_game_number: default_first_game_number(),
            game_number_step: default_game_number_step(),
            tick_seconds: default_tick_seconds(),
            auto_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Monitoring server port (overridden by PORT)
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 { 10_000 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the YAML persistence files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String { "data".to_string() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String { "info".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl BotConfig {
    /// Load configuration from YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: BotConfig =
            serde_yaml::from_str(&contents).context("Failed to parse YAML configuration")?;

        Ok(config)
    }

    /// Load with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment variable overrides to an already-built config
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("ADMIN_ID") {
            self.telegram.admin_id = val.parse().unwrap_or(self.telegram.admin_id);
        }
        if let Ok(val) = std::env::var("PORT") {
            self.server.port = val.parse().unwrap_or(self.server.port);
        }
        if let Ok(val) = std::env::var("STAT_CHANNEL") {
            self.channels.stat_channel = val.parse().ok().or(self.channels.stat_channel);
        }
        if let Ok(val) = std::env::var("DISPLAY_CHANNEL") {
            self.channels.display_channel = val.parse().ok().or(self.channels.display_channel);
        }
        if let Ok(val) = std::env::var("COOLDOWN_INTERVAL") {
            self.rules.cooldown_seconds = val.parse().unwrap_or(self.rules.cooldown_seconds);
        }
        if let Ok(val) = std::env::var("PREDICTION_INTERVAL") {
            self.rules.prediction_interval_minutes =
                val.parse().unwrap_or(self.rules.prediction_interval_minutes);
        }
        if let Ok(val) = std::env::var("DATA_DIR") {
            self.storage.data_dir = val;
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            channels: ChannelConfig::default(),
            rules: RuleConfig::default(),
            schedule: ScheduleConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = BotConfig::default();
        assert_eq!(config.rules.cooldown_seconds, 5);
        assert_eq!(config.rules.watched_rank(), Rank::Jack);
        assert_eq!(config.schedule.slots_per_day, 16);
        assert_eq!(config.server.port, 10_000);
        assert!(config.channels.stat_channel.is_none());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
channels:
  stat_channel: -1001111
rules:
  cooldown_seconds: 60
"#;
        let config: BotConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.channels.stat_channel, Some(-1001111));
        assert!(config.channels.display_channel.is_none());
        assert_eq!(config.rules.cooldown_seconds, 60);
        assert_eq!(config.rules.watched_rank(), Rank::Jack);
        assert_eq!(config.schedule.tick_seconds, 5);
    }

    #[test]
    fn unknown_watched_rank_falls_back() {
        let rules = RuleConfig {
            watched_rank: "Z".to_string(),
            ..RuleConfig::default()
        };
        assert_eq!(rules.watched_rank(), Rank::Jack);
    }
}
