use thiserror::Error;

use super::parser::{Config, LogFormat};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    /// Full check for running the bot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slack.token.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "slack.token cannot be empty".to_string(),
            ));
        }

        self.validate_offline()
    }

    /// Everything except Slack credentials, for commands that only touch
    /// the database.
    pub fn validate_offline(&self) -> Result<(), ConfigError> {
        if self.slack.api_base.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "slack.api_base cannot be empty".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.bot.leaderboard_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "bot.leaderboard_size must be at least 1".to_string(),
            ));
        }

        if self.bot.shutdown_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "bot.shutdown_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.slack.event_buffer == 0 {
            return Err(ConfigError::InvalidConfig(
                "slack.event_buffer must be at least 1".to_string(),
            ));
        }

        if self.logging.format.parse::<LogFormat>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "logging.format must be one of pretty, compact, json (got {})",
                self.logging.format
            )));
        }

        Ok(())
    }
}
