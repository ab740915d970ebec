//! Arena configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// A selectable move time.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct MoveTimeOption {
    /// Label shown to players.
    name: String,
    /// Seconds a player has to move.
    seconds: i64,
}

impl MoveTimeOption {
    /// Creates a move time option.
    pub fn new(name: impl Into<String>, seconds: i64) -> Self {
        Self {
            name: name.into(),
            seconds,
        }
    }
}

/// Configuration for the arena service.
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// SQLite database path.
    #[serde(default = "default_database_path")]
    database_path: String,

    /// Board columns.
    #[serde(default = "default_board_width")]
    board_width: usize,

    /// Board rows.
    #[serde(default = "default_board_height")]
    board_height: usize,

    /// Smallest accepted wager.
    #[serde(default = "default_min_wager")]
    min_wager: i64,

    /// Move times a challenger may pick from.
    #[serde(default = "default_move_times")]
    move_times: Vec<MoveTimeOption>,

    /// Seconds a pending invitation stays acceptable.
    #[serde(default = "default_invitation_ttl_secs")]
    invitation_ttl_secs: i64,

    /// Seconds between background clock sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
}

fn default_database_path() -> String {
    "strictly_arena.db".to_string()
}

fn default_board_width() -> usize {
    strictly_connect4::DEFAULT_WIDTH
}

fn default_board_height() -> usize {
    strictly_connect4::DEFAULT_HEIGHT
}

fn default_min_wager() -> i64 {
    1_000
}

fn default_move_times() -> Vec<MoveTimeOption> {
    vec![
        MoveTimeOption::new("30 seconds", 30),
        MoveTimeOption::new("1 minute", 60),
        MoveTimeOption::new("2 minutes", 120),
        MoveTimeOption::new("5 minutes", 300),
        MoveTimeOption::new("10 minutes", 600),
    ]
}

fn default_invitation_ttl_secs() -> i64 {
    15 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            board_width: default_board_width(),
            board_height: default_board_height(),
            min_wager: default_min_wager(),
            move_times: default_move_times(),
            invitation_ttl_secs: default_invitation_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ArenaConfig {
    /// Default configuration backed by the database at `database_path`.
    #[instrument]
    pub fn with_database(database_path: &str) -> Self {
        Self {
            database_path: database_path.to_string(),
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(database = %config.database_path, "Config loaded successfully");
        Ok(config)
    }

    /// Overrides the database path.
    pub fn set_database_path(&mut self, database_path: String) {
        self.database_path = database_path;
    }

    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first problem found.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let side = 1..=strictly_connect4::MAX_DIMENSION;
        if !side.contains(&self.board_width) || !side.contains(&self.board_height) {
            return Err(ConfigError::new(format!(
                "Board dimensions {}x{} are invalid",
                self.board_width, self.board_height
            )));
        }
        if self.min_wager <= 0 {
            return Err(ConfigError::new("min_wager must be positive".to_string()));
        }
        if self.move_times.is_empty() {
            return Err(ConfigError::new("At least one move time is required".to_string()));
        }
        if let Some(bad) = self.move_times.iter().find(|t| t.seconds <= 0) {
            return Err(ConfigError::new(format!(
                "Move time '{}' must be positive",
                bad.name
            )));
        }
        if self.invitation_ttl_secs <= 0 {
            return Err(ConfigError::new(
                "invitation_ttl_secs must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::new(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Looks up the move time option with exactly `seconds`.
    pub fn move_time(&self, seconds: i64) -> Option<&MoveTimeOption> {
        self.move_times.iter().find(|t| t.seconds == seconds)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_standard_board() {
        let config = ArenaConfig::default();
        assert_eq!(*config.board_width(), 7);
        assert_eq!(*config.board_height(), 6);
        assert_eq!(*config.min_wager(), 1_000);
        assert!(config.move_time(60).is_some());
        assert!(config.move_time(61).is_none());
    }

    #[test]
    fn test_partial_toml_takes_defaults() {
        let config = ArenaConfig::from_toml(
            r#"
            database_path = "arena.db"
            min_wager = 50

            [[move_times]]
            name = "15 seconds"
            seconds = 15
            "#,
        )
        .expect("Valid config");
        assert_eq!(config.database_path(), "arena.db");
        assert_eq!(*config.min_wager(), 50);
        assert_eq!(config.move_times().len(), 1);
        assert_eq!(*config.invitation_ttl_secs(), 900);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ArenaConfig::from_toml("board_width = 0").is_err());
        assert!(ArenaConfig::from_toml("min_wager = -5").is_err());
        assert!(ArenaConfig::from_toml("move_times = []").is_err());
        assert!(ArenaConfig::from_toml("sweep_interval_secs = 0").is_err());
        assert!(ArenaConfig::from_toml("board_height = 100000").is_err());
        assert!(ArenaConfig::from_toml("sweep_interval_secs = 1").is_ok());
    }
}
