//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/wikisocial/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/wikisocial/` (~/.config/wikisocial/)
//! - Data: `$XDG_DATA_HOME/wikisocial/` (~/.local/share/wikisocial/)
//! - State/Logs: `$XDG_STATE_HOME/wikisocial/` (~/.local/state/wikisocial/)
//!
//! Every knob the profile subsystem reads lives here and is passed to
//! components at construction. Nothing reads ambient global state.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Feed aggregation configuration
    #[serde(default)]
    pub feed: FeedConfig,

    /// Relationship list / cache configuration
    #[serde(default)]
    pub relationships: RelationshipConfig,

    /// Which profile sections are assembled at all
    #[serde(default)]
    pub sections: SectionToggles,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feed aggregation configuration
///
/// `hard_cap` and `display_limit` are two independent cutoffs applied at
/// two different pipeline stages: the hard cap bounds how many sorted
/// events the aggregator keeps at all, the display limit bounds the
/// visible window handed to the presenter.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Visible window size for the profile activity section
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,

    /// Absolute cap on sorted events kept per feed build
    #[serde(default = "default_hard_cap")]
    pub hard_cap: usize,

    /// Max actors resolved for a network-scoped feed
    #[serde(default = "default_network_fanout")]
    pub network_fanout: usize,

    /// Visible window size for the message board section
    #[serde(default = "default_board_preview")]
    pub board_preview: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
            hard_cap: default_hard_cap(),
            network_fanout: default_network_fanout(),
            board_preview: default_board_preview(),
        }
    }
}

fn default_display_limit() -> usize {
    8
}

fn default_hard_cap() -> usize {
    40
}

fn default_network_fanout() -> usize {
    50
}

fn default_board_preview() -> usize {
    10
}

/// Relationship list configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RelationshipConfig {
    /// How many relationships a profile preview shows per type
    #[serde(default = "default_preview_count")]
    pub preview_count: usize,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            preview_count: default_preview_count(),
        }
    }
}

fn default_preview_count() -> usize {
    4
}

/// Which profile sections the assembler builds.
///
/// All sections default to enabled. A disabled section is skipped
/// entirely and reported as such, never rendered empty by accident.
#[derive(Debug, Deserialize, Clone)]
pub struct SectionToggles {
    #[serde(default = "default_true")]
    pub personal: bool,
    #[serde(default = "default_true")]
    pub interests: bool,
    #[serde(default = "default_true")]
    pub stats: bool,
    #[serde(default = "default_true")]
    pub friends: bool,
    #[serde(default = "default_true")]
    pub foes: bool,
    #[serde(default = "default_true")]
    pub activity: bool,
    #[serde(default = "default_true")]
    pub board: bool,
}

impl Default for SectionToggles {
    fn default() -> Self {
        Self {
            personal: true,
            interests: true,
            stats: true,
            friends: true,
            foes: true,
            activity: true,
            board: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning an error message if invalid.
    ///
    /// Limits are rejected here rather than clamped later; silent
    /// clamping is how the display window bugs crept in originally.
    pub fn validate(&self) -> Result<()> {
        if self.feed.display_limit == 0 {
            return Err(Error::Config(
                "feed.display_limit must be greater than zero".to_string(),
            ));
        }
        if self.feed.hard_cap == 0 {
            return Err(Error::Config(
                "feed.hard_cap must be greater than zero".to_string(),
            ));
        }
        if self.feed.display_limit > self.feed.hard_cap {
            return Err(Error::Config(format!(
                "feed.display_limit ({}) cannot exceed feed.hard_cap ({})",
                self.feed.display_limit, self.feed.hard_cap
            )));
        }
        if self.feed.network_fanout == 0 {
            return Err(Error::Config(
                "feed.network_fanout must be greater than zero".to_string(),
            ));
        }
        if self.feed.board_preview == 0 {
            return Err(Error::Config(
                "feed.board_preview must be greater than zero".to_string(),
            ));
        }
        if self.relationships.preview_count == 0 {
            return Err(Error::Config(
                "relationships.preview_count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/wikisocial/config.toml` (~/.config/wikisocial/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("wikisocial").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/wikisocial/` (~/.local/share/wikisocial/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("wikisocial")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/wikisocial/` (~/.local/state/wikisocial/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("wikisocial")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/wikisocial/data.db` (~/.local/share/wikisocial/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/wikisocial/wikisocial.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("wikisocial.log")
    }
}
