//! Persistent session configuration model and defaults.

use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Transport behavior.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Browse tree and library snapshot.
    pub library: LibraryConfig,
    #[serde(default)]
    /// Session executor and event bus.
    pub session: SessionConfig,
    #[serde(default)]
    /// Preference storage location.
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Skip-to-previous restarts the current item once playback passed this position.
    #[serde(default = "default_skip_previous_threshold_ms")]
    pub skip_previous_threshold_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LibraryConfig {
    /// Number of leaves listed under `playlists/recently-added`.
    #[serde(default = "default_recently_added_limit")]
    pub recently_added_limit: usize,
    /// JSON library snapshot loaded at startup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    /// Overrides the platform data directory location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences_db_path: Option<PathBuf>,
    /// Keep preferences in memory only; nothing survives a restart.
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    pub fn level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(self.level.trim()).unwrap_or(LevelFilter::Info)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_previous_threshold_ms: default_skip_previous_threshold_ms(),
        }
    }
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            recently_added_limit: default_recently_added_limit(),
            snapshot_path: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_skip_previous_threshold_ms() -> u64 {
    3_000
}

fn default_recently_added_limit() -> usize {
    50
}

fn default_event_bus_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Clamps values that would make the session misbehave.
pub fn sanitize_config(config: Config) -> Config {
    let clamped_threshold = config.playback.skip_previous_threshold_ms.min(60_000);
    let clamped_recently_added = config.library.recently_added_limit.clamp(1, 1_000);
    let clamped_bus_capacity = config.session.event_bus_capacity.clamp(16, 65_536);
    let level = match LevelFilter::from_str(config.logging.level.trim()) {
        Ok(level) => level.to_string().to_ascii_lowercase(),
        Err(_) => default_log_level(),
    };

    Config {
        playback: PlaybackConfig {
            skip_previous_threshold_ms: clamped_threshold,
        },
        library: LibraryConfig {
            recently_added_limit: clamped_recently_added,
            snapshot_path: config.library.snapshot_path,
        },
        session: SessionConfig {
            event_bus_capacity: clamped_bus_capacity,
        },
        storage: config.storage,
        logging: LoggingConfig { level },
    }
}
