use std::path::{Path, PathBuf};

use log::{info, warn};
use toml_edit::{DocumentMut, Item, Table};

use crate::config::{sanitize_config, Config};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to parse config as TOML document: {0}")]
    Document(#[from] toml_edit::TomlError),
}

/// `<config dir>/playsession/config.toml`, when the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("playsession").join("config.toml"))
}

pub fn system_config_template_text() -> &'static str {
    include_str!("../config/config.system.toml")
}

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn merge_table_with_targeted_updates(destination: &mut Table, source: &Table) {
    for (key, source_item) in source.iter() {
        match source_item {
            Item::Table(source_table) => {
                if !destination.get(key).is_some_and(Item::is_table) {
                    destination.insert(key, Item::Table(Table::new()));
                }
                if let Some(destination_table) = destination.get_mut(key).and_then(Item::as_table_mut)
                {
                    merge_table_with_targeted_updates(destination_table, source_table);
                }
            }
            _ => {
                let unchanged = destination
                    .get(key)
                    .and_then(Item::as_value)
                    .zip(source_item.as_value())
                    .is_some_and(|(current, next)| current.to_string().trim() == next.to_string().trim());
                if !unchanged {
                    set_table_value_preserving_decor(destination, key, source_item.clone());
                }
            }
        }
    }
}

/// Rewrites `existing_text` with the values of `config`, keeping comments and layout.
pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, ConfigError> {
    let next_document = toml::to_string(config)?.parse::<DocumentMut>()?;
    let mut document = existing_text.parse::<DocumentMut>()?;
    merge_table_with_targeted_updates(document.as_table_mut(), next_document.as_table());
    Ok(document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, system_config_template_text())?;
    Ok(())
}

pub fn parse_config(text: &str) -> Result<Config, ConfigError> {
    Ok(sanitize_config(toml::from_str::<Config>(text)?))
}

/// Loads `path`, writing the default template first when it does not exist.
/// Unreadable or unparseable files fall back to defaults.
pub fn load_or_create_config(path: &Path) -> Config {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Err(err) = write_default_config(path) {
            warn!(
                "Failed to write default config to {}: {}",
                path.display(),
                err
            );
        }
        return Config::default();
    }

    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match parse_config(&config_content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_created_from_template() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("playsession").join("config.toml");

        let config = load_or_create_config(&path);

        assert_eq!(config, Config::default());
        let written = std::fs::read_to_string(&path).expect("config written");
        assert_eq!(written, system_config_template_text());
    }

    #[test]
    fn test_unparseable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[playback\nskip_previous_threshold_ms = ").expect("write");

        assert_eq!(load_or_create_config(&path), Config::default());
        assert!(matches!(
            parse_config("[playback]\nskip_previous_threshold_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_loaded_config_is_sanitized() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[library]\nrecently_added_limit = 0\n").expect("write");

        let config = load_or_create_config(&path);
        assert_eq!(config.library.recently_added_limit, 1);
    }

    #[test]
    fn test_serialize_preserves_comments_and_updates_values() {
        let mut config = Config::default();
        config.library.snapshot_path = Some(PathBuf::from("/srv/music/library.json"));
        config.playback.skip_previous_threshold_ms = 5_000;

        let updated =
            serialize_config_with_preserved_comments(system_config_template_text(), &config)
                .expect("template should merge");

        assert!(updated.contains("# Skip-to-previous restarts the current item"));
        assert!(updated.contains("skip_previous_threshold_ms = 5000"));
        assert!(updated.contains("snapshot_path = \"/srv/music/library.json\""));

        let reparsed: Config = toml::from_str(&updated).expect("merged config parses");
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_persist_config_file_round_trips_through_load() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        let _ = load_or_create_config(&path);

        let mut config = Config::default();
        config.storage.in_memory = true;
        persist_config_file(&config, &path);

        assert_eq!(load_or_create_config(&path), config);
    }
}
