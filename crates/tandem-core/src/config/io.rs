//! Generic configuration I/O utilities
//!
//! YAML loading and saving for any serializable configuration type.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file
///
/// A missing file yields the default config. A file that exists but cannot be
/// read or parsed is logged and also yields the default config, so a broken
/// config never prevents playback.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    log::info!("load_config: Loading from {:?}", path);

    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("load_config: Failed to read config file: {}, using defaults", e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("load_config: Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: Failed to parse config: {}, using defaults", e);
            T::default()
        }
    }
}

/// Save configuration to a YAML file, creating parent directories as needed
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: StreamConfig = load_config(Path::new("/nonexistent/tandem/stream.yaml"));
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn test_load_garbage_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.yaml");
        std::fs::write(&path, "half_size: [not, a, number").unwrap();

        let config: StreamConfig = load_config(&path);
        assert_eq!(config, StreamConfig::default());
    }

    #[test]
    fn test_save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stream.yaml");

        let config = StreamConfig {
            half_size: 8192,
            frame_diagnostics: true,
            ..StreamConfig::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: StreamConfig = load_config(&path);

        assert_eq!(loaded.half_size, 8192);
        assert!(loaded.frame_diagnostics);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.yaml");
        std::fs::write(&path, "initial_volume: 90\n").unwrap();

        let loaded: StreamConfig = load_config(&path);
        assert_eq!(loaded.initial_volume, 90);
        assert_eq!(loaded.half_size, StreamConfig::default().half_size);
    }
}
