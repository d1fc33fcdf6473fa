//! Path utilities for tandem configuration files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `<platform config dir>/tandem` (e.g. `~/.config/tandem` on Linux),
/// falling back to `./tandem` when the platform has no config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tandem")
}

/// Get the default config file path for a given file name
///
/// Returns: `<config dir>/tandem/{filename}`
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_tandem() {
        assert!(default_config_dir().ends_with("tandem"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("stream.yaml");
        assert!(path.ends_with("tandem/stream.yaml"));
    }
}
