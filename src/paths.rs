/// Platform-specific default locations
///
/// Config lives in the platform config directory; staging data goes to the
/// system temp directory since it never outlives a run.
use std::path::PathBuf;

const PROJECT_DIR: &str = "siva-indexer";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Platform config directory
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Returns: {config_dir}/siva-indexer
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(PROJECT_DIR)
    }

    /// Returns: {config_dir}/siva-indexer/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }

    /// Local scratch directory for transactions and HEAD checkouts
    ///
    /// Returns: {temp_dir}/siva-indexer
    pub fn default_temp_dir() -> PathBuf {
        std::env::temp_dir().join(PROJECT_DIR)
    }

    /// Default remote target when none is configured
    ///
    /// Returns: {temp_dir}/root-repositories
    pub fn default_root_repositories_dir() -> PathBuf {
        std::env::temp_dir().join("root-repositories")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_not_empty() {
        assert!(!PlatformPaths::config_dir().as_os_str().is_empty());
    }

    #[test]
    fn test_default_config_path() {
        let path = PlatformPaths::default_config_path();
        assert!(path.ends_with("siva-indexer/config.toml"));
    }

    #[test]
    fn test_temp_dirs_live_under_system_temp() {
        let temp = std::env::temp_dir();
        assert!(PlatformPaths::default_temp_dir().starts_with(&temp));
        assert!(PlatformPaths::default_root_repositories_dir().starts_with(&temp));
    }
}
