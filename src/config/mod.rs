/// Configuration system for siva-indexer
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, IndexerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Widest bucket prefix allowed: a whole root hash
pub const MAX_BUCKET_SIZE: usize = 40;

const ENV_PREFIX: &str = "SIVA_INDEXER_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where root archives live and where they are staged
    #[serde(default)]
    pub storage: StorageConfig,

    /// What to index and where results go
    #[serde(default)]
    pub indexing: IndexingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Local directory or store URL (`file://`, `memory://`, ...)
    /// holding the `<root>.siva` archives
    #[serde(default = "default_root_repositories_target")]
    pub root_repositories_target: String,

    /// Remote base for temporary objects, defaults to the target's base
    #[serde(default)]
    pub remote_temp_dir: Option<String>,

    /// Local scratch directory for staged transactions
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Wipe `temp_dir` before starting
    #[serde(default)]
    pub clean_temp_dir: bool,

    /// Leading hash characters used as a directory prefix, 0 disables it
    #[serde(default)]
    pub bucket_size: usize,

    /// Remove the staging directory of a transaction that failed to begin
    #[serde(default = "default_true")]
    pub cleanup_failed_begin: bool,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Repositories processed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum repositories to process, 0 for all
    #[serde(default)]
    pub limit: usize,

    /// Repositories to skip first
    #[serde(default)]
    pub offset: usize,

    /// CSV file receiving the records
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// JSON lines file with one repository descriptor per line
    #[serde(default)]
    pub repositories_file: Option<PathBuf>,

    /// File with one repository URL per line; only those are processed
    #[serde(default)]
    pub repos_file: Option<PathBuf>,

    /// File with `owner/name stars` lines
    #[serde(default)]
    pub stars_file: Option<PathBuf>,

    /// Fill FORK_COUNT once every record is known
    #[serde(default)]
    pub count_forks: bool,
}

fn default_root_repositories_target() -> String {
    crate::paths::PlatformPaths::default_root_repositories_dir()
        .to_string_lossy()
        .into_owned()
}

fn default_temp_dir() -> PathBuf {
    crate::paths::PlatformPaths::default_temp_dir()
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_output() -> PathBuf {
    PathBuf::from("result.csv")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_repositories_target: default_root_repositories_target(),
            remote_temp_dir: None,
            temp_dir: default_temp_dir(),
            clean_temp_dir: false,
            bucket_size: 0,
            cleanup_failed_begin: true,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            limit: 0,
            offset: 0,
            output: default_output(),
            repositories_file: None,
            repos_file: None,
            stars_file: None,
            count_forks: false,
        }
    }
}

impl StorageConfig {
    /// Local directory the transactioner stages archives in
    pub fn transactioner_dir(&self) -> PathBuf {
        self.temp_dir.join("transactioner")
    }

    /// Local directory HEAD trees are checked out in
    pub fn checkout_dir(&self) -> PathBuf {
        self.temp_dir.join("checkout")
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IndexerError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or use defaults
    pub fn load_or_default() -> Result<Self, IndexerError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::debug!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), IndexerError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.storage.root_repositories_target.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "storage.root_repositories_target".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.storage.bucket_size > MAX_BUCKET_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "storage.bucket_size".to_string(),
                reason: format!(
                    "must be at most {}, got {}",
                    MAX_BUCKET_SIZE, self.storage.bucket_size
                ),
            }
            .into());
        }

        if self.indexing.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.workers".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// Apply `SIVA_INDEXER_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok());
    }

    /// Apply overrides from `lookup`, keyed by variable name without prefix.
    /// Unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(target) = lookup("ROOT_REPOSITORIES") {
            self.storage.root_repositories_target = target;
        }

        if let Some(dir) = lookup("REMOTE_TEMP_DIR") {
            self.storage.remote_temp_dir = Some(dir);
        }

        if let Some(dir) = lookup("TEMP_DIR") {
            self.storage.temp_dir = PathBuf::from(dir);
        }

        if let Some(clean) = lookup("CLEAN_TEMP_DIR")
            && let Ok(clean) = clean.parse()
        {
            self.storage.clean_temp_dir = clean;
        }

        if let Some(size) = lookup("BUCKET_SIZE")
            && let Ok(size) = size.parse()
        {
            self.storage.bucket_size = size;
        }

        if let Some(workers) = lookup("WORKERS")
            && let Ok(workers) = workers.parse()
        {
            self.indexing.workers = workers;
        }

        if let Some(path) = lookup("REPOSITORIES_FILE") {
            self.indexing.repositories_file = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("STARS_FILE") {
            self.indexing.stars_file = Some(PathBuf::from(path));
        }
    }

    /// Create a new Config with defaults, file and environment overrides
    pub fn new() -> Result<Self, IndexerError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
