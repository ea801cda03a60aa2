/// Centralized error types for siva-indexer using thiserror
///
/// Provides domain-specific error types so callers can tell transient backend
/// trouble, cancelled copies and bad repository data apart.
use thiserror::Error;

/// Main error type for the indexer
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Repository data error: {0}")]
    Repository(#[from] RepositoryDataError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Indexing was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by a storage backend or by the copier on top of it
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Recoverable store condition; the cached client has been discarded
    #[error("HDFS namenode error: {0}")]
    Transient(String),

    #[error("IO error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Object store error: {0}")]
    Store(String),

    #[error("Invalid backend target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("copy was cancelled")]
    Cancelled,
}

/// Errors related to rooted repository transactions
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Failed to fetch '{blob}': {source}")]
    Fetch {
        blob: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to store '{blob}': {source}")]
    Store {
        blob: String,
        #[source]
        source: BackendError,
    },

    #[error("Failed to prepare staging directory '{path}': {source}")]
    Staging {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to open repository store: {0}")]
    Repository(String),

    #[error("Transaction task failed: {0}")]
    TaskFailed(String),
}

/// Errors related to reading or writing siva archives
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive is truncated: {0}")]
    Truncated(String),

    #[error("Invalid index signature")]
    InvalidSignature,

    #[error("Unsupported index version: {0}")]
    UnsupportedVersion(u8),

    #[error("Index checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid entry name: {0}")]
    InvalidEntryName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors about the repositories being indexed, not the infrastructure
#[derive(Error, Debug)]
pub enum RepositoryDataError {
    #[error("Repository {0} has no HEAD reference")]
    NoHead(String),

    #[error("Unable to guess the repository from config for repo: {0}")]
    UnresolvedIdentity(String),

    #[error("Invalid root hash: {0}")]
    InvalidRootHash(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

// Conversion from anyhow::Error to IndexerError
impl From<anyhow::Error> for IndexerError {
    fn from(err: anyhow::Error) -> Self {
        IndexerError::Other(format!("{:#}", err))
    }
}

impl BackendError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return BackendError::NotFound(path.into());
        }
        BackendError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }
}

impl TransactionError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            TransactionError::Fetch { source, .. } | TransactionError::Store { source, .. } => {
                source.is_cancelled()
            }
            _ => false,
        }
    }

    fn backend(&self) -> Option<&BackendError> {
        match self {
            TransactionError::Fetch { source, .. } | TransactionError::Store { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

// Helper methods for IndexerError
impl IndexerError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        IndexerError::Other(msg.into())
    }

    /// True when the error comes from an external cancellation signal
    pub fn is_cancelled(&self) -> bool {
        match self {
            IndexerError::Cancelled => true,
            IndexerError::Backend(e) => e.is_cancelled(),
            IndexerError::Transaction(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is retryable at a higher level
    pub fn is_retryable(&self) -> bool {
        let backend = match self {
            IndexerError::Backend(e) => Some(e),
            IndexerError::Transaction(e) => e.backend(),
            _ => None,
        };
        matches!(backend, Some(BackendError::Transient(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexerError::Repository(RepositoryDataError::NoHead("42".to_string()));
        assert_eq!(
            err.to_string(),
            "Repository data error: Repository 42 has no HEAD reference"
        );
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = BackendError::io("a/b.siva", io_err);
        assert!(err.is_not_found());

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = BackendError::io("a/b.siva", io_err);
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("a/b.siva"));
    }

    #[test]
    fn test_error_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("test error");
        let err: IndexerError = anyhow_err.into();
        assert!(matches!(err, IndexerError::Other(_)));
    }

    #[test]
    fn test_is_cancelled_through_transaction() {
        let err: IndexerError = TransactionError::Fetch {
            blob: "x.siva".to_string(),
            source: BackendError::Cancelled,
        }
        .into();
        assert!(err.is_cancelled());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_is_retryable() {
        let retryable: IndexerError = TransactionError::Store {
            blob: "x.siva".to_string(),
            source: BackendError::Transient("no available namenodes".to_string()),
        }
        .into();
        assert!(retryable.is_retryable());

        let not_retryable = IndexerError::Backend(BackendError::NotFound("x".to_string()));
        assert!(!not_retryable.is_retryable());
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            key: "indexing.workers".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'indexing.workers': must be greater than 0"
        );
    }

    #[test]
    fn test_copy_cancelled_message() {
        assert_eq!(BackendError::Cancelled.to_string(), "copy was cancelled");
    }
}
