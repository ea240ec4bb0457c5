//! Error types for the SafeWatch core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering alert storage, configuration, and the external detector.

use std::path::PathBuf;

/// Top-level error type for the SafeWatch core library.
#[derive(Debug, thiserror::Error)]
pub enum SafewatchError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the alert store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open alert database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored alert has malformed time '{value}'")]
    MalformedTime { value: String },

    #[error("Background task failed: {message}")]
    Task { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Duplicate class id {id} in class table")]
    DuplicateClass { id: u32 },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the external object detector.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Detection failed on frame {frame}: {message}")]
    Failed { frame: u64, message: String },

    #[error("Detector unavailable: {message}")]
    Unavailable { message: String },

    #[error("Malformed detection log at line {line}: {message}")]
    MalformedLog { line: usize, message: String },
}

/// A type alias for results using the top-level `SafewatchError`.
pub type Result<T> = std::result::Result<T, SafewatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_store() {
        let err = SafewatchError::Store(StoreError::MalformedTime {
            value: "yesterday".into(),
        });
        assert_eq!(
            err.to_string(),
            "Store error: Stored alert has malformed time 'yesterday'"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = SafewatchError::Config(ConfigError::DuplicateClass { id: 7 });
        assert_eq!(
            err.to_string(),
            "Configuration error: Duplicate class id 7 in class table"
        );
    }

    #[test]
    fn test_error_display_detector() {
        let err = SafewatchError::Detector(DetectorError::Failed {
            frame: 12,
            message: "inference timeout".into(),
        });
        assert_eq!(
            err.to_string(),
            "Detector error: Detection failed on frame 12: inference timeout"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SafewatchError = io_err.into();
        assert!(matches!(err, SafewatchError::Io(_)));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: SafewatchError = serde_err.into();
        assert!(matches!(err, SafewatchError::Serialization(_)));
    }

    #[test]
    fn test_store_error_from_rusqlite() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Database(_)));
        assert!(err.to_string().starts_with("Database error:"));
    }
}
