//! Error types for the export registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Error variants for export id allocation and ledger mutation.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Wraps standard I/O errors from reading or writing the ledger.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Every id in the export id range is allocated or reserved.
    #[error("Export id pool exhausted: no free export ids available")]
    PoolExhausted,

    /// The id lookup pattern does not have exactly one capture group.
    #[error("Invalid export id pattern {pattern}: expected exactly one capture group")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
    },

    /// The pattern could not be compiled.
    #[error("Export id pattern failed to compile: {0}")]
    PatternError(#[from] regex::Error),

    /// No export stanza with the given id exists in the ledger.
    #[error("Export not found: id {id}")]
    ExportNotFound {
        /// The export id that was not found.
        id: u16,
    },

    /// The ledger references the export id, but not with the expected block.
    #[error("Export {id} exists in the ledger with different content")]
    StanzaMismatch {
        /// The export id whose block did not match.
        id: u16,
    },

    /// The export path cannot be written as a single `Path` declaration.
    #[error("Invalid export path {path:?}")]
    InvalidExportPath {
        /// The rejected path.
        path: String,
    },

    /// The configured maximum number of exports is already in use.
    #[error("Export limit reached: {limit} exports already allocated")]
    ExportLimitReached {
        /// The configured limit.
        limit: usize,
    },

    /// A thread panicked while holding the registry lock.
    #[error("Registry lock poisoned")]
    LockPoisoned,
}

impl RegistryError {
    /// Returns true if the error is caused by running out of export capacity
    /// rather than by a failure of the ledger itself.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            RegistryError::PoolExhausted | RegistryError::ExportLimitReached { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausted_display() {
        let err = RegistryError::PoolExhausted;
        assert_eq!(
            err.to_string(),
            "Export id pool exhausted: no free export ids available"
        );
        assert!(err.is_capacity());
    }

    #[test]
    fn test_invalid_pattern_display() {
        let err = RegistryError::InvalidPattern {
            pattern: "Export_Id".to_string(),
        };
        assert!(err.to_string().contains("Export_Id"));
        assert!(!err.is_capacity());
    }

    #[test]
    fn test_export_not_found_display() {
        let err = RegistryError::ExportNotFound { id: 42 };
        assert_eq!(err.to_string(), "Export not found: id 42");
    }

    #[test]
    fn test_limit_reached_is_capacity() {
        let err = RegistryError::ExportLimitReached { limit: 3 };
        assert!(err.is_capacity());
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_invalid_export_path_display() {
        let err = RegistryError::InvalidExportPath {
            path: "/export/a\nb".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid export path \"/export/a\\nb\"");
        assert!(!err.is_capacity());
    }

    #[test]
    fn test_io_error_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RegistryError = io.into();
        assert!(matches!(err, RegistryError::IoError(_)));
        assert!(err.to_string().starts_with("I/O error"));
    }
}
