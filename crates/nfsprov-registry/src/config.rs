//! Export registry configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stanza::EXPORT_ID_PATTERN;

/// Default location of the Ganesha export config.
pub const DEFAULT_LEDGER_PATH: &str = "/export/vfs.conf";

/// Configuration for an [`ExportRegistry`](crate::registry::ExportRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Ganesha config file holding the export blocks.
    pub ledger_path: PathBuf,
    /// Pattern used to recover export ids from the ledger. Must contain
    /// exactly one capture group.
    pub id_pattern: String,
    /// Maximum number of live exports. `None` means unlimited.
    pub max_exports: Option<usize>,
}

impl RegistryConfig {
    /// Config for the given ledger with default pattern and no export limit.
    pub fn new(ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            ledger_path: ledger_path.into(),
            ..Self::default()
        }
    }

    /// Sets the export limit.
    pub fn with_max_exports(mut self, max_exports: usize) -> Self {
        self.max_exports = Some(max_exports);
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            id_pattern: EXPORT_ID_PATTERN.to_string(),
            max_exports: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = RegistryConfig::default();
        assert_eq!(config.ledger_path, PathBuf::from("/export/vfs.conf"));
        assert_eq!(config.id_pattern, EXPORT_ID_PATTERN);
        assert!(config.max_exports.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"ledger_path": "/tmp/ganesha.conf", "max_exports": 4}"#)
                .unwrap();
        assert_eq!(config.ledger_path, PathBuf::from("/tmp/ganesha.conf"));
        assert_eq!(config.id_pattern, EXPORT_ID_PATTERN);
        assert_eq!(config.max_exports, Some(4));
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::new("/srv/vfs.conf").with_max_exports(10);
        assert_eq!(config.ledger_path, PathBuf::from("/srv/vfs.conf"));
        assert_eq!(config.max_exports, Some(10));
    }
}
