//! Provisioner service configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use nfsprov_registry::{RegistryConfig, DEFAULT_LEDGER_PATH, EXPORT_ID_PATTERN};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// Default directory volumes are created in.
pub const DEFAULT_EXPORT_DIR: &str = "/export";

/// Default provisioner name claimed in storage classes.
pub const DEFAULT_PROVISIONER_NAME: &str = "example.com/nfs";

const QUALIFIED_NAME_MAX_LEN: usize = 63;
const DNS_SUBDOMAIN_MAX_LEN: usize = 253;

/// Provisioner service configuration, loaded from TOML or JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Address the HTTP API listens on.
    pub bind_addr: SocketAddr,
    /// Name storage classes use to select this provisioner.
    pub provisioner_name: String,
    /// Directory volumes are created in.
    pub export_dir: PathBuf,
    /// Ganesha config file holding the export blocks.
    pub ledger_path: PathBuf,
    /// Address reported to clients. Falls back to `POD_IP`, then `localhost`.
    pub server_hostname: Option<String>,
    /// Maximum number of exports, unlimited if unset.
    pub max_exports: Option<usize>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            provisioner_name: DEFAULT_PROVISIONER_NAME.to_string(),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            server_hostname: None,
            max_exports: None,
        }
    }
}

impl ProvisionerConfig {
    /// Loads a config file, choosing the format by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ProvisionerConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ProvisionerConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        validate_provisioner_name(&self.provisioner_name)?;

        if !self.export_dir.is_absolute() {
            return Err(ProvisionError::InvalidConfig {
                reason: format!("export_dir must be absolute: {}", self.export_dir.display()),
            });
        }

        if self.max_exports == Some(0) {
            return Err(ProvisionError::InvalidConfig {
                reason: "max_exports must be positive or unset".to_string(),
            });
        }

        Ok(())
    }

    /// Registry settings derived from this config.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            ledger_path: self.ledger_path.clone(),
            id_pattern: EXPORT_ID_PATTERN.to_string(),
            max_exports: self.max_exports,
        }
    }

    /// Address clients mount exports from.
    pub fn server_address(&self) -> String {
        self.server_hostname
            .clone()
            .or_else(|| std::env::var("POD_IP").ok())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

/// Checks that the name is a qualified name: an optional DNS subdomain prefix
/// and a `/`, followed by a name of at most 63 alphanumerics, `-`, `_` or `.`.
pub fn validate_provisioner_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ProvisionError::InvalidConfig {
        reason: format!("invalid provisioner name {:?}: {}", name, reason),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }

    let lowered = name.to_lowercase();
    let (prefix, base) = match lowered.split_once('/') {
        Some((prefix, base)) => (Some(prefix), base),
        None => (None, lowered.as_str()),
    };

    if let Some(prefix) = prefix {
        let subdomain = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .map_err(|e| invalid(&e.to_string()))?;
        if prefix.is_empty() || prefix.len() > DNS_SUBDOMAIN_MAX_LEN || !subdomain.is_match(prefix) {
            return Err(invalid("prefix must be a DNS subdomain"));
        }
    }

    let base_re = Regex::new(r"^([a-z0-9][-a-z0-9_.]*)?[a-z0-9]$").map_err(|e| invalid(&e.to_string()))?;
    if base.is_empty() || base.len() > QUALIFIED_NAME_MAX_LEN || !base_re.is_match(base) {
        return Err(invalid(
            "name must be 1-63 alphanumerics, '-', '_' or '.', starting and ending with an alphanumeric",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8090)));
        assert_eq!(config.provisioner_name, "example.com/nfs");
        assert_eq!(config.export_dir, PathBuf::from("/export"));
        assert_eq!(config.ledger_path, PathBuf::from("/export/vfs.conf"));
        assert!(config.server_hostname.is_none());
        assert!(config.max_exports.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
bind_addr = "127.0.0.1:9090"
provisioner_name = "nfs.example.org/ganesha"
export_dir = "/srv/export"
ledger_path = "/srv/export/vfs.conf"
server_hostname = "nfs.example.org"
max_exports = 100
            "#
        )
        .unwrap();

        let config = ProvisionerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9090)));
        assert_eq!(config.provisioner_name, "nfs.example.org/ganesha");
        assert_eq!(config.export_dir, PathBuf::from("/srv/export"));
        assert_eq!(config.server_address(), "nfs.example.org");
        assert_eq!(config.max_exports, Some(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_json_partial() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(file, r#"{{"export_dir": "/data", "ledger_path": "/data/vfs.conf"}}"#).unwrap();

        let config = ProvisionerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.export_dir, PathBuf::from("/data"));
        assert_eq!(config.provisioner_name, DEFAULT_PROVISIONER_NAME);
        assert_eq!(config.registry_config().ledger_path, PathBuf::from("/data/vfs.conf"));
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        assert!(ProvisionerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_relative_export_dir() {
        let config = ProvisionerConfig {
            export_dir: PathBuf::from("export"),
            ..ProvisionerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_max_exports() {
        let config = ProvisionerConfig {
            max_exports: Some(0),
            ..ProvisionerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provisioner_names() {
        assert!(validate_provisioner_name("example.com/nfs").is_ok());
        assert!(validate_provisioner_name("Example.COM/NFS").is_ok());
        assert!(validate_provisioner_name("nfs-ganesha").is_ok());
        assert!(validate_provisioner_name("").is_err());
        assert!(validate_provisioner_name("/nfs").is_err());
        assert!(validate_provisioner_name("example.com/").is_err());
        assert!(validate_provisioner_name("-bad.example/nfs").is_err());
        assert!(validate_provisioner_name("example.com/nfs_").is_err());
        assert!(validate_provisioner_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_registry_config() {
        let config = ProvisionerConfig {
            max_exports: Some(7),
            ..ProvisionerConfig::default()
        };
        let registry = config.registry_config();
        assert_eq!(registry.max_exports, Some(7));
        assert_eq!(registry.id_pattern, EXPORT_ID_PATTERN);
    }
}
