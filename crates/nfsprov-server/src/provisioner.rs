//! Volume provisioner: turns volume create/delete requests into export
//! registry calls plus backing directory management.
//!
//! Registry calls block on the ledger lock and disk I/O, so they run on the
//! blocking pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfsprov_registry::{ConsistencyReport, ExportRegistry, ExportStanza, SquashPolicy};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ProvisionerConfig;
use crate::error::{ProvisionError, Result};

const MAX_VOLUME_NAME_LEN: usize = 255;

/// A request to provision one volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRequest {
    /// Directory name under the export dir, usually the PV name.
    pub name: String,
    /// Map remote root to the anonymous uid.
    #[serde(default)]
    pub root_squash: bool,
}

/// A provisioned volume, as reported back to the cluster controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedVolume {
    /// Export id assigned to the volume.
    pub export_id: u16,
    /// NFS server address clients mount from.
    pub server: String,
    /// Exported path.
    pub path: String,
    /// Exact export block written to the ledger.
    pub export_block: String,
}

/// Provisions and deletes volumes backed by directories under one export dir.
pub struct VolumeProvisioner {
    registry: Arc<ExportRegistry>,
    export_dir: PathBuf,
    server: String,
}

impl VolumeProvisioner {
    /// Creates a provisioner that places volumes under `export_dir` and
    /// reports `server` as their mount address.
    pub fn new(registry: Arc<ExportRegistry>, export_dir: impl Into<PathBuf>, server: impl Into<String>) -> Self {
        Self {
            registry,
            export_dir: export_dir.into(),
            server: server.into(),
        }
    }

    /// Opens the export registry described by `config`, recovering its ids.
    ///
    /// Recovery failure is returned to the caller, which should treat it as
    /// fatal to startup.
    pub fn from_config(config: &ProvisionerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.export_dir)?;
        let registry = ExportRegistry::open(config.registry_config())?;
        Ok(Self::new(
            Arc::new(registry),
            config.export_dir.clone(),
            config.server_address(),
        ))
    }

    /// Export registry the provisioner writes to.
    pub fn registry(&self) -> &Arc<ExportRegistry> {
        &self.registry
    }

    /// Directory volumes are created in.
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// NFS server address handed back to clients.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Creates the backing directory and export for a volume.
    ///
    /// The directory is removed again if the export cannot be created.
    pub async fn provision(&self, request: VolumeRequest) -> Result<ProvisionedVolume> {
        validate_volume_name(&request.name)?;
        self.check_ledger_collision(&request.name)?;

        let dir = self.export_dir.join(&request.name);
        if let Err(e) = tokio::fs::create_dir(&dir).await {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(ProvisionError::VolumeExists {
                    path: dir.display().to_string(),
                });
            }
            return Err(e.into());
        }

        match self.export_volume(&dir, request.root_squash).await {
            Ok(stanza) => {
                info!(volume = %request.name, export_id = stanza.id, path = %stanza.path, "provisioned volume");
                Ok(ProvisionedVolume {
                    export_id: stanza.id,
                    server: self.server.clone(),
                    export_block: stanza.render(),
                    path: stanza.path,
                })
            }
            Err(e) => {
                error!(volume = %request.name, error = %e, "failed to provision volume");
                if let Err(rm) = tokio::fs::remove_dir(&dir).await {
                    warn!(path = %dir.display(), error = %rm, "failed to remove volume directory");
                }
                Err(e)
            }
        }
    }

    /// Rejects names that would shadow the ledger or its `.tmp` sibling when
    /// the ledger lives in the export dir.
    fn check_ledger_collision(&self, name: &str) -> Result<()> {
        let ledger = self.registry.ledger_path();
        if ledger.parent() != Some(self.export_dir.as_path()) {
            return Ok(());
        }

        let ledger_name = ledger.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name == ledger_name || name.strip_prefix(ledger_name) == Some(".tmp") {
            return Err(ProvisionError::InvalidVolumeName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn export_volume(&self, dir: &Path, root_squash: bool) -> Result<ExportStanza> {
        set_world_writable(dir).await?;

        let registry = Arc::clone(&self.registry);
        let path = dir.display().to_string();
        let squash = SquashPolicy::from_root_squash(root_squash);
        let stanza = tokio::task::spawn_blocking(move || registry.create_export(&path, squash)).await??;
        Ok(stanza)
    }

    /// Deletes the export with the given id and its backing directory.
    ///
    /// The directory is only removed once the export block is gone from the
    /// ledger, and only if it lies under the export dir.
    pub async fn delete(&self, export_id: u16) -> Result<ExportStanza> {
        let registry = Arc::clone(&self.registry);
        let stanza = tokio::task::spawn_blocking(move || registry.delete_export_by_id(export_id)).await??;

        let dir = PathBuf::from(&stanza.path);
        if dir.parent() != Some(self.export_dir.as_path()) {
            warn!(export_id, path = %stanza.path, "export path is outside the export dir, leaving it in place");
            return Ok(stanza);
        }

        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(export_id, path = %stanza.path, "volume directory already removed");
            }
            Err(e) => {
                error!(export_id, path = %stanza.path, error = %e, "failed to remove volume directory");
                return Err(e.into());
            }
        }

        info!(export_id, path = %stanza.path, "deleted volume");
        Ok(stanza)
    }

    /// Exports currently in the ledger, keyed by id.
    pub async fn exports(&self) -> Result<BTreeMap<u16, String>> {
        let registry = Arc::clone(&self.registry);
        Ok(tokio::task::spawn_blocking(move || registry.exports()).await??)
    }

    /// Compares the in-memory id pool with the ledger.
    pub async fn consistency(&self) -> Result<ConsistencyReport> {
        let registry = Arc::clone(&self.registry);
        Ok(tokio::task::spawn_blocking(move || registry.check_consistency()).await??)
    }
}

/// Volume names become a single directory under the export dir.
pub fn validate_volume_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_VOLUME_NAME_LEN
        && name != "."
        && name != ".."
        && !name.contains(['/', '\0', ';', '\n'])
        && !name.chars().any(char::is_whitespace);

    if valid {
        Ok(())
    } else {
        Err(ProvisionError::InvalidVolumeName {
            name: name.to_string(),
        })
    }
}

#[cfg(unix)]
async fn set_world_writable(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_world_writable(_dir: &Path) -> Result<()> {
    Ok(())
}
