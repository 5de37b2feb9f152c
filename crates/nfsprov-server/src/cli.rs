//! `nfs-provisioner` command line

use crate::api::ProvisionerApi;
use crate::config::{ProvisionerConfig, DEFAULT_EXPORT_DIR};
use crate::provisioner::{VolumeProvisioner, VolumeRequest};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nfsprov_registry::DEFAULT_LEDGER_PATH;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level CLI arguments.
#[derive(Parser)]
#[command(name = "nfs-provisioner")]
#[command(about = "NFS-Ganesha volume provisioner", long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Recover the export registry and serve the provisioning API
    Serve {
        /// Config file, TOML or JSON
        #[arg(short, long, default_value = "/etc/nfs-provisioner/provisioner.toml")]
        config: PathBuf,
    },
    /// Provision one volume directly against the ledger
    Provision {
        /// Volume directory name
        name: String,
        /// Map remote root to the anonymous uid
        #[arg(long)]
        root_squash: bool,
        /// Export ledger file
        #[arg(short, long, env = "NFSPROV_LEDGER", default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
        /// Directory volumes are created in
        #[arg(short, long, env = "NFSPROV_EXPORT_DIR", default_value = DEFAULT_EXPORT_DIR)]
        export_dir: PathBuf,
    },
    /// Delete one export and its backing directory
    Delete {
        /// Export id to delete
        export_id: u16,
        /// Export ledger file
        #[arg(short, long, env = "NFSPROV_LEDGER", default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
        /// Directory volumes are created in
        #[arg(short, long, env = "NFSPROV_EXPORT_DIR", default_value = DEFAULT_EXPORT_DIR)]
        export_dir: PathBuf,
    },
    /// List exports recorded in the ledger
    List {
        /// Export ledger file
        #[arg(short, long, env = "NFSPROV_LEDGER", default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
    },
    /// Check that every export id in the ledger has a discoverable path
    Check {
        /// Export ledger file
        #[arg(short, long, env = "NFSPROV_LEDGER", default_value = DEFAULT_LEDGER_PATH)]
        ledger: PathBuf,
    },
}

impl Cli {
    /// Runs the selected subcommand.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Serve { ref config } => serve(config).await,
            Command::Provision {
                ref name,
                root_squash,
                ref ledger,
                ref export_dir,
            } => provision(name, root_squash, ledger, export_dir).await,
            Command::Delete {
                export_id,
                ref ledger,
                ref export_dir,
            } => delete(export_id, ledger, export_dir).await,
            Command::List { ref ledger } => list(ledger).await,
            Command::Check { ref ledger } => check(ledger).await,
        }
    }
}

fn offline_provisioner(ledger: &Path, export_dir: &Path) -> Result<VolumeProvisioner> {
    let config = ProvisionerConfig {
        ledger_path: ledger.to_path_buf(),
        export_dir: export_dir.to_path_buf(),
        ..ProvisionerConfig::default()
    };
    VolumeProvisioner::from_config(&config)
        .with_context(|| format!("failed to open export ledger {}", ledger.display()))
}

async fn serve(config_path: &Path) -> Result<()> {
    let config = if config_path.exists() {
        ProvisionerConfig::from_file(config_path)?
    } else {
        tracing::warn!("Config file not found, using defaults: {}", config_path.display());
        ProvisionerConfig::default()
    };
    config.validate()?;
    tracing::info!("Provisioning volumes as {}", config.provisioner_name);

    let provisioner = VolumeProvisioner::from_config(&config)
        .context("failed to recover export registry")?;
    tracing::info!(
        "Recovered {} exports from {}",
        provisioner.registry().len()?,
        config.ledger_path.display()
    );

    let api = ProvisionerApi::new(Arc::new(provisioner), config.bind_addr);
    api.serve().await
}

async fn provision(name: &str, root_squash: bool, ledger: &Path, export_dir: &Path) -> Result<()> {
    let provisioner = offline_provisioner(ledger, export_dir)?;
    let volume = provisioner
        .provision(VolumeRequest {
            name: name.to_string(),
            root_squash,
        })
        .await?;

    println!("Export ID: {}", volume.export_id);
    println!("Path: {}", volume.path);
    println!("Server: {}", volume.server);
    Ok(())
}

async fn delete(export_id: u16, ledger: &Path, export_dir: &Path) -> Result<()> {
    let provisioner = offline_provisioner(ledger, export_dir)?;
    let stanza = provisioner.delete(export_id).await?;
    println!("Deleted export {} ({})", stanza.id, stanza.path);
    Ok(())
}

async fn list(ledger: &Path) -> Result<()> {
    let exports = nfsprov_registry::index_paths(ledger)
        .with_context(|| format!("failed to read export ledger {}", ledger.display()))?;

    println!("{:<10} PATH", "EXPORT_ID");
    for (id, path) in &exports {
        println!("{:<10} {}", id, path);
    }
    println!("{} exports", exports.len());
    Ok(())
}

async fn check(ledger: &Path) -> Result<()> {
    let text = std::fs::read_to_string(ledger)
        .with_context(|| format!("failed to read export ledger {}", ledger.display()))?;
    let ids = nfsprov_registry::recover_ids(&text, &nfsprov_registry::export_id_regex()?)?;
    let index = nfsprov_registry::parse_index(&text);

    let unindexed: Vec<u16> = ids.iter().filter(|id| !index.contains_key(id)).copied().collect();
    println!("Export ids: {}", ids.len());
    println!("Indexed paths: {}", index.len());

    if !unindexed.is_empty() {
        anyhow::bail!("export ids without a path declaration: {:?}", unindexed);
    }
    println!("Ledger OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_provision() {
        let cli = Cli::try_parse_from([
            "nfs-provisioner",
            "provision",
            "pvc-1",
            "--root-squash",
            "--ledger",
            "/tmp/vfs.conf",
        ])
        .unwrap();
        match cli.command {
            Command::Provision {
                name,
                root_squash,
                ledger,
                ..
            } => {
                assert_eq!(name, "pvc-1");
                assert!(root_squash);
                assert_eq!(ledger, PathBuf::from("/tmp/vfs.conf"));
            }
            _ => panic!("expected provision command"),
        }
    }

    #[test]
    fn test_parse_delete_rejects_out_of_range_id() {
        assert!(Cli::try_parse_from(["nfs-provisioner", "delete", "70000"]).is_err());
        assert!(Cli::try_parse_from(["nfs-provisioner", "delete", "12"]).is_ok());
    }

    #[tokio::test]
    async fn test_offline_provision_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("vfs.conf");

        provision("pvc-a", false, &ledger, dir.path()).await.unwrap();
        provision("pvc-b", true, &ledger, dir.path()).await.unwrap();
        list(&ledger).await.unwrap();
        check(&ledger).await.unwrap();

        delete(1, &ledger, dir.path()).await.unwrap();
        let exports = nfsprov_registry::index_paths(&ledger).unwrap();
        assert_eq!(exports.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert!(!dir.path().join("pvc-a").exists());
    }

    #[tokio::test]
    async fn test_check_reports_unindexed_ids() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("vfs.conf");
        std::fs::write(&ledger, "EXPORT\n{\n\tExport_Id = 3;\n\tPseudo = /export/x;\n}\n").unwrap();

        assert!(check(&ledger).await.is_err());
    }
}
