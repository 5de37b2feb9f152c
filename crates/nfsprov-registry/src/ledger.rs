//! Export ledger file mutation.
//!
//! The ledger is the Ganesha config file holding one block per export. It is
//! the only persisted state: the id pool is rebuilt from it on startup. These
//! primitives take no lock of their own and must only be called while the
//! owning [`ExportRegistry`](crate::registry::ExportRegistry) mutex is held.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::RegistryResult;

/// Handle on the ledger file.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// Creates a handle. The file is not touched.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an empty ledger with mode 0600 if none exists. Returns true if
    /// it was created.
    pub fn ensure_exists(&self) -> RegistryResult<bool> {
        fs::create_dir_all(self.dir())?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        match options.open(&self.path) {
            Ok(file) => {
                file.sync_all()?;
                info!(path = %self.path.display(), "created empty export ledger");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the full ledger text.
    pub fn read(&self) -> RegistryResult<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Appends `text` verbatim and syncs it to disk.
    ///
    /// The ledger must already exist.
    pub fn append(&self, text: &str) -> RegistryResult<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;

        debug!(path = %self.path.display(), bytes = text.len(), "appended export block");
        Ok(())
    }

    /// Removes every literal occurrence of `text` and returns how many were
    /// removed.
    ///
    /// The new content is written to a uniquely named temp file in the same
    /// directory, synced and renamed over the ledger, so a crash leaves either
    /// the old or the new ledger in place. The temp file is deleted on any
    /// failure. The ledger is left untouched if `text` does not occur.
    pub fn remove(&self, text: &str) -> RegistryResult<usize> {
        if text.is_empty() {
            return Ok(0);
        }

        let content = fs::read_to_string(&self.path)?;
        let occurrences = content.matches(text).count();
        if occurrences == 0 {
            return Ok(0);
        }

        let remaining = content.replace(text, "");
        let permissions = fs::metadata(&self.path)?.permissions();

        let mut tmp = NamedTempFile::new_in(self.dir())?;
        tmp.write_all(remaining.as_bytes())?;
        tmp.as_file().set_permissions(permissions)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        debug!(
            path = %self.path.display(),
            occurrences,
            "removed export block"
        );
        Ok(occurrences)
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}
