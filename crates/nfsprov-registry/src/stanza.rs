//! NFS-Ganesha export block rendering.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

/// Pattern matching the export id declaration of a rendered stanza.
pub const EXPORT_ID_PATTERN: &str = "Export_Id = ([0-9]+);";

/// Compiles [`EXPORT_ID_PATTERN`].
pub fn export_id_regex() -> RegistryResult<Regex> {
    Ok(Regex::new(EXPORT_ID_PATTERN)?)
}

/// Checks that `path` renders to a `Path` line the path index can read back:
/// non-empty, a single line, no surrounding whitespace and no `" = "`.
pub fn validate_export_path(path: &str) -> RegistryResult<()> {
    let valid = !path.is_empty()
        && path.trim() == path
        && !path.contains(['\n', '\r'])
        && !path.contains(" = ");

    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidExportPath {
            path: path.to_string(),
        })
    }
}

/// Root squash behaviour written into the export block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquashPolicy {
    /// Remote root keeps uid 0.
    #[default]
    NoRootSquash,
    /// Remote root is mapped to the anonymous uid.
    RootIdSquash,
}

impl SquashPolicy {
    /// All policies, in the order stanzas are probed when matching ledger text.
    pub const ALL: [SquashPolicy; 2] = [SquashPolicy::NoRootSquash, SquashPolicy::RootIdSquash];

    /// Ganesha keyword for the `Squash` option.
    pub fn as_ganesha(&self) -> &'static str {
        match self {
            SquashPolicy::NoRootSquash => "no_root_squash",
            SquashPolicy::RootIdSquash => "root_id_squash",
        }
    }

    /// Maps a boolean `rootSquash` volume parameter to a policy.
    pub fn from_root_squash(root_squash: bool) -> Self {
        if root_squash {
            SquashPolicy::RootIdSquash
        } else {
            SquashPolicy::NoRootSquash
        }
    }
}

/// One export block in the Ganesha config.
///
/// The text produced by [`ExportStanza::render`] is the exact unit appended to
/// and removed from the ledger, so it must stay byte-stable for a given
/// `(id, path, squash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStanza {
    /// Export id, also used for `Filesystem_id = <id>.<id>`.
    pub id: u16,
    /// Backing directory, exported under the same pseudo path.
    pub path: String,
    /// Root squash policy.
    pub squash: SquashPolicy,
}

impl ExportStanza {
    /// Creates a stanza description.
    pub fn new(id: u16, path: &str, squash: SquashPolicy) -> Self {
        Self {
            id,
            path: path.to_string(),
            squash,
        }
    }

    /// Renders the block. The `Export_Id` line is immediately followed by the
    /// `Path` line, which the path index relies on.
    pub fn render(&self) -> String {
        let id = self.id;
        format!(
            "\nEXPORT\n{{\n\
             \tExport_Id = {id};\n\
             \tPath = {path};\n\
             \tPseudo = {path};\n\
             \tAccess_Type = RW;\n\
             \tSquash = {squash};\n\
             \tSecType = sys;\n\
             \tFilesystem_id = {id}.{id};\n\
             \tFSAL {{\n\
             \t\tName = VFS;\n\
             \t}}\n\
             }}\n",
            path = self.path,
            squash = self.squash.as_ganesha(),
        )
    }
}

impl fmt::Display for ExportStanza {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
