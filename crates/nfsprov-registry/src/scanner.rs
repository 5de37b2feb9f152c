//! Ledger scanning: export id recovery and the id to path index.
//!
//! Both scans are read-only and tolerate malformed stanzas. A partially
//! written or hand-edited block must never stop the remaining exports from
//! being recovered, so bad entries are skipped with a diagnostic instead of
//! failing the scan.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::iter::Peekable;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};

const EXPORT_ID_KEY: &str = "Export_Id";
const PATH_KEY: &str = "Path";

/// Collects every export id matched by `re` in the ledger text.
///
/// `re` must contain exactly one capture group holding the digits. Captures
/// that do not parse as a `u16` are skipped.
pub fn recover_ids(text: &str, re: &Regex) -> RegistryResult<BTreeSet<u16>> {
    // captures_len counts the implicit whole-match group
    if re.captures_len() != 2 {
        return Err(RegistryError::InvalidPattern {
            pattern: re.as_str().to_string(),
        });
    }

    let mut ids = BTreeSet::new();
    for caps in re.captures_iter(text) {
        let Some(digits) = caps.get(1) else {
            continue;
        };
        match digits.as_str().parse::<u16>() {
            Ok(id) => {
                ids.insert(id);
            }
            Err(e) => {
                debug!(capture = digits.as_str(), error = %e, "skipping unparsable export id");
            }
        }
    }

    Ok(ids)
}

/// Reads the ledger at `path` and recovers its export ids.
pub fn recover_ids_from_file(path: &Path, re: &Regex) -> RegistryResult<BTreeSet<u16>> {
    let text = std::fs::read_to_string(path)?;
    recover_ids(&text, re)
}

/// Builds the export id to path index from the ledger at `path`.
///
/// Only fails if the file cannot be opened or read.
pub fn index_paths(path: &Path) -> RegistryResult<BTreeMap<u16, String>> {
    let file = File::open(path)?;
    Ok(index_lines(BufReader::new(file).lines())?)
}

/// Builds the export id to path index from in-memory ledger text.
pub fn parse_index(text: &str) -> BTreeMap<u16, String> {
    let lines = text.lines().map(|l| Ok::<_, io::Error>(l.to_string()));
    // reading from a str cannot fail
    index_lines(lines).unwrap_or_default()
}

fn index_lines<I>(lines: I) -> io::Result<BTreeMap<u16, String>>
where
    I: Iterator<Item = io::Result<String>>,
{
    let mut index = BTreeMap::new();
    let mut lines = lines.peekable();

    while let Some(line) = lines.next() {
        let line = line?;
        if !line.contains(EXPORT_ID_KEY) {
            continue;
        }

        let Some(id) = declaration_value(&line).and_then(|v| v.parse::<u16>().ok()) else {
            warn!(line = %line.trim(), "skipping malformed export id declaration");
            continue;
        };

        match next_path(&mut lines)? {
            Some(path) => {
                if let Some(previous) = index.insert(id, path.clone()) {
                    warn!(export_id = id, previous = %previous, path = %path, "duplicate export id in ledger");
                }
            }
            None => {
                warn!(export_id = id, "export id declaration not followed by a path declaration");
            }
        }
    }

    Ok(index)
}

/// Consumes the next line only if it is a path declaration, so a following
/// export id line is still examined by the caller.
fn next_path<I>(lines: &mut Peekable<I>) -> io::Result<Option<String>>
where
    I: Iterator<Item = io::Result<String>>,
{
    let is_path = match lines.peek() {
        Some(Ok(next)) => next.contains(PATH_KEY),
        Some(Err(_)) => true,
        None => false,
    };
    if !is_path {
        return Ok(None);
    }

    match lines.next() {
        Some(line) => Ok(declaration_value(&line?).map(str::to_string)),
        None => Ok(None),
    }
}

/// Value of a `Key = value;` line, without surrounding whitespace or the
/// trailing semicolon.
fn declaration_value(line: &str) -> Option<&str> {
    let mut parts = line.split(" = ");
    let (_, value) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let value = value.trim();
    Some(value.strip_suffix(';').unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stanza::{export_id_regex, ExportStanza, SquashPolicy};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn ledger_with(ids: &[u16]) -> String {
        ids.iter()
            .map(|id| {
                ExportStanza::new(*id, &format!("/export/pvc-{}", id), SquashPolicy::default())
                    .render()
            })
            .collect()
    }

    #[test]
    fn test_recover_ids_from_rendered_ledger() {
        let re = export_id_regex().unwrap();
        let ids = recover_ids(&ledger_with(&[1, 2, 5]), &re).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![1, 2, 5]);
    }

    #[test]
    fn test_recover_ids_empty_ledger() {
        let re = export_id_regex().unwrap();
        assert!(recover_ids("", &re).unwrap().is_empty());
    }

    #[test]
    fn test_recover_ids_skips_malformed() {
        let re = Regex::new("Export_Id = ([0-9a-z]+);").unwrap();
        let mut text = ledger_with(&[3]);
        text.push_str("\nEXPORT\n{\n\tExport_Id = abc;\n\tPath = /export/bad;\n}\n");
        text.push_str("\nEXPORT\n{\n\tExport_Id = 70000;\n\tPath = /export/big;\n}\n");
        text.push_str(&ledger_with(&[9]));

        let ids = recover_ids(&text, &re).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![3, 9]);
    }

    #[test]
    fn test_recover_ids_rejects_pattern_without_group() {
        let re = Regex::new("Export_Id = [0-9]+;").unwrap();
        let err = recover_ids("", &re).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern { .. }));
    }

    #[test]
    fn test_recover_ids_rejects_pattern_with_two_groups() {
        let re = Regex::new("(Export_Id) = ([0-9]+);").unwrap();
        assert!(matches!(
            recover_ids("", &re),
            Err(RegistryError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_recover_ids_kernel_style_pattern() {
        let re = Regex::new("fsid=([0-9]+)").unwrap();
        let text = "/export/a *(rw,fsid=4)\n/export/b *(rw,fsid=11)\n";
        let ids = recover_ids(text, &re).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![4, 11]);
    }

    #[test]
    fn test_parse_index() {
        let index = parse_index(&ledger_with(&[1, 8]));
        assert_eq!(index.len(), 2);
        assert_eq!(index[&1], "/export/pvc-1");
        assert_eq!(index[&8], "/export/pvc-8");
    }

    #[test]
    fn test_parse_index_drops_id_without_path() {
        let text = "Export_Id = 4;\nPseudo = /export/x;\n";
        assert!(parse_index(text).is_empty());
    }

    #[test]
    fn test_parse_index_keeps_following_declaration() {
        let text = "\tExport_Id = 4;\n\tExport_Id = 5;\n\tPath = /export/five;\n";
        let index = parse_index(text);
        assert_eq!(index.len(), 1);
        assert_eq!(index[&5], "/export/five");
    }

    #[test]
    fn test_parse_index_skips_malformed_id() {
        let text = "\tExport_Id = x1;\n\tPath = /export/bad;\n\tExport_Id = 2;\n\tPath = /export/good;\n";
        let index = parse_index(text);
        assert_eq!(index.len(), 1);
        assert_eq!(index[&2], "/export/good");
    }

    #[test]
    fn test_parse_index_skips_malformed_path() {
        let text = "\tExport_Id = 2;\n\tPath /export/nope;\n";
        assert!(parse_index(text).is_empty());
    }

    #[test]
    fn test_declaration_value() {
        assert_eq!(declaration_value("\tExport_Id = 12;"), Some("12"));
        assert_eq!(declaration_value("\tPath = /export/a;  "), Some("/export/a"));
        assert_eq!(declaration_value("Path = a = b;"), None);
        assert_eq!(declaration_value("Path=/x;"), None);
    }

    #[test]
    fn test_index_paths_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", ledger_with(&[2, 3])).unwrap();

        let index = index_paths(file.path()).unwrap();
        assert_eq!(index.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_index_paths_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = index_paths(&dir.path().join("missing.conf")).unwrap_err();
        assert!(matches!(err, RegistryError::IoError(_)));
    }

    #[test]
    fn test_recover_ids_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", ledger_with(&[10, 20])).unwrap();
        let re = export_id_regex().unwrap();
        let ids = recover_ids_from_file(file.path(), &re).unwrap();
        assert_eq!(ids.len(), 2);
    }
}
