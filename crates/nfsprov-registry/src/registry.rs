//! Export registry: id allocation kept in step with the export ledger.
//!
//! One mutex guards both the id pool and every ledger write, so the set of
//! allocated ids always equals the ids present in the ledger between calls.
//! The lock is never exposed to callers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::id_pool::IdPool;
use crate::ledger::Ledger;
use crate::scanner;
use crate::stanza::{validate_export_path, ExportStanza, SquashPolicy};

/// Result of comparing the in-memory id pool against a fresh ledger scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    /// Ids allocated in memory with no block in the ledger.
    pub only_in_memory: Vec<u16>,
    /// Ids present in the ledger that the pool does not know about.
    pub only_in_ledger: Vec<u16>,
    /// Ids declared in the ledger whose block has no well-formed path line,
    /// so they cannot be deleted by id.
    pub unindexed: Vec<u16>,
}

impl ConsistencyReport {
    /// Returns true if the pool and the ledger agree.
    pub fn is_consistent(&self) -> bool {
        self.only_in_memory.is_empty() && self.only_in_ledger.is_empty()
    }

    /// Returns true if the ledger agrees with the pool and every export in it
    /// can be found by id.
    pub fn is_clean(&self) -> bool {
        self.is_consistent() && self.unindexed.is_empty()
    }
}

/// Allocates export ids and keeps the ledger in sync with them.
pub struct ExportRegistry {
    pool: Mutex<IdPool>,
    ledger: Ledger,
    id_regex: Regex,
    max_exports: Option<usize>,
}

impl ExportRegistry {
    /// Opens the ledger, creating it if missing, and recovers the allocated
    /// ids from it.
    ///
    /// Must complete before the registry is shared between threads.
    pub fn open(config: RegistryConfig) -> RegistryResult<Self> {
        let id_regex = Regex::new(&config.id_pattern)?;
        let ledger = Ledger::new(config.ledger_path);
        ledger.ensure_exists()?;

        let ids = scanner::recover_ids(&ledger.read()?, &id_regex)?;
        info!(
            path = %ledger.path().display(),
            recovered = ids.len(),
            "recovered export ids from ledger"
        );

        Ok(Self {
            pool: Mutex::new(IdPool::from_ids(ids)),
            ledger,
            id_regex,
            max_exports: config.max_exports,
        })
    }

    fn lock(&self) -> RegistryResult<MutexGuard<'_, IdPool>> {
        self.pool.lock().map_err(|_| RegistryError::LockPoisoned)
    }

    fn check_limit(&self, pool: &IdPool) -> RegistryResult<()> {
        match self.max_exports {
            Some(limit) if pool.len() >= limit => Err(RegistryError::ExportLimitReached { limit }),
            _ => Ok(()),
        }
    }

    /// Reserves the lowest free export id without writing the ledger.
    ///
    /// The caller must either append a block for the id or [`release`] it.
    ///
    /// [`release`]: ExportRegistry::release
    pub fn allocate(&self) -> RegistryResult<u16> {
        let mut pool = self.lock()?;
        self.check_limit(&pool)?;
        pool.allocate()
    }

    /// Releases an export id. Releasing a free id is a no-op.
    pub fn release(&self, id: u16) -> RegistryResult<()> {
        self.lock()?.release(id);
        Ok(())
    }

    /// Appends raw text to the ledger.
    pub fn append(&self, text: &str) -> RegistryResult<()> {
        let _pool = self.lock()?;
        self.ledger.append(text)
    }

    /// Removes every occurrence of `text` from the ledger, returning how many
    /// were removed.
    pub fn remove(&self, text: &str) -> RegistryResult<usize> {
        let _pool = self.lock()?;
        self.ledger.remove(text)
    }

    /// Allocates an id and appends the export block for `path`.
    ///
    /// Both steps run under one lock acquisition. If the append fails the id
    /// is released before the error is returned. Paths the path index could
    /// not read back are rejected before an id is allocated.
    pub fn create_export(&self, path: &str, squash: SquashPolicy) -> RegistryResult<ExportStanza> {
        validate_export_path(path)?;
        let mut pool = self.lock()?;
        self.check_limit(&pool)?;
        let id = pool.allocate()?;

        let stanza = ExportStanza::new(id, path, squash);
        if let Err(e) = self.ledger.append(&stanza.render()) {
            pool.release(id);
            warn!(export_id = id, path, error = %e, "failed to write export block, released id");
            return Err(e);
        }

        info!(export_id = id, path, "created export");
        Ok(stanza)
    }

    /// Removes the block for `stanza` and releases its id.
    ///
    /// The id stays allocated if the ledger write fails. If the block is not
    /// in the ledger but the id still is, [`RegistryError::StanzaMismatch`] is
    /// returned and nothing changes.
    pub fn delete_export(&self, stanza: &ExportStanza) -> RegistryResult<()> {
        let mut pool = self.lock()?;
        self.delete_locked(&mut pool, stanza)
    }

    /// Looks up the export by id through the path index, removes its block
    /// and releases the id.
    pub fn delete_export_by_id(&self, id: u16) -> RegistryResult<ExportStanza> {
        let mut pool = self.lock()?;

        let index = scanner::index_paths(self.ledger.path())?;
        let path = index.get(&id).ok_or(RegistryError::ExportNotFound { id })?;

        let text = self.ledger.read()?;
        let stanza = SquashPolicy::ALL
            .iter()
            .map(|squash| ExportStanza::new(id, path, *squash))
            .find(|stanza| text.contains(&stanza.render()))
            .ok_or(RegistryError::StanzaMismatch { id })?;

        self.delete_locked(&mut pool, &stanza)?;
        Ok(stanza)
    }

    fn delete_locked(&self, pool: &mut IdPool, stanza: &ExportStanza) -> RegistryResult<()> {
        let removed = self.ledger.remove(&stanza.render())?;

        if removed == 0 {
            let ids = scanner::recover_ids(&self.ledger.read()?, &self.id_regex)?;
            if ids.contains(&stanza.id) {
                return Err(RegistryError::StanzaMismatch { id: stanza.id });
            }
            warn!(export_id = stanza.id, "export block already absent from ledger");
        } else if removed > 1 {
            warn!(export_id = stanza.id, removed, "removed duplicate export blocks");
        }

        pool.release(stanza.id);
        info!(export_id = stanza.id, path = %stanza.path, "deleted export");
        Ok(())
    }

    /// Backing path of an export, from a fresh scan of the ledger.
    pub fn lookup_path(&self, id: u16) -> RegistryResult<Option<String>> {
        Ok(scanner::index_paths(self.ledger.path())?.remove(&id))
    }

    /// All exports in the ledger, keyed by id.
    pub fn exports(&self) -> RegistryResult<BTreeMap<u16, String>> {
        scanner::index_paths(self.ledger.path())
    }

    /// Allocated ids in ascending order.
    pub fn allocated_ids(&self) -> RegistryResult<Vec<u16>> {
        Ok(self.lock()?.ids().iter().copied().collect())
    }

    /// Number of allocated ids.
    pub fn len(&self) -> RegistryResult<usize> {
        Ok(self.lock()?.len())
    }

    /// Returns true if no ids are allocated.
    pub fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.lock()?.is_empty())
    }

    /// Configured export limit.
    pub fn max_exports(&self) -> Option<usize> {
        self.max_exports
    }

    /// Path of the ledger file.
    pub fn ledger_path(&self) -> &Path {
        self.ledger.path()
    }

    /// Rescans the ledger and compares it with the id pool.
    pub fn check_consistency(&self) -> RegistryResult<ConsistencyReport> {
        let pool = self.lock()?;
        let text = self.ledger.read()?;
        let scanned = scanner::recover_ids(&text, &self.id_regex)?;
        let index = scanner::parse_index(&text);

        let report = ConsistencyReport {
            only_in_memory: pool.ids().difference(&scanned).copied().collect(),
            only_in_ledger: scanned.difference(pool.ids()).copied().collect(),
            unindexed: scanned
                .iter()
                .filter(|id| !index.contains_key(id))
                .copied()
                .collect(),
        };
        if !report.is_consistent() {
            warn!(
                only_in_memory = ?report.only_in_memory,
                only_in_ledger = ?report.only_in_ledger,
                "export id pool diverges from ledger"
            );
        }
        if !report.unindexed.is_empty() {
            warn!(unindexed = ?report.unindexed, "ledger has export ids without a path");
        }
        Ok(report)
    }
}
