//! Export id pool.
//!
//! Hands out the lowest free export id in `[1, 65535]`, never returning
//! [`RESERVED_EXPORT_ID`]. The pool itself is not synchronized: it lives inside
//! [`ExportRegistry`](crate::registry::ExportRegistry) behind the same mutex
//! that serializes ledger writes, so an id is never observed as allocated
//! without the ledger being updated under the same lock.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

/// Export id reserved for the Ganesha pseudo root.
///
/// Each export gets `Filesystem_id = <id>.<id>`, and `152.152` is the default
/// filesystem id of the pseudo root, so 152 must never be handed out.
pub const RESERVED_EXPORT_ID: u16 = 152;

/// Lowest export id the pool will allocate.
pub const MIN_EXPORT_ID: u16 = 1;

/// Highest export id the pool will allocate.
pub const MAX_EXPORT_ID: u16 = u16::MAX;

/// Set of allocated export ids.
#[derive(Debug, Clone, Default)]
pub struct IdPool {
    ids: BTreeSet<u16>,
}

impl IdPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool with the given ids already marked allocated.
    pub fn from_ids<I: IntoIterator<Item = u16>>(ids: I) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Allocates the lowest free id, skipping the reserved id.
    pub fn allocate(&mut self) -> RegistryResult<u16> {
        let id = (MIN_EXPORT_ID..=MAX_EXPORT_ID)
            .find(|id| *id != RESERVED_EXPORT_ID && !self.ids.contains(id))
            .ok_or(RegistryError::PoolExhausted)?;

        self.ids.insert(id);
        debug!(export_id = id, allocated = self.ids.len(), "allocated export id");
        Ok(id)
    }

    /// Releases an id. Releasing an id that is not allocated is a no-op.
    pub fn release(&mut self, id: u16) {
        if self.ids.remove(&id) {
            debug!(export_id = id, allocated = self.ids.len(), "released export id");
        }
    }

    /// Returns true if the id is currently allocated.
    pub fn contains(&self, id: u16) -> bool {
        self.ids.contains(&id)
    }

    /// Number of allocated ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no ids are allocated.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Allocated ids in ascending order.
    pub fn ids(&self) -> &BTreeSet<u16> {
        &self.ids
    }
}
