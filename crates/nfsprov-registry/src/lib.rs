#![warn(missing_docs)]

//! nfsprov registry: export id allocation and NFS-Ganesha export ledger synchronization
//!
//! Every provisioned volume gets a unique 16-bit export id and one `EXPORT`
//! block in the Ganesha config file. The config file is the only persisted
//! state; the in-memory id pool is recovered from it on startup and kept in
//! step with it under a single lock.

pub mod config;
pub mod error;
pub mod id_pool;
pub mod ledger;
pub mod registry;
pub mod scanner;
pub mod stanza;

pub use config::{RegistryConfig, DEFAULT_LEDGER_PATH};
pub use error::{RegistryError, RegistryResult};
pub use id_pool::{IdPool, MAX_EXPORT_ID, MIN_EXPORT_ID, RESERVED_EXPORT_ID};
pub use ledger::Ledger;
pub use registry::{ConsistencyReport, ExportRegistry};
pub use scanner::{index_paths, parse_index, recover_ids, recover_ids_from_file};
pub use stanza::{export_id_regex, validate_export_path, ExportStanza, SquashPolicy, EXPORT_ID_PATTERN};
