#![warn(missing_docs)]

//! nfsprov provisioner service: volume provisioning on top of the export
//! registry, the HTTP API the cluster controller drives, and the admin CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod provisioner;

pub use api::ProvisionerApi;
pub use config::ProvisionerConfig;
pub use error::{ProvisionError, Result};
pub use provisioner::{ProvisionedVolume, VolumeProvisioner, VolumeRequest};
