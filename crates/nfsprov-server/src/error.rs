//! Error types for the provisioner service

use nfsprov_registry::RegistryError;
use thiserror::Error;

/// HTTP status: bad request
pub const HTTP_BAD_REQUEST: u16 = 400;
/// HTTP status: not found
pub const HTTP_NOT_FOUND: u16 = 404;
/// HTTP status: conflict
pub const HTTP_CONFLICT: u16 = 409;
/// HTTP status: internal server error
pub const HTTP_INTERNAL_ERROR: u16 = 500;
/// HTTP status: insufficient storage
pub const HTTP_INSUFFICIENT_STORAGE: u16 = 507;

/// Errors raised while provisioning or deleting volumes.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Volume name is not a single path component
    #[error("Invalid volume name: {name}")]
    InvalidVolumeName {
        /// The rejected name
        name: String,
    },
    /// Backing directory for the volume already exists
    #[error("Volume directory already exists: {path}")]
    VolumeExists {
        /// The existing directory
        path: String,
    },
    /// Service configuration is invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected
        reason: String,
    },
    /// Export registry error
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    /// IO error on the backing directory
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    /// Blocking registry task panicked or was cancelled
    #[error("Registry task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl ProvisionError {
    /// Converts the error to an HTTP status code for API responses.
    pub fn http_status(&self) -> u16 {
        match self {
            ProvisionError::InvalidVolumeName { .. } => HTTP_BAD_REQUEST,
            ProvisionError::VolumeExists { .. } => HTTP_CONFLICT,
            ProvisionError::InvalidConfig { .. } => HTTP_INTERNAL_ERROR,
            ProvisionError::Registry(e) => match e {
                RegistryError::ExportNotFound { .. } => HTTP_NOT_FOUND,
                RegistryError::StanzaMismatch { .. } => HTTP_CONFLICT,
                RegistryError::InvalidExportPath { .. } => HTTP_BAD_REQUEST,
                e if e.is_capacity() => HTTP_INSUFFICIENT_STORAGE,
                _ => HTTP_INTERNAL_ERROR,
            },
            ProvisionError::IoError(_) => HTTP_INTERNAL_ERROR,
            ProvisionError::TaskFailed(_) => HTTP_INTERNAL_ERROR,
        }
    }
}

/// Result type alias using ProvisionError as the error type.
pub type Result<T> = std::result::Result<T, ProvisionError>;
