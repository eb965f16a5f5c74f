//! Client session state that survives reloads.

mod codec;
mod file;
mod state;

pub use codec::{load, save, SCHEMA_VERSION, STORAGE_KEY};
pub use file::StateFile;
pub use state::{PersistedState, ViewMode};

use thiserror::Error;

use crate::errors::{ApplicationError, DomainError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed state blob: {0}")]
    Malformed(String),
    #[error("unsupported state version {0}")]
    UnsupportedVersion(u64),
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(error) => Self::Domain(error),
            other => Self::Persistence(other.to_string()),
        }
    }
}
