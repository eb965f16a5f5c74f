use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::store::codec::{load, save};
use crate::store::state::PersistedState;
use crate::store::StoreError;

/// State blob kept on disk, for tooling outside the browser.
#[derive(Clone, Debug)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty session.
    pub fn load(&self) -> Result<PersistedState, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => load(&raw),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(PersistedState::default()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    pub fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let raw = save(state)?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }
        fs::write(&self.path, raw).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io { path: self.path.display().to_string(), source }
    }
}
