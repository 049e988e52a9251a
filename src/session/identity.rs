// ABOUTME: Persisted client identity
// ABOUTME: Stable unique id the server uses to recognize a returning client

use crate::error::Error;
use directories::ProjectDirs;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Source of the stable client id sent in the handshake
pub trait IdentityStore: Send + Sync {
    /// The stored id, if one has been persisted
    fn get(&self) -> Result<Option<String>, Error>;

    /// The stored id, generating and persisting a new UUID on first use
    fn ensure(&self) -> Result<String, Error>;
}

/// Identity persisted as a single line in a file
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    /// Store the id at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the id in the platform data directory
    pub fn in_data_dir() -> Result<Self, Error> {
        let dirs = ProjectDirs::from("", "", "snapsync").ok_or_else(|| {
            Error::Config("No home directory to keep the client id in".to_string())
        })?;
        Ok(Self::new(dirs.data_dir().join("client_id")))
    }

    /// Location of the id file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityStore for FileIdentityStore {
    fn get(&self) -> Result<Option<String>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(text) => {
                let id = text.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ensure(&self) -> Result<String, Error> {
        if let Some(id) = self.get()? {
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &id)?;
        log::info!("Generated client id {} at {}", id, self.path.display());
        Ok(id)
    }
}

/// Identity held in memory only, for hosts without local storage
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    id: Mutex<Option<String>>,
}

impl MemoryIdentityStore {
    /// Start with no id
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a fixed id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Mutex::new(Some(id.into())),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self) -> Result<Option<String>, Error> {
        Ok(self.id.lock().clone())
    }

    fn ensure(&self) -> Result<String, Error> {
        Ok(self
            .id
            .lock()
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone())
    }
}
