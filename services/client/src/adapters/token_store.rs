//! services/client/src/adapters/token_store.rs
//!
//! Implementations of the `TokenStore` port: a file-backed store that survives
//! restarts, and an in-memory one for tests and throwaway sessions.

use docqa_core::{
    domain::CredentialPair,
    ports::{PortError, PortResult, TokenStore},
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};

//=========================================================================================
// MemoryTokenStore
//=========================================================================================

/// Keeps the credential pair in process memory only.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<CredentialPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<CredentialPair> {
        self.pair.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, pair: CredentialPair) -> PortResult<()> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = Some(pair);
        Ok(())
    }

    fn clear(&self) -> PortResult<()> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

//=========================================================================================
// FileTokenStore
//=========================================================================================

/// Persists the credential pair as JSON on disk, with an in-memory copy for reads.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: RwLock<Option<CredentialPair>>,
}

impl FileTokenStore {
    /// Opens the store at `path`, loading any credentials a previous run left behind.
    ///
    /// An unreadable or corrupt file is treated as "no credentials" so a bad file can
    /// never lock the user out; the next login overwrites it.
    pub fn open(path: impl Into<PathBuf>) -> PortResult<Self> {
        let path = path.into();
        let cached = match fs::read(&path) {
            Ok(raw) => match serde_json::from_slice::<CredentialPair>(&raw) {
                Ok(pair) => {
                    info!("Loaded stored credentials from {}", path.display());
                    Some(pair)
                }
                Err(e) => {
                    warn!("Ignoring corrupt credential file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(storage_error(&path, e)),
        };

        Ok(Self {
            path,
            cached: RwLock::new(cached),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self, pair: &CredentialPair) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| storage_error(parent, e))?;
        }
        let json = serde_json::to_vec(pair)
            .map_err(|e| PortError::Storage(format!("Failed to encode credentials: {}", e)))?;

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(|e| storage_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<CredentialPair> {
        self.cached.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, pair: CredentialPair) -> PortResult<()> {
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        self.write_file(&pair)?;
        *cached = Some(pair);
        Ok(())
    }

    fn clear(&self) -> PortResult<()> {
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        *cached = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }
}

fn storage_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Storage(format!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.get().is_none());

        store.set(CredentialPair::new("a", "r")).unwrap();
        assert_eq!(store.get(), Some(CredentialPair::new("a", "r")));

        store.clear().unwrap();
        assert!(store.get().is_none());
    }

    #[test]
    fn file_store_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.get().is_none());
        store.set(CredentialPair::new("access-1", "refresh-1")).unwrap();

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.get(), Some(CredentialPair::new("access-1", "refresh-1")));
    }

    #[test]
    fn file_store_clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = FileTokenStore::open(&path).unwrap();
        store.set(CredentialPair::new("a", "r")).unwrap();
        assert!(path.exists());

        store.clear().unwrap();
        assert!(!path.exists());
        assert!(store.get().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, b"{not json").unwrap();

        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.get().is_none());
    }
}
