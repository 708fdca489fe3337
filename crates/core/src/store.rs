//! Document storage
//!
//! The engine reads and writes annotation documents through [`DocumentStore`]
//! so hosts can keep them wherever they like. [`FsDocumentStore`] keeps them
//! as files and replaces them atomically (temp file + rename).

use crate::persistence::{self, CodecError};
use inkleaf_model::Document;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait DocumentStore: Send + Sync {
    fn read(&self, path: &Path) -> StoreResult<Vec<u8>>;
    fn write(&self, path: &Path, bytes: &[u8]) -> StoreResult<()>;
}

/// Files on the local file system.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentStore;

impl FsDocumentStore {
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl DocumentStore for FsDocumentStore {
    fn read(&self, path: &Path) -> StoreResult<Vec<u8>> {
        fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io(err),
        })
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp_path = Self::temp_path(path);
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// In-memory store for tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files().insert(path.into(), bytes);
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files().get(path).cloned()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn read(&self, path: &Path) -> StoreResult<Vec<u8>> {
        self.get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> StoreResult<()> {
        self.insert(path, bytes.to_vec());
        Ok(())
    }
}

/// Load a document. A missing, unreadable or malformed file gives a blank document.
#[instrument(skip(store, path), fields(path = %path.display()))]
pub fn load_document(store: &dyn DocumentStore, path: &Path) -> Document {
    match store.read(path) {
        Ok(bytes) => persistence::decode(&bytes),
        Err(StoreError::NotFound(_)) => {
            info!("no saved annotations; starting blank");
            Document::blank()
        }
        Err(err) => {
            warn!(%err, "failed to read annotations; starting blank");
            Document::blank()
        }
    }
}

/// Encode and write a document.
#[instrument(skip(store, path, document), fields(path = %path.display()))]
pub fn save_document(store: &dyn DocumentStore, path: &Path, document: &Document) -> StoreResult<()> {
    let bytes = persistence::encode(document)?;
    store.write(path, &bytes)?;
    info!(bytes = bytes.len(), "saved annotations");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkleaf_model::{Color, GridStyle, Page, Point, Stroke};
    use tempfile::TempDir;

    fn document() -> Document {
        let mut page = Page::new(GridStyle::Square);
        page.annotations
            .push(Stroke::new(vec![Point::new(1.0, 1.0)], Color::BLUE, 2.0, false, 0).into());
        Document::new(vec![page])
    }

    #[test]
    fn test_fs_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes").join("doc.inkleaf.json");
        let store = FsDocumentStore::new();

        save_document(&store, &path, &document()).unwrap();
        assert!(path.exists());
        assert!(!FsDocumentStore::temp_path(&path).exists());
        assert_eq!(load_document(&store, &path), document());
    }

    #[test]
    fn test_fs_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new();
        let path = dir.path().join("absent.json");

        assert!(matches!(store.read(&path), Err(StoreError::NotFound(_))));
        assert_eq!(load_document(&store, &path), Document::blank());
    }

    #[test]
    fn test_corrupt_file_loads_blank() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("corrupt.json");
        fs::write(&path, b"{\"pages\": [").unwrap();

        assert_eq!(load_document(&FsDocumentStore::new(), &path), Document::blank());
    }

    #[test]
    fn test_directory_read_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = FsDocumentStore::new();
        assert!(matches!(store.read(dir.path()), Err(StoreError::Io(_))));
        assert_eq!(load_document(&store, dir.path()), Document::blank());
    }

    #[test]
    fn test_resave_is_idempotent() {
        let store = MemoryDocumentStore::new();
        let path = Path::new("doc.json");
        save_document(&store, path, &document()).unwrap();
        let first = store.get(path).unwrap();
        save_document(&store, path, &load_document(&store, path)).unwrap();
        assert_eq!(store.get(path).unwrap(), first);
    }

    #[test]
    fn test_write_to_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        // A regular file cannot act as a parent directory.
        let result = save_document(&FsDocumentStore::new(), &blocker.join("doc.json"), &document());
        assert!(matches!(result, Err(StoreError::Io(_))));
    }
}
