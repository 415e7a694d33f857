// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plain filesystem operations under the data directory.
//!
//! Records are written atomically (temp file + rename). Sensitive fields are
//! encrypted by the orchestration layer before they reach this module, so
//! nothing here handles cleartext secrets.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use super::StoragePaths;

/// Failure of a persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Insert raced another writer for the same key.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Version conflict on {resource}: expected {expected}, found {found}")]
    Conflict {
        resource: String,
        expected: u64,
        found: u64,
    },

    #[error("Storage not initialized")]
    NotInitialized,

    /// Queue or blob store failure.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// A concurrent writer got there first; the caller may re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::Conflict { .. } | StorageError::AlreadyExists(_)
        )
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(e.to_string()),
            _ => StorageError::Io(e),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Filesystem storage rooted at the data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    paths: StoragePaths,
    initialized: bool,
}

impl FileStorage {
    /// Does NOT create the directory structure. Call `initialize()` first.
    pub fn new(paths: StoragePaths) -> Self {
        Self {
            paths,
            initialized: false,
        }
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    /// Create the directory layout. Idempotent.
    pub fn initialize(&mut self) -> StorageResult<()> {
        let dirs = [
            self.paths.applications_dir(),
            self.paths.documents_dir(),
            self.paths.audit_dir(),
        ];
        for dir in dirs {
            fs::create_dir_all(&dir)?;
        }

        self.initialized = true;
        Ok(())
    }

    /// Write-read-delete probe used by the readiness endpoint.
    pub fn health_check(&self) -> StorageResult<()> {
        self.ensure_initialized()?;

        let probe = self.paths.root().join(".health_check");
        let data = b"health_check_data";
        fs::write(&probe, data)?;
        let read_back = fs::read(&probe)?;
        fs::remove_file(&probe)?;

        if read_back != data {
            return Err(StorageError::Backend(
                "health check data mismatch".to_string(),
            ));
        }
        Ok(())
    }

    // ========== JSON Records ==========

    pub fn read_json<T: DeserializeOwned>(&self, path: impl AsRef<Path>) -> StorageResult<T> {
        self.ensure_initialized()?;
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Read a JSON record, mapping a missing file to `None`.
    pub fn read_json_opt<T: DeserializeOwned>(
        &self,
        path: impl AsRef<Path>,
    ) -> StorageResult<Option<T>> {
        match self.read_json(path) {
            Ok(value) => Ok(Some(value)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Write a JSON file (atomic write via rename).
    pub fn write_json<T: Serialize>(&self, path: impl AsRef<Path>, value: &T) -> StorageResult<()> {
        self.ensure_initialized()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    /// List file stems with the given extension in a directory.
    pub fn list_files(&self, dir: impl AsRef<Path>, extension: &str) -> StorageResult<Vec<String>> {
        self.ensure_initialized()?;
        let dir = dir.as_ref();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut stems = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != extension) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
        stems.sort();
        Ok(stems)
    }

    // ========== Raw Files ==========

    pub fn write_raw(&self, path: impl AsRef<Path>, data: &[u8]) -> StorageResult<()> {
        self.ensure_initialized()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    pub fn read_raw(&self, path: impl AsRef<Path>) -> StorageResult<Vec<u8>> {
        self.ensure_initialized()?;
        Ok(fs::read(path.as_ref())?)
    }

    /// Append one line to a file, creating it if needed.
    pub fn append_line(&self, path: impl AsRef<Path>, line: &str) -> StorageResult<()> {
        self.ensure_initialized()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    fn ensure_initialized(&self) -> StorageResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    fn test_storage() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(dir.path()));
        storage.initialize().expect("Failed to initialize test storage");
        (dir, storage)
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        id: String,
        value: i32,
    }

    #[test]
    fn initialize_creates_directories() {
        let (_dir, storage) = test_storage();
        assert!(storage.paths().applications_dir().exists());
        assert!(storage.paths().documents_dir().exists());
        assert!(storage.paths().audit_dir().exists());
    }

    #[test]
    fn write_and_read_json() {
        let (_dir, storage) = test_storage();
        let data = TestData {
            id: "org-1".to_string(),
            value: 42,
        };
        let path = storage.paths().application("org-1");
        storage.write_json(&path, &data).unwrap();

        let read: TestData = storage.read_json(&path).unwrap();
        assert_eq!(read, data);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn missing_json_reads_as_none() {
        let (_dir, storage) = test_storage();
        let read: Option<TestData> = storage
            .read_json_opt(storage.paths().application("nobody"))
            .unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn append_line_accumulates() {
        let (_dir, storage) = test_storage();
        let path = storage.paths().audit_events_file("2026-01-01");
        storage.append_line(&path, "one").unwrap();
        storage.append_line(&path, "two").unwrap();
        let content = String::from_utf8(storage.read_raw(&path).unwrap()).unwrap();
        assert_eq!(content, "one\ntwo\n");
    }

    #[test]
    fn list_files_returns_sorted_stems() {
        let (_dir, storage) = test_storage();
        for i in [3, 1, 2] {
            storage
                .write_json(storage.paths().application(&format!("org-{i}")), &TestData {
                    id: format!("org-{i}"),
                    value: i,
                })
                .unwrap();
        }
        let stems = storage
            .list_files(storage.paths().applications_dir(), "json")
            .unwrap();
        assert_eq!(stems, vec!["org-1", "org-2", "org-3"]);
    }

    #[test]
    fn health_check_works() {
        let (_dir, storage) = test_storage();
        storage.health_check().expect("Health check should pass");
    }

    #[test]
    fn uninitialized_storage_returns_error() {
        let storage = FileStorage::new(StoragePaths::new("/tmp/never-init"));
        let result = storage.read_json::<TestData>("/tmp/any.json");
        assert!(matches!(result, Err(StorageError::NotInitialized)));
    }

    #[test]
    fn conflict_display_names_versions() {
        let err = StorageError::Conflict {
            resource: "application org-1".to_string(),
            expected: 2,
            found: 3,
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Version conflict on application org-1: expected 2, found 3"
        );
    }
}
