// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path layout of the data directory.

use std::path::{Path, PathBuf};

use crate::config::DEFAULT_DATA_DIR;

/// Storage path utilities for the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Application Paths ==========

    /// Directory containing one record per organization.
    pub fn applications_dir(&self) -> PathBuf {
        self.root.join("applications")
    }

    /// Path to an organization's application record.
    pub fn application(&self, organization_id: &str) -> PathBuf {
        self.applications_dir()
            .join(format!("{}.json", file_stem(organization_id)))
    }

    // ========== Document Paths ==========

    /// Directory containing uploaded document blobs.
    pub fn documents_dir(&self) -> PathBuf {
        self.root.join("documents")
    }

    /// Path to a document blob addressed by its storage key.
    pub fn document(&self, storage_key: &str) -> PathBuf {
        let mut path = self.documents_dir();
        for segment in storage_key.split('/') {
            path.push(file_stem(segment));
        }
        path
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Daily audit log file (`YYYY-MM-DD`).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date).join("events.jsonl")
    }

    // ========== Queue ==========

    /// redb database holding pending simulated completions.
    pub fn queue_db(&self) -> PathBuf {
        self.root.join("queue").join("simulation.redb")
    }
}

/// Reduce an identifier to a safe single path component.
fn file_stem(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        stem => stem.to_string(),
    }
}
