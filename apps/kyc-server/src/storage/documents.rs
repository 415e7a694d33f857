// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filesystem document blob store. Keys have the form
//! `{organization_id}/{uuid}` and are only ever persisted encrypted.

use std::sync::Arc;

use async_trait::async_trait;

use super::{FileStorage, StorageResult};
use crate::service::DocumentBlobStore;

#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    storage: Arc<FileStorage>,
}

impl FsDocumentStore {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self { storage }
    }

    pub fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.storage
            .read_raw(self.storage.paths().document(storage_key))
    }
}

#[async_trait]
impl DocumentBlobStore for FsDocumentStore {
    async fn put(
        &self,
        organization_id: &str,
        _file_name: &str,
        bytes: &[u8],
    ) -> StorageResult<String> {
        let key = format!("{organization_id}/{}", uuid::Uuid::new_v4());
        self.storage
            .write_raw(self.storage.paths().document(&key), bytes)?;
        Ok(key)
    }
}
