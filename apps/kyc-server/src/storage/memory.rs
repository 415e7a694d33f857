// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory collaborators for tests and local experiments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{StorageError, StorageResult};
use crate::models::VerificationApplication;
use crate::service::{
    ApplicationStore, AuditRecord, AuditSink, DocumentBlobStore, Notice, Notifier, NotifyError,
};

/// Applications keyed by organization id.
#[derive(Debug, Clone, Default)]
pub struct MemoryApplicationStore {
    records: Arc<RwLock<HashMap<String, VerificationApplication>>>,
}

impl MemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw access for assertions.
    pub async fn snapshot(&self, organization_id: &str) -> Option<VerificationApplication> {
        self.records.read().await.get(organization_id).cloned()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn find_by_organization(
        &self,
        organization_id: &str,
    ) -> StorageResult<Option<VerificationApplication>> {
        Ok(self.records.read().await.get(organization_id).cloned())
    }

    async fn find_by_check_id(
        &self,
        check_id: &str,
    ) -> StorageResult<Option<VerificationApplication>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|app| app.provider_state.check_id() == Some(check_id))
            .cloned())
    }

    async fn find_by_applicant_id(
        &self,
        applicant_id: &str,
    ) -> StorageResult<Option<VerificationApplication>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|app| app.provider_state.applicant_id() == Some(applicant_id))
            .cloned())
    }

    async fn insert(&self, app: &VerificationApplication) -> StorageResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&app.organization_id) {
            return Err(StorageError::AlreadyExists(format!(
                "application for organization {}",
                app.organization_id
            )));
        }
        records.insert(app.organization_id.clone(), app.clone());
        Ok(())
    }

    async fn update(
        &self,
        mut app: VerificationApplication,
        expected_version: u64,
    ) -> StorageResult<VerificationApplication> {
        let mut records = self.records.write().await;
        let current = records.get(&app.organization_id).ok_or_else(|| {
            StorageError::NotFound(format!("application for organization {}", app.organization_id))
        })?;
        if current.version != expected_version {
            return Err(StorageError::Conflict {
                resource: format!("application {}", app.id),
                expected: expected_version,
                found: current.version,
            });
        }
        app.version = expected_version + 1;
        app.updated_at = Utc::now();
        records.insert(app.organization_id.clone(), app.clone());
        Ok(app)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) -> StorageResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

/// Keeps every notice it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<RwLock<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.notices.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.notices.write().await.push(notice.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, storage_key: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(storage_key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl DocumentBlobStore for MemoryDocumentStore {
    async fn put(
        &self,
        organization_id: &str,
        _file_name: &str,
        bytes: &[u8],
    ) -> StorageResult<String> {
        let key = format!("{organization_id}/{}", uuid::Uuid::new_v4());
        self.blobs.write().await.insert(key.clone(), bytes.to_vec());
        Ok(key)
    }
}
