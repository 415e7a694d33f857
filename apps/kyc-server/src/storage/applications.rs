// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-file application store: one record per organization under
//! `applications/{organization_id}.json`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{FileStorage, StorageError, StorageResult};
use crate::models::VerificationApplication;
use crate::service::ApplicationStore;

/// Filesystem-backed [`ApplicationStore`].
///
/// Writers are serialized by a process-wide lock so the version check and
/// the write happen atomically.
#[derive(Debug, Clone)]
pub struct FileApplicationStore {
    storage: Arc<FileStorage>,
    write_lock: Arc<Mutex<()>>,
}

impl FileApplicationStore {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self {
            storage,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Whatever record occupies the organization's file.
    fn read_slot(&self, organization_id: &str) -> StorageResult<Option<VerificationApplication>> {
        self.storage
            .read_json_opt(self.storage.paths().application(organization_id))
    }

    /// File names are a lossy mapping of organization ids, so the stored id
    /// must match exactly.
    fn read(&self, organization_id: &str) -> StorageResult<Option<VerificationApplication>> {
        Ok(self
            .read_slot(organization_id)?
            .filter(|app| app.organization_id == organization_id))
    }

    /// Scan every record; used by correlation-id lookups.
    fn find_where<P>(&self, predicate: P) -> StorageResult<Option<VerificationApplication>>
    where
        P: Fn(&VerificationApplication) -> bool,
    {
        let dir = self.storage.paths().applications_dir();
        for stem in self.storage.list_files(&dir, "json")? {
            let path = dir.join(format!("{stem}.json"));
            let app: VerificationApplication = match self.storage.read_json(&path) {
                Ok(app) => app,
                Err(StorageError::NotFound(_)) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable application record");
                    continue;
                }
            };
            if predicate(&app) {
                return Ok(Some(app));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ApplicationStore for FileApplicationStore {
    async fn find_by_organization(
        &self,
        organization_id: &str,
    ) -> StorageResult<Option<VerificationApplication>> {
        self.read(organization_id)
    }

    async fn find_by_check_id(
        &self,
        check_id: &str,
    ) -> StorageResult<Option<VerificationApplication>> {
        self.find_where(|app| app.provider_state.check_id() == Some(check_id))
    }

    async fn find_by_applicant_id(
        &self,
        applicant_id: &str,
    ) -> StorageResult<Option<VerificationApplication>> {
        self.find_where(|app| app.provider_state.applicant_id() == Some(applicant_id))
    }

    async fn insert(&self, app: &VerificationApplication) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.read_slot(&app.organization_id)? {
            return Err(StorageError::AlreadyExists(format!(
                "application for organization {} (file held by {})",
                app.organization_id, existing.organization_id
            )));
        }
        self.storage
            .write_json(self.storage.paths().application(&app.organization_id), app)
    }

    async fn update(
        &self,
        mut app: VerificationApplication,
        expected_version: u64,
    ) -> StorageResult<VerificationApplication> {
        let _guard = self.write_lock.lock().await;
        let current = self.read(&app.organization_id)?.ok_or_else(|| {
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
        self.storage
            .write_json(self.storage.paths().application(&app.organization_id), &app)?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_fixtures::application;
    use crate::storage::StoragePaths;

    fn store() -> (tempfile::TempDir, FileApplicationStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(dir.path()));
        storage.initialize().unwrap();
        (dir, FileApplicationStore::new(Arc::new(storage)))
    }

    #[tokio::test]
    async fn insert_then_find() {
        let (_dir, store) = store();
        let app = application("org-1");
        store.insert(&app).await.unwrap();

        let found = store.find_by_organization("org-1").await.unwrap().unwrap();
        assert_eq!(found, app);
        assert!(store.find_by_organization("org-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_refused() {
        let (_dir, store) = store();
        store.insert(&application("org-1")).await.unwrap();
        let err = store.insert(&application("org-1")).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn colliding_file_names_never_share_a_record() {
        let (_dir, store) = store();
        let app = application("acme_corp");
        store.insert(&app).await.unwrap();

        assert!(store.find_by_organization("acme corp").await.unwrap().is_none());
        let err = store.insert(&application("acme corp")).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        let err = store
            .update(application("acme corp"), app.version)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let found = store.find_by_organization("acme_corp").await.unwrap().unwrap();
        assert_eq!(found, app);
    }

    #[tokio::test]
    async fn update_checks_version() {
        let (_dir, store) = store();
        let app = application("org-1");
        store.insert(&app).await.unwrap();

        let saved = store.update(app.clone(), app.version).await.unwrap();
        assert_eq!(saved.version, app.version + 1);

        let err = store.update(app.clone(), app.version).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn correlation_lookups_scan_records() {
        let (_dir, store) = store();
        let mut app = application("org-1");
        app.provider_state.applicant = Some(crate::models::ProviderApplicant {
            id: "app_1".to_string(),
            href: "/applicants/app_1".to_string(),
            created_at: Utc::now(),
        });
        store.insert(&application("org-0")).await.unwrap();
        store.insert(&app).await.unwrap();

        let found = store.find_by_applicant_id("app_1").await.unwrap().unwrap();
        assert_eq!(found.organization_id, "org-1");
        assert!(store.find_by_check_id("chk_1").await.unwrap().is_none());
    }
}
