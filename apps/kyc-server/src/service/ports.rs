// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Collaborator interfaces used by the orchestration service.
//!
//! Reference implementations live in [`crate::storage`] (filesystem and
//! in-memory) and [`super::notify`] (tracing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{ApplicationStatus, VerificationApplication};
use crate::storage::StorageResult;

/// Persistence of [`VerificationApplication`] records.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn find_by_organization(
        &self,
        organization_id: &str,
    ) -> StorageResult<Option<VerificationApplication>>;

    /// Application whose current check has this id.
    async fn find_by_check_id(&self, check_id: &str)
        -> StorageResult<Option<VerificationApplication>>;

    /// Application whose provider applicant has this id.
    async fn find_by_applicant_id(
        &self,
        applicant_id: &str,
    ) -> StorageResult<Option<VerificationApplication>>;

    /// Store a new record. Fails with `AlreadyExists` when the organization
    /// already has one.
    async fn insert(&self, app: &VerificationApplication) -> StorageResult<()>;

    /// Replace the record if its stored version still equals
    /// `expected_version`, otherwise fail with `Conflict`.
    ///
    /// Returns the persisted record with `version` incremented.
    async fn update(
        &self,
        app: VerificationApplication,
        expected_version: u64,
    ) -> StorageResult<VerificationApplication>;
}

/// One audit trail entry. `metadata` never carries unmasked sensitive values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub resource: String,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            action: action.into(),
            resource: resource.into(),
            resource_id: resource_id.into(),
            actor_id: None,
            metadata: serde_json::Value::Null,
            ip_address: None,
        }
    }

    pub fn with_actor(mut self, actor_id: Option<&str>) -> Self {
        self.actor_id = actor_id.map(str::to_string);
        self
    }

    pub fn with_ip(mut self, ip_address: Option<&str>) -> Self {
        self.ip_address = ip_address.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> StorageResult<()>;
}

/// Status notification for an organization. `summary` is already redacted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub organization_id: String,
    pub application_id: String,
    pub status: ApplicationStatus,
    pub summary: String,
    pub simulated: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Opaque storage for uploaded document bytes.
#[async_trait]
pub trait DocumentBlobStore: Send + Sync {
    /// Store the bytes and return the storage key that addresses them.
    async fn put(
        &self,
        organization_id: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> StorageResult<String>;
}
