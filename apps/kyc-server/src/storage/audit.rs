// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit trail for verification lifecycle operations.
//!
//! Every state-changing orchestration step is appended to a daily JSONL
//! file under `audit/{date}/events.jsonl`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{FileStorage, StorageError, StorageResult};
use crate::service::{AuditRecord, AuditSink};

/// Filesystem-backed [`AuditSink`].
#[derive(Debug, Clone)]
pub struct FileAuditSink {
    storage: Arc<FileStorage>,
    append_lock: Arc<Mutex<()>>,
}

impl FileAuditSink {
    pub fn new(storage: Arc<FileStorage>) -> Self {
        Self {
            storage,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditRecord>> {
        let path = self.storage.paths().audit_events_file(date);
        let content = match self.storage.read_raw(&path) {
            Ok(content) => content,
            Err(StorageError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let content_str = String::from_utf8(content).map_err(|e| {
            StorageError::Backend(format!("Invalid UTF-8 in audit log: {e}"))
        })?;

        let mut events = Vec::new();
        for line in content_str.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, record: AuditRecord) -> StorageResult<()> {
        let date = record.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);
        let line = serde_json::to_string(&record)?;

        let _guard = self.append_lock.lock().await;
        self.storage.append_line(&path, &line)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::storage::StoragePaths;

    fn setup() -> (tempfile::TempDir, FileAuditSink) {
        let temp = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, FileAuditSink::new(Arc::new(storage)))
    }

    #[test]
    fn builder_sets_fields() {
        let record = AuditRecord::new("application.submitted", "verification_application", "app-1")
            .with_actor(Some("user_123"))
            .with_ip(Some("192.168.1.1"))
            .with_metadata(json!({ "taxIdMasked": "12******89" }));

        assert_eq!(record.actor_id.as_deref(), Some("user_123"));
        assert_eq!(record.ip_address.as_deref(), Some("192.168.1.1"));
        assert_eq!(record.metadata["taxIdMasked"], "12******89");
    }

    #[tokio::test]
    async fn record_and_read_events() {
        let (_temp, sink) = setup();
        sink.record(AuditRecord::new("application.submitted", "verification_application", "a1"))
            .await
            .unwrap();
        sink.record(AuditRecord::new("verification.initiated", "verification_application", "a2"))
            .await
            .unwrap();

        let today = Utc::now().format("%Y-%m-%d").to_string();
        let events = sink.read_events(&today).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, "application.submitted");
        assert_eq!(events[1].action, "verification.initiated");
    }

    #[test]
    fn missing_day_is_empty() {
        let (_temp, sink) = setup();
        assert!(sink.read_events("1999-01-01").unwrap().is_empty());
    }
}
