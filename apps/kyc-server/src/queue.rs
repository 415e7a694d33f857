// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Durable queue of pending simulated check completions, backed by redb.
//!
//! ## Delivery
//!
//! Tasks are keyed by check id, so enqueueing the same check twice keeps a
//! single task. A task stays in the table until it is acknowledged with
//! [`SimulationQueue::ack`]; anything fetched but not acknowledged (worker
//! crash, processing failure) is delivered again on a later poll. Consumers
//! must therefore be idempotent.
//!
//! ## Table Layout
//!
//! - `simulation_tasks`: check_id → serialized [`SimulationTask`]

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::models::CheckType;
use crate::providers::ProviderKind;

const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("simulation_tasks");

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// A simulated check waiting for its synthetic completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationTask {
    pub check_id: String,
    pub organization_id: String,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_id: Option<String>,
    pub check_types: Vec<CheckType>,
    pub due_at: DateTime<Utc>,
    /// Number of failed delivery attempts so far.
    #[serde(default)]
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

pub struct SimulationQueue {
    db: Database,
}

impl std::fmt::Debug for SimulationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationQueue").finish_non_exhaustive()
    }
}

impl SimulationQueue {
    /// Open (or create) the queue database at the given path.
    pub fn open(path: &Path) -> QueueResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create the table so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(TASKS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Insert or replace the task for its check.
    pub fn enqueue(&self, task: &SimulationTask) -> QueueResult<()> {
        let json = serde_json::to_vec(task)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TASKS)?;
            table.insert(task.check_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Tasks due at or before `now`, earliest first, at most `limit`.
    ///
    /// Fetching does not remove anything.
    pub fn due(&self, now: DateTime<Utc>, limit: usize) -> QueueResult<Vec<SimulationTask>> {
        let mut due = Vec::new();
        for task in self.all()? {
            if task.due_at <= now {
                due.push(task);
            }
        }
        due.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.check_id.cmp(&b.check_id)));
        due.truncate(limit);
        Ok(due)
    }

    /// Every queued task, in key order.
    pub fn all(&self) -> QueueResult<Vec<SimulationTask>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TASKS)?;
        let mut tasks = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            tasks.push(serde_json::from_slice(value.value())?);
        }
        Ok(tasks)
    }

    pub fn get(&self, check_id: &str) -> QueueResult<Option<SimulationTask>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TASKS)?;
        match table.get(check_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Acknowledge successful processing. Returns false if already gone.
    pub fn ack(&self, check_id: &str) -> QueueResult<bool> {
        self.remove(check_id)
    }

    /// Drop a task without processing it (e.g. the check was cancelled).
    pub fn remove(&self, check_id: &str) -> QueueResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(TASKS)?;
            let removed = table.remove(check_id)?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Record a failed attempt and push the task back to `next_due`.
    pub fn retry_later(&self, check_id: &str, next_due: DateTime<Utc>) -> QueueResult<bool> {
        let write_txn = self.db.begin_write()?;
        let found = {
            let mut table = write_txn.open_table(TASKS)?;
            let existing_bytes = table.get(check_id)?.map(|v| v.value().to_vec());
            match existing_bytes {
                Some(bytes) => {
                    let mut task: SimulationTask = serde_json::from_slice(&bytes)?;
                    task.attempts += 1;
                    task.due_at = next_due;
                    let json = serde_json::to_vec(&task)?;
                    table.insert(check_id, json.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(found)
    }
}
