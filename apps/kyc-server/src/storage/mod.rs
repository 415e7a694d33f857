// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Reference implementations of the persistence collaborators used by the
//! orchestration service. Everything lives under the data directory
//! (`DATA_DIR`, default `/data`).
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   applications/
//!     {organization_id}.json      # VerificationApplication record
//!   documents/
//!     {organization_id}/{uuid}    # Uploaded document bytes
//!   audit/
//!     {date}/events.jsonl         # Daily audit logs
//!   queue/
//!     simulation.redb             # Pending simulated completions
//! ```
//!
//! ## Important Notes
//!
//! - Sensitive scalars and document references are encrypted by the
//!   orchestration layer before they are written here
//! - [`memory`] provides lock-protected in-memory stand-ins for tests

pub mod applications;
pub mod audit;
pub mod documents;
pub mod files;
pub mod memory;
pub mod paths;

pub use applications::FileApplicationStore;
pub use audit::FileAuditSink;
pub use documents::FsDocumentStore;
pub use files::{FileStorage, StorageError, StorageResult};
pub use memory::{MemoryApplicationStore, MemoryAuditSink, MemoryDocumentStore, RecordingNotifier};
pub use paths::StoragePaths;
