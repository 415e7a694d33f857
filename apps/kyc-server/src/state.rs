// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::service::KycService;
use crate::storage::FileStorage;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: Arc<KycService>,
    /// Probed by readiness. Absent when running on in-memory collaborators.
    storage: Option<Arc<FileStorage>>,
}

impl AppState {
    pub fn new(service: Arc<KycService>) -> Self {
        Self {
            service,
            storage: None,
        }
    }

    pub fn with_storage(mut self, storage: Arc<FileStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn service(&self) -> &KycService {
        &self.service
    }

    pub fn storage(&self) -> Option<&FileStorage> {
        self.storage.as_deref()
    }
}
