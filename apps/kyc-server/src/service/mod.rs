// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Orchestration Service
//!
//! Drives an organization's verification application through the active
//! provider adapter:
//!
//! 1. `submit_application` creates (or resubmits) the record
//! 2. `initiate_verification` opens the vendor applicant
//! 3. `submit_document` uploads evidence
//! 4. `create_verification_check` starts a vendor check
//! 5. results arrive via `process_webhook`, `get_check_status` polling or
//!    the simulation worker, and all of them go through the same ingestion
//!    path
//!
//! Every persisted change is a read-modify-write guarded by the record's
//! version; conflicting writers re-read and retry a bounded number of times.

mod applications;
mod ingest;
pub mod notify;
pub mod ports;
mod verification;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

pub use ingest::{EventSource, IngestOutcome};
pub use notify::TracingNotifier;
pub use ports::{
    ApplicationStore, AuditRecord, AuditSink, DocumentBlobStore, Notice, Notifier, NotifyError,
};
pub use verification::DocumentSubmission;

use crate::config::{KycConfig, DEFAULT_SIMULATION_DELAY};
use crate::crypto::{mask_sensitive, FieldCipher};
use crate::error::KycError;
use crate::models::{ApplicationStatus, ApplicationView, DocumentView, VerificationApplication};
use crate::providers::{ProviderRegistry, VerificationProvider};
use crate::queue::SimulationQueue;

/// Attempts of one read-modify-write before a version conflict is surfaced.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

pub const MAX_ORGANIZATION_ID_LEN: usize = 128;

const RESOURCE: &str = "verification_application";

/// Audit action names.
pub mod actions {
    pub const APPLICATION_SUBMITTED: &str = "application.submitted";
    pub const VERIFICATION_INITIATED: &str = "verification.initiated";
    pub const DOCUMENT_SUBMITTED: &str = "document.submitted";
    pub const CHECK_CREATED: &str = "verification.check_created";
    pub const CHECK_CANCELLED: &str = "verification.check_cancelled";
    pub const EVENT_INGESTED: &str = "verification.event_ingested";
    pub const REVIEW_DECISION: &str = "review.decision_recorded";
    pub const DOCUMENT_URL_ISSUED: &str = "document.download_url_issued";
}

/// Who is calling, for the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: Option<String>,
    pub ip_address: Option<String>,
}

impl RequestContext {
    pub fn new(actor_id: Option<String>, ip_address: Option<String>) -> Self {
        Self {
            actor_id,
            ip_address,
        }
    }

    /// Context for work the service does on its own behalf.
    pub fn system(component: &str) -> Self {
        Self {
            actor_id: Some(format!("system:{component}")),
            ip_address: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Accept webhooks for adapters without a secret. Never in production.
    pub allow_unsigned_webhooks: bool,
    /// Delay before a simulated check completes.
    pub simulation_delay: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            allow_unsigned_webhooks: false,
            simulation_delay: DEFAULT_SIMULATION_DELAY,
        }
    }
}

impl ServiceSettings {
    pub fn from_config(config: &KycConfig) -> Self {
        Self {
            allow_unsigned_webhooks: config.allow_unsigned_webhooks,
            simulation_delay: config.simulation_delay,
        }
    }
}

/// External collaborators of the service.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ApplicationStore>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn Notifier>,
    pub documents: Arc<dyn DocumentBlobStore>,
}

pub struct KycService {
    store: Arc<dyn ApplicationStore>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
    documents: Arc<dyn DocumentBlobStore>,
    registry: ProviderRegistry,
    cipher: FieldCipher,
    queue: Option<Arc<SimulationQueue>>,
    settings: ServiceSettings,
}

impl std::fmt::Debug for KycService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KycService")
            .field("registry", &self.registry)
            .field("cipher", &self.cipher)
            .field("queue", &self.queue.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Organization ids name storage records, so they are restricted to
/// `[A-Za-z0-9_-]`.
pub(crate) fn validate_organization_id(organization_id: &str) -> Result<(), KycError> {
    if organization_id.is_empty() {
        return Err(KycError::validation("organization id is required"));
    }
    if organization_id.len() > MAX_ORGANIZATION_ID_LEN {
        return Err(KycError::validation(format!(
            "organization id exceeds {MAX_ORGANIZATION_ID_LEN} characters"
        )));
    }
    if !organization_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(KycError::validation(
            "organization id may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

impl KycService {
    pub fn new(
        collaborators: Collaborators,
        registry: ProviderRegistry,
        cipher: FieldCipher,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store: collaborators.store,
            audit: collaborators.audit,
            notifier: collaborators.notifier,
            documents: collaborators.documents,
            registry,
            cipher,
            queue: None,
            settings,
        }
    }

    /// Durable queue for simulated check completions.
    pub fn with_queue(mut self, queue: Arc<SimulationQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn queue(&self) -> Option<&Arc<SimulationQueue>> {
        self.queue.as_ref()
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    // =========================================================================
    // Shared helpers
    // =========================================================================

    async fn load(&self, organization_id: &str) -> Result<VerificationApplication, KycError> {
        validate_organization_id(organization_id)?;
        self.store
            .find_by_organization(organization_id)
            .await?
            .ok_or_else(|| {
                KycError::not_found(format!("application for organization {organization_id}"))
            })
    }

    /// Adapter of the provider recorded on the application.
    fn adapter_for(
        &self,
        app: &VerificationApplication,
    ) -> Result<Arc<dyn VerificationProvider>, KycError> {
        let kind = app.provider_state.provider;
        self.registry.get(kind).ok_or_else(|| {
            KycError::Configuration(format!("no adapter registered for provider {kind}"))
        })
    }

    /// Read-modify-write of one organization's record.
    ///
    /// `mutate` may run more than once: it is re-applied to a fresh copy
    /// after every version conflict.
    async fn modify<T, F>(
        &self,
        organization_id: &str,
        mut mutate: F,
    ) -> Result<(VerificationApplication, T), KycError>
    where
        F: FnMut(&mut VerificationApplication) -> Result<T, KycError> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut app = self.load(organization_id).await?;
            let version = app.version;
            let value = mutate(&mut app)?;
            match self.store.update(app, version).await {
                Ok(saved) => return Ok((saved, value)),
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(
                        organization_id,
                        attempt,
                        error = %e,
                        "Version conflict, re-reading application"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Audit failures are logged; the state change they describe is
    /// already durable.
    async fn audit(&self, record: AuditRecord) {
        let action = record.action.clone();
        if let Err(e) = self.audit.record(record).await {
            warn!(action = %action, error = %e, "Failed to write audit record");
        }
    }

    fn audit_record(
        &self,
        action: &str,
        app: &VerificationApplication,
        ctx: &RequestContext,
        metadata: serde_json::Value,
    ) -> AuditRecord {
        AuditRecord::new(action, RESOURCE, app.id.clone())
            .with_actor(ctx.actor_id.as_deref())
            .with_ip(ctx.ip_address.as_deref())
            .with_metadata(metadata)
    }

    async fn notify(&self, app: &VerificationApplication) {
        let notice = Notice {
            organization_id: app.organization_id.clone(),
            application_id: app.id.clone(),
            status: app.status,
            summary: notice_summary(app),
            simulated: app.provider_state.simulated,
        };
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(
                organization_id = %app.organization_id,
                status = %app.status,
                error = %e,
                "Failed to dispatch verification notice"
            );
        }
    }

    /// Redacted read model; undecryptable fields are omitted.
    fn view(&self, app: &VerificationApplication) -> ApplicationView {
        let masked = |label: &str, field: Option<&crate::crypto::EncryptedField>| {
            let field = field?;
            match self.cipher.decrypt(field) {
                Ok(value) => Some(mask_sensitive(&value)),
                Err(e) => {
                    warn!(
                        application_id = %app.id,
                        field = label,
                        error = %e,
                        "Omitting sensitive field that failed to decrypt"
                    );
                    None
                }
            }
        };

        ApplicationView {
            id: app.id.clone(),
            organization_id: app.organization_id.clone(),
            id_type: app.id_type,
            status: app.status,
            legal_name: app.legal_name.clone(),
            verification_score: app.verification_score,
            id_verified: app.id_verified,
            address_verified: app.address_verified,
            business_verified: app.business_verified,
            submitted_at: app.submitted_at,
            reviewed_at: app.reviewed_at,
            expires_at: app.expires_at,
            rejection_reason: app.rejection_reason.clone(),
            provider: app.provider_state.provider,
            simulated: app.provider_state.simulated,
            applicant: app.provider_state.applicant.clone(),
            check: app.provider_state.check.clone(),
            documents: app
                .provider_state
                .documents
                .iter()
                .map(DocumentView::from)
                .collect(),
            tax_id_masked: masked("tax_id", app.sensitive.tax_id.as_ref()),
            registration_number_masked: masked(
                "registration_number",
                app.sensitive.registration_number.as_ref(),
            ),
        }
    }
}

/// Notification text for the application's current status. Carries no
/// identifiers or sensitive values.
fn notice_summary(app: &VerificationApplication) -> String {
    match app.status {
        ApplicationStatus::Approved => match app.expires_at {
            Some(expires_at) => format!(
                "Verification approved; valid until {}",
                expires_at.format("%Y-%m-%d")
            ),
            None => "Verification approved".to_string(),
        },
        ApplicationStatus::Rejected => format!(
            "Verification rejected: {}",
            app.rejection_reason.as_deref().unwrap_or("no reason given")
        ),
        ApplicationStatus::DocumentsSubmitted if app.reviewed_at.is_some() => {
            "Additional information required to complete verification".to_string()
        }
        ApplicationStatus::DocumentsSubmitted => {
            "Verification application received and pending review".to_string()
        }
        ApplicationStatus::UnderReview => "Verification in progress".to_string(),
        ApplicationStatus::NotStarted => "Verification not started".to_string(),
    }
}
