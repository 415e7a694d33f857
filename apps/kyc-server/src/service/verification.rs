// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vendor-facing lifecycle steps: applicant creation, document upload,
//! check creation and cancellation, document download links.

use chrono::{TimeDelta, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::{actions, KycService, RequestContext, MAX_CONFLICT_RETRIES};
use crate::error::KycError;
use crate::models::{
    CheckStatus, CheckType, DocumentSide, DocumentType, DocumentView, ProviderApplicant,
    SubmittedDocument, VerificationApplication, VerificationCheck,
};
use crate::providers::{ApplicantProfile, ApplicantRecord, DocumentUpload};
use crate::queue::SimulationTask;
use crate::workflow;

/// A document handed to [`KycService::submit_document`].
#[derive(Debug, Clone)]
pub struct DocumentSubmission {
    pub document_type: DocumentType,
    pub side: Option<DocumentSide>,
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

fn applicant_profile(app: &VerificationApplication) -> ApplicantProfile {
    ApplicantProfile {
        external_id: app.organization_id.clone(),
        legal_name: app.legal_name.clone(),
        email: app.contact_email.clone(),
        address: app.address.clone(),
    }
}

fn require_active(app: &VerificationApplication, action: &str) -> Result<(), KycError> {
    if workflow::accepts_outcome(app.status) {
        Ok(())
    } else {
        Err(KycError::validation(format!(
            "cannot {action} while application is {}",
            app.status
        )))
    }
}

fn require_applicant(app: &VerificationApplication) -> Result<String, KycError> {
    app.provider_state
        .applicant_id()
        .map(str::to_string)
        .ok_or_else(|| KycError::validation("verification has not been initiated"))
}

/// Check types for the documents on file.
pub fn check_types_for(app: &VerificationApplication) -> Vec<CheckType> {
    let mut types = vec![CheckType::Document];
    if app.provider_state.has_address_document() {
        types.push(CheckType::ProofOfAddress);
    }
    types
}

fn is_open(status: CheckStatus) -> bool {
    !status.is_terminal()
}

impl KycService {
    /// Open the vendor applicant for the organization. Idempotent: an
    /// existing applicant is returned unchanged.
    pub async fn initiate_verification(
        &self,
        organization_id: &str,
        ctx: &RequestContext,
    ) -> Result<ProviderApplicant, KycError> {
        let mut created: Option<ApplicantRecord> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut app = self.load(organization_id).await?;

            if let Some(existing) = app.provider_state.applicant.clone() {
                if let Some(orphan) = &created {
                    warn!(
                        organization_id,
                        orphaned_applicant_id = %orphan.id,
                        applicant_id = %existing.id,
                        "Concurrent initiation won; upstream applicant left unused"
                    );
                }
                return Ok(existing);
            }
            require_active(&app, "initiate verification")?;

            let adapter = self.adapter_for(&app)?;
            let record = match created.take() {
                Some(record) => record,
                None => adapter.create_applicant(&applicant_profile(&app)).await?,
            };
            let applicant = ProviderApplicant {
                id: record.id.clone(),
                href: record.href.clone(),
                created_at: record.created_at,
            };

            let version = app.version;
            app.provider_state.applicant = Some(applicant.clone());
            app.provider_state.simulated = adapter.is_simulated();
            let change = workflow::begin_review(&mut app);

            match self.store.update(app, version).await {
                Ok(saved) => {
                    info!(
                        organization_id,
                        provider = %adapter.kind(),
                        applicant_id = %applicant.id,
                        simulated = adapter.is_simulated(),
                        "Verification initiated"
                    );
                    self.audit(self.audit_record(
                        actions::VERIFICATION_INITIATED,
                        &saved,
                        ctx,
                        json!({
                            "provider": adapter.kind(),
                            "applicantId": applicant.id,
                            "simulated": adapter.is_simulated(),
                            "previousStatus": change.map(|c| c.from),
                            "status": saved.status,
                        }),
                    ))
                    .await;
                    return Ok(applicant);
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(organization_id, attempt, "Version conflict during initiation, re-reading");
                    created = Some(record);
                }
                Err(e) => {
                    warn!(
                        organization_id,
                        orphaned_applicant_id = %record.id,
                        error = %e,
                        "Failed to persist new applicant"
                    );
                    return Err(e.into());
                }
            }
        }
    }

    /// Upload one document to the vendor and record its encrypted
    /// references. The returned view is appended at the end of the
    /// application's document list.
    pub async fn submit_document(
        &self,
        organization_id: &str,
        document: DocumentSubmission,
        ctx: &RequestContext,
    ) -> Result<DocumentView, KycError> {
        let app = self.load(organization_id).await?;
        require_active(&app, "submit documents")?;
        let applicant_id = require_applicant(&app)?;

        let file_name = document.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(KycError::validation("file name is required"));
        }
        if document.bytes.is_empty() {
            return Err(KycError::validation("document is empty"));
        }

        let adapter = self.adapter_for(&app)?;
        let storage_key = self
            .documents
            .put(organization_id, &file_name, &document.bytes)
            .await?;
        let uploaded = adapter
            .upload_document(
                &applicant_id,
                &DocumentUpload {
                    document_type: document.document_type,
                    side: document.side,
                    bytes: document.bytes,
                    file_name: file_name.clone(),
                    content_type: document.content_type.clone(),
                },
            )
            .await?;

        let submitted = SubmittedDocument {
            document_type: document.document_type,
            side: document.side,
            file_name,
            content_type: document.content_type,
            vendor_document_id: self.cipher.encrypt(&uploaded.id)?,
            storage_key: self.cipher.encrypt(&storage_key)?,
            uploaded_at: Utc::now(),
        };

        let (saved, index) = self
            .modify(organization_id, |app| {
                if app.provider_state.applicant_id() != Some(applicant_id.as_str()) {
                    return Err(KycError::validation(
                        "applicant changed while the document was uploading",
                    ));
                }
                app.provider_state.documents.push(submitted.clone());
                Ok(app.provider_state.documents.len() - 1)
            })
            .await?;

        info!(
            organization_id,
            provider = %adapter.kind(),
            document_type = ?submitted.document_type,
            index,
            "Document submitted"
        );
        self.audit(self.audit_record(
            actions::DOCUMENT_SUBMITTED,
            &saved,
            ctx,
            json!({
                "documentType": submitted.document_type,
                "side": submitted.side,
                "fileName": submitted.file_name,
                "documentIndex": index,
            }),
        ))
        .await;

        Ok(DocumentView::from(&submitted))
    }

    /// Start a vendor check over the submitted documents.
    pub async fn create_verification_check(
        &self,
        organization_id: &str,
        ctx: &RequestContext,
    ) -> Result<VerificationCheck, KycError> {
        let app = self.load(organization_id).await?;
        require_active(&app, "create a verification check")?;
        let applicant_id = require_applicant(&app)?;
        if app.provider_state.documents.is_empty() {
            return Err(KycError::validation(
                "at least one document must be submitted before a check",
            ));
        }
        if let Some(check) = &app.provider_state.check {
            if is_open(check.status) {
                return Err(KycError::validation(format!(
                    "check {} is still in progress",
                    check.id
                )));
            }
        }

        let check_types = check_types_for(&app);
        let adapter = self.adapter_for(&app)?;
        let record = adapter.create_check(&applicant_id, &check_types).await?;
        let check = VerificationCheck {
            id: record.id,
            status: record.status,
            check_types: check_types.clone(),
            created_at: record.created_at,
            result: None,
            breakdown: Default::default(),
            completed_at: None,
        };

        let (saved, change) = self
            .modify(organization_id, |app| {
                app.provider_state.check = Some(check.clone());
                Ok(workflow::begin_review(app))
            })
            .await?;

        if adapter.is_simulated() {
            self.schedule_simulated_completion(&saved, &check)?;
        }

        info!(
            organization_id,
            provider = %adapter.kind(),
            check_id = %check.id,
            check_types = ?check_types,
            "Verification check created"
        );
        self.audit(self.audit_record(
            actions::CHECK_CREATED,
            &saved,
            ctx,
            json!({
                "checkId": check.id,
                "checkTypes": check_types,
                "simulated": adapter.is_simulated(),
                "previousStatus": change.map(|c| c.from),
                "status": saved.status,
            }),
        ))
        .await;

        Ok(check)
    }

    fn schedule_simulated_completion(
        &self,
        app: &VerificationApplication,
        check: &VerificationCheck,
    ) -> Result<(), KycError> {
        let Some(queue) = &self.queue else {
            warn!(
                check_id = %check.id,
                "No simulation queue; simulated check completes only through polling"
            );
            return Ok(());
        };

        let now = Utc::now();
        let delay = TimeDelta::from_std(self.settings.simulation_delay).unwrap_or(TimeDelta::zero());
        let task = SimulationTask {
            check_id: check.id.clone(),
            organization_id: app.organization_id.clone(),
            provider: app.provider_state.provider,
            applicant_id: app.provider_state.applicant_id().map(str::to_string),
            check_types: check.check_types.clone(),
            due_at: now + delay,
            attempts: 0,
            enqueued_at: now,
        };
        queue.enqueue(&task)?;
        info!(check_id = %task.check_id, due_at = %task.due_at, "Simulated completion queued");
        Ok(())
    }

    /// Cancel the current check with the vendor and mark it `CANCELLED`.
    /// The application status is left as is.
    pub async fn cancel_verification_check(
        &self,
        organization_id: &str,
        ctx: &RequestContext,
    ) -> Result<VerificationCheck, KycError> {
        let app = self.load(organization_id).await?;
        let check = app
            .provider_state
            .check
            .clone()
            .ok_or_else(|| KycError::validation("there is no verification check to cancel"))?;
        match check.status {
            CheckStatus::Cancelled => return Ok(check),
            CheckStatus::Complete | CheckStatus::Expired => {
                return Err(KycError::validation(format!(
                    "check {} has already finished",
                    check.id
                )))
            }
            _ => {}
        }

        let adapter = self.adapter_for(&app)?;
        adapter.cancel_check(&check.id).await?;

        let (saved, cancelled) = self
            .modify(organization_id, |app| match app.provider_state.check.as_mut() {
                Some(current) if current.id == check.id => {
                    current.status = CheckStatus::Cancelled;
                    Ok(current.clone())
                }
                _ => Err(KycError::validation(
                    "the verification check changed while cancelling",
                )),
            })
            .await?;

        if let Some(queue) = &self.queue {
            if let Err(e) = queue.remove(&check.id) {
                warn!(check_id = %check.id, error = %e, "Failed to drop queued simulated completion");
            }
        }

        info!(organization_id, check_id = %check.id, "Verification check cancelled");
        self.audit(self.audit_record(
            actions::CHECK_CANCELLED,
            &saved,
            ctx,
            json!({ "checkId": check.id }),
        ))
        .await;

        Ok(cancelled)
    }

    /// Vendor download link for the document at `index`.
    pub async fn document_download_url(
        &self,
        organization_id: &str,
        index: usize,
        ctx: &RequestContext,
    ) -> Result<String, KycError> {
        let app = self.load(organization_id).await?;
        let document = app
            .provider_state
            .documents
            .get(index)
            .ok_or_else(|| KycError::not_found(format!("document {index}")))?;
        let vendor_document_id = self.cipher.decrypt(&document.vendor_document_id)?;

        let adapter = self.adapter_for(&app)?;
        let url = adapter.document_download_url(&vendor_document_id).await?;

        self.audit(self.audit_record(
            actions::DOCUMENT_URL_ISSUED,
            &app,
            ctx,
            json!({
                "documentIndex": index,
                "documentType": document.document_type,
            }),
        ))
        .await;
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::super::test_support::{harness_with, simulated_harness, Harness};
    use super::super::ServiceSettings;
    use super::*;
    use crate::models::{
        ApplicationStatus, ApplicationSubmission, CanonicalWebhookEvent, IdType,
        VerificationReport,
    };
    use crate::providers::{
        CheckRecord, ProviderError, ProviderKind, ProviderRegistry, UploadedDocument,
        VerificationProvider,
    };
    use crate::queue::SimulationQueue;

    fn submission() -> ApplicationSubmission {
        ApplicationSubmission {
            id_type: IdType::Ein,
            legal_name: "Acme Widgets LLC".to_string(),
            contact_email: "compliance@acme.test".to_string(),
            address: None,
            tax_id: "12-3456789".to_string(),
            registration_number: None,
        }
    }

    fn passport() -> DocumentSubmission {
        DocumentSubmission {
            document_type: DocumentType::Passport,
            side: Some(DocumentSide::Front),
            bytes: b"\xff\xd8passport".to_vec(),
            file_name: "passport.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Some("user-1".to_string()), None)
    }

    /// Adapter that counts applicant creations.
    #[derive(Default)]
    struct CountingProvider {
        applicants: AtomicUsize,
    }

    #[async_trait]
    impl VerificationProvider for CountingProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Onfido
        }
        fn is_simulated(&self) -> bool {
            false
        }
        fn signature_header(&self) -> &'static str {
            "X-SHA2-Signature"
        }
        fn webhook_secret(&self) -> Option<&str> {
            None
        }
        async fn create_applicant(
            &self,
            _profile: &ApplicantProfile,
        ) -> Result<ApplicantRecord, ProviderError> {
            let n = self.applicants.fetch_add(1, Ordering::SeqCst);
            Ok(ApplicantRecord {
                id: format!("app_{n}"),
                href: format!("/applicants/app_{n}"),
                created_at: Utc::now(),
            })
        }
        async fn upload_document(
            &self,
            _applicant_id: &str,
            _document: &DocumentUpload,
        ) -> Result<UploadedDocument, ProviderError> {
            Ok(UploadedDocument {
                id: "doc_1".to_string(),
                href: "/documents/doc_1".to_string(),
            })
        }
        async fn create_check(
            &self,
            _applicant_id: &str,
            _check_types: &[CheckType],
        ) -> Result<CheckRecord, ProviderError> {
            Ok(CheckRecord {
                id: "chk_1".to_string(),
                status: CheckStatus::InProgress,
                created_at: Utc::now(),
            })
        }
        async fn get_check(&self, check_id: &str) -> Result<VerificationReport, ProviderError> {
            Err(ProviderError::invalid_response(
                ProviderKind::Onfido,
                "get_check",
                format!("unexpected poll of {check_id}"),
            ))
        }
        async fn cancel_check(&self, _check_id: &str) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn document_download_url(&self, document_id: &str) -> Result<String, ProviderError> {
            Ok(format!("https://files.test/{document_id}"))
        }
        fn verify_webhook_signature(&self, _payload: &[u8], _signature: &str, _secret: &str) -> bool {
            false
        }
        fn parse_webhook(&self, _payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
            Err(ProviderError::invalid_webhook(ProviderKind::Onfido, "unused"))
        }
    }

    fn counting_harness() -> (Harness, Arc<CountingProvider>) {
        let provider = Arc::new(CountingProvider::default());
        let mut registry = ProviderRegistry::new(ProviderKind::Onfido);
        registry.register(provider.clone());
        (harness_with(registry, ServiceSettings::default()), provider)
    }

    #[tokio::test]
    async fn initiation_is_idempotent() {
        let (h, provider) = counting_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();

        let first = h.service.initiate_verification("org-1", &ctx()).await.unwrap();
        let second = h.service.initiate_verification("org-1", &ctx()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.applicants.load(Ordering::SeqCst), 1);
        let stored = h.store.snapshot("org-1").await.unwrap();
        assert_eq!(stored.status, ApplicationStatus::UnderReview);
        assert!(!stored.provider_state.simulated);
    }

    #[tokio::test]
    async fn initiation_requires_an_application() {
        let (h, provider) = counting_harness();
        let err = h
            .service
            .initiate_verification("org-1", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::NotFound(_)));
        assert_eq!(provider.applicants.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn document_before_initiation_is_invalid() {
        let h = simulated_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        let err = h
            .service
            .submit_document("org-1", passport(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::Validation(_)));
        assert_eq!(h.documents.len().await, 0);
    }

    #[tokio::test]
    async fn documents_are_stored_encrypted() {
        let (h, _) = counting_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        h.service.initiate_verification("org-1", &ctx()).await.unwrap();
        let view = h
            .service
            .submit_document("org-1", passport(), &ctx())
            .await
            .unwrap();
        assert_eq!(view.document_type, DocumentType::Passport);

        let stored = h.store.snapshot("org-1").await.unwrap();
        let doc = &stored.provider_state.documents[0];
        assert_ne!(doc.vendor_document_id.cipher_text, "doc_1");
        assert!(!doc.storage_key.cipher_text.starts_with("org-1/"));
        assert_eq!(h.documents.len().await, 1);

        let url = h
            .service
            .document_download_url("org-1", 0, &ctx())
            .await
            .unwrap();
        assert_eq!(url, "https://files.test/doc_1");
        let err = h
            .service
            .document_download_url("org-1", 5, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::NotFound(_)));
    }

    #[tokio::test]
    async fn check_requires_documents_and_includes_address_when_present() {
        let (h, _) = counting_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        h.service.initiate_verification("org-1", &ctx()).await.unwrap();

        let err = h
            .service
            .create_verification_check("org-1", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::Validation(_)));

        h.service
            .submit_document("org-1", passport(), &ctx())
            .await
            .unwrap();
        let mut bill = passport();
        bill.document_type = DocumentType::ProofOfAddress;
        bill.side = None;
        bill.file_name = "bill.pdf".to_string();
        h.service.submit_document("org-1", bill, &ctx()).await.unwrap();

        let check = h
            .service
            .create_verification_check("org-1", &ctx())
            .await
            .unwrap();
        assert_eq!(
            check.check_types,
            vec![CheckType::Document, CheckType::ProofOfAddress]
        );
        assert_eq!(check.status, CheckStatus::InProgress);

        let again = h
            .service
            .create_verification_check("org-1", &ctx())
            .await
            .unwrap_err();
        assert!(matches!(again, KycError::Validation(_)));
    }

    #[tokio::test]
    async fn simulated_check_is_queued_and_cancel_drops_it() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Arc::new(SimulationQueue::open(&dir.path().join("sim.redb")).unwrap());
        let h = simulated_harness();
        let service = h.service.with_queue(queue.clone());

        service.submit_application("org-1", submission(), &ctx()).await.unwrap();
        service.initiate_verification("org-1", &ctx()).await.unwrap();
        service.submit_document("org-1", passport(), &ctx()).await.unwrap();
        let check = service
            .create_verification_check("org-1", &ctx())
            .await
            .unwrap();

        let task = queue.get(&check.id).unwrap().unwrap();
        assert_eq!(task.organization_id, "org-1");
        assert_eq!(task.check_types, vec![CheckType::Document]);

        let cancelled = service
            .cancel_verification_check("org-1", &ctx())
            .await
            .unwrap();
        assert_eq!(cancelled.status, CheckStatus::Cancelled);
        assert!(queue.get(&check.id).unwrap().is_none());

        let stored = h.store.snapshot("org-1").await.unwrap();
        assert_eq!(stored.status, ApplicationStatus::UnderReview);

        // cancelling twice is a no-op
        let again = service
            .cancel_verification_check("org-1", &ctx())
            .await
            .unwrap();
        assert_eq!(again.status, CheckStatus::Cancelled);
    }
}
