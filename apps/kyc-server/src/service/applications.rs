// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application submission, redacted reads and manual review decisions.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{actions, validate_organization_id, KycService, RequestContext};
use crate::crypto::mask_sensitive;
use crate::error::KycError;
use crate::models::{
    ApplicationStatus, ApplicationSubmission, ApplicationView, ProviderState, ReviewDecision,
    SensitiveFields, VerificationApplication,
};
use crate::workflow::{self, Outcome};

fn validate_submission(
    organization_id: &str,
    submission: &ApplicationSubmission,
) -> Result<(), KycError> {
    validate_organization_id(organization_id)?;
    if submission.legal_name.trim().is_empty() {
        return Err(KycError::validation("legal name is required"));
    }
    let email = submission.contact_email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(KycError::validation("contact email is invalid")),
    }
    if submission.tax_id.trim().is_empty() {
        return Err(KycError::validation("tax id is required"));
    }
    if let Some(address) = &submission.address {
        if address.line1.trim().is_empty()
            || address.city.trim().is_empty()
            || address.country.trim().is_empty()
        {
            return Err(KycError::validation(
                "address requires line1, city and country",
            ));
        }
    }
    Ok(())
}

impl KycService {
    /// Create the organization's application, or resubmit a `NOT_STARTED`
    /// or `REJECTED` one.
    pub async fn submit_application(
        &self,
        organization_id: &str,
        submission: ApplicationSubmission,
        ctx: &RequestContext,
    ) -> Result<ApplicationView, KycError> {
        validate_submission(organization_id, &submission)?;

        let tax_id = submission.tax_id.trim();
        let registration_number = submission
            .registration_number
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let sensitive = SensitiveFields {
            tax_id: Some(self.cipher.encrypt(tax_id)?),
            registration_number: registration_number
                .map(|v| self.cipher.encrypt(v))
                .transpose()?,
        };

        let adapter = self.registry.active().ok_or_else(|| {
            KycError::Configuration("no verification provider is configured".to_string())
        })?;
        let now = Utc::now();

        let (saved, previous_status) = match self.store.find_by_organization(organization_id).await? {
            None => {
                let app = VerificationApplication {
                    id: uuid::Uuid::new_v4().to_string(),
                    organization_id: organization_id.to_string(),
                    id_type: submission.id_type,
                    status: ApplicationStatus::DocumentsSubmitted,
                    legal_name: submission.legal_name.trim().to_string(),
                    contact_email: submission.contact_email.trim().to_string(),
                    address: submission.address.clone(),
                    sensitive,
                    verification_score: None,
                    id_verified: false,
                    address_verified: false,
                    business_verified: false,
                    submitted_at: now,
                    reviewed_at: None,
                    expires_at: None,
                    rejection_reason: None,
                    provider_state: ProviderState::new(adapter.kind(), adapter.is_simulated()),
                    version: 1,
                    created_at: now,
                    updated_at: now,
                };
                self.store.insert(&app).await?;
                (app, None)
            }
            Some(_) => {
                let (saved, from) = self
                    .modify(organization_id, |app| {
                        let change = workflow::resubmit(app, now)?;
                        app.id_type = submission.id_type;
                        app.legal_name = submission.legal_name.trim().to_string();
                        app.contact_email = submission.contact_email.trim().to_string();
                        app.address = submission.address.clone();
                        app.sensitive = sensitive.clone();
                        if app.provider_state.applicant.is_none() {
                            app.provider_state =
                                ProviderState::new(adapter.kind(), adapter.is_simulated());
                        }
                        Ok(change.from)
                    })
                    .await?;
                (saved, Some(from))
            }
        };

        info!(
            organization_id,
            application_id = %saved.id,
            provider = %saved.provider_state.provider,
            resubmission = previous_status.is_some(),
            "Verification application submitted"
        );

        self.audit(self.audit_record(
            actions::APPLICATION_SUBMITTED,
            &saved,
            ctx,
            json!({
                "idType": saved.id_type,
                "taxIdMasked": mask_sensitive(tax_id),
                "registrationNumberMasked": registration_number.map(mask_sensitive),
                "resubmission": previous_status.is_some(),
                "previousStatus": previous_status,
                "status": saved.status,
            }),
        ))
        .await;
        self.notify(&saved).await;

        Ok(self.view(&saved))
    }

    /// Redacted view of the organization's application.
    pub async fn get_application(&self, organization_id: &str) -> Result<ApplicationView, KycError> {
        let app = self.load(organization_id).await?;
        Ok(self.view(&app))
    }

    /// Apply a manual reviewer decision with the same side effects as the
    /// corresponding check outcome.
    pub async fn record_review_decision(
        &self,
        organization_id: &str,
        decision: ReviewDecision,
        ctx: &RequestContext,
    ) -> Result<ApplicationView, KycError> {
        let outcome = match decision {
            ReviewDecision::Approve => Outcome::Approve,
            ReviewDecision::Reject { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(KycError::validation("a rejection reason is required"));
                }
                Outcome::Reject {
                    reason: reason.to_string(),
                }
            }
            ReviewDecision::RequestMoreInfo => Outcome::RequestMoreInfo,
        };

        let now = Utc::now();
        let (saved, change) = self
            .modify(organization_id, |app| {
                let change = workflow::apply_outcome(app, &outcome, now)?;
                app.provider_state.last_event_at = Some(now);
                Ok(change)
            })
            .await?;

        info!(
            organization_id,
            application_id = %saved.id,
            from = %change.from,
            to = %change.to,
            "Manual review decision recorded"
        );

        let decision_name = match outcome {
            Outcome::Approve => "approve",
            Outcome::Reject { .. } => "reject",
            Outcome::RequestMoreInfo => "request_more_info",
        };
        self.audit(self.audit_record(
            actions::REVIEW_DECISION,
            &saved,
            ctx,
            json!({
                "decision": decision_name,
                "previousStatus": change.from,
                "status": change.to,
            }),
        ))
        .await;
        self.notify(&saved).await;

        Ok(self.view(&saved))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::simulated_harness;
    use super::*;
    use crate::crypto::EncryptedField;
    use crate::models::IdType;
    use crate::service::ApplicationStore;

    fn submission() -> ApplicationSubmission {
        ApplicationSubmission {
            id_type: IdType::Ein,
            legal_name: "Acme Widgets LLC".to_string(),
            contact_email: "compliance@acme.test".to_string(),
            address: None,
            tax_id: "12-3456789".to_string(),
            registration_number: Some("REG-998877".to_string()),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Some("user-1".to_string()), Some("10.0.0.1".to_string()))
    }

    #[tokio::test]
    async fn organization_ids_outside_safe_charset_are_refused() {
        let h = simulated_harness();
        h.service
            .submit_application("acme_corp", submission(), &ctx())
            .await
            .unwrap();

        for id in ["acme corp", "acme.corp", "../acme_corp", ""] {
            let err = h
                .service
                .submit_application(id, submission(), &ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, KycError::Validation(_)), "{id:?}: {err:?}");
            let err = h.service.get_application(id).await.unwrap_err();
            assert!(matches!(err, KycError::Validation(_)), "{id:?}: {err:?}");
        }
        assert_eq!(h.audit.records().await.len(), 1);
    }

    #[tokio::test]
    async fn submission_encrypts_and_audits_masked_values() {
        let h = simulated_harness();
        let view = h
            .service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        assert_eq!(view.status, ApplicationStatus::DocumentsSubmitted);
        assert_eq!(view.tax_id_masked.as_deref(), Some("12******89"));
        assert!(view.simulated);

        let stored = h.store.snapshot("org-1").await.unwrap();
        let tax_id = stored.sensitive.tax_id.unwrap();
        assert_ne!(tax_id.cipher_text, "12-3456789");
        assert!(!serde_json::to_string(&stored.sensitive.registration_number)
            .unwrap()
            .contains("REG-998877"));

        let audit = h.audit.records().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, actions::APPLICATION_SUBMITTED);
        assert_eq!(audit[0].metadata["taxIdMasked"], "12******89");
        assert_eq!(audit[0].actor_id.as_deref(), Some("user-1"));
        assert_eq!(audit[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert!(!audit[0].metadata.to_string().contains("3456"));

        let notices = h.notifier.notices().await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].status, ApplicationStatus::DocumentsSubmitted);
    }

    #[tokio::test]
    async fn resubmission_requires_resubmittable_status() {
        let h = simulated_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        let err = h
            .service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::Validation(_)));
    }

    #[tokio::test]
    async fn rejected_application_can_be_resubmitted() {
        let h = simulated_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        h.service
            .record_review_decision(
                "org-1",
                ReviewDecision::Reject {
                    reason: "documents unreadable".to_string(),
                },
                &ctx(),
            )
            .await
            .unwrap();

        let view = h
            .service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        assert_eq!(view.status, ApplicationStatus::DocumentsSubmitted);
        assert!(view.rejection_reason.is_none());
        assert!(view.reviewed_at.is_none());
        assert_eq!(h.store.snapshot("org-1").await.unwrap().version, 3);
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected_before_storage() {
        let h = simulated_harness();
        let mut bad = submission();
        bad.contact_email = "not-an-email".to_string();
        let err = h
            .service
            .submit_application("org-1", bad, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::Validation(_)));
        assert!(h.store.snapshot("org-1").await.is_none());
    }

    #[tokio::test]
    async fn unknown_organization_is_not_found() {
        let h = simulated_harness();
        let err = h.service.get_application("nobody").await.unwrap_err();
        assert!(matches!(err, KycError::NotFound(_)));
    }

    #[tokio::test]
    async fn undecryptable_field_is_omitted_from_view() {
        let h = simulated_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();

        let mut app = h.store.snapshot("org-1").await.unwrap();
        let version = app.version;
        app.sensitive.registration_number = Some(EncryptedField {
            cipher_text: "00".to_string(),
            iv: "00".repeat(16),
            auth_tag: "00".repeat(16),
        });
        h.store.update(app, version).await.unwrap();

        let view = h.service.get_application("org-1").await.unwrap();
        assert_eq!(view.tax_id_masked.as_deref(), Some("12******89"));
        assert!(view.registration_number_masked.is_none());
    }

    #[tokio::test]
    async fn manual_approval_sets_flags_and_expiry() {
        let h = simulated_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        let view = h
            .service
            .record_review_decision("org-1", ReviewDecision::Approve, &ctx())
            .await
            .unwrap();

        assert_eq!(view.status, ApplicationStatus::Approved);
        assert!(view.id_verified && view.address_verified && view.business_verified);
        assert!(view.expires_at.is_some());
        let stored = h.store.snapshot("org-1").await.unwrap();
        assert!(stored.provider_state.last_event_at.is_some());

        let err = h
            .service
            .record_review_decision("org-1", ReviewDecision::RequestMoreInfo, &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_rejection_reason_is_invalid() {
        let h = simulated_harness();
        h.service
            .submit_application("org-1", submission(), &ctx())
            .await
            .unwrap();
        let err = h
            .service
            .record_review_decision(
                "org-1",
                ReviewDecision::Reject {
                    reason: "  ".to_string(),
                },
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KycError::Validation(_)));
    }
}
