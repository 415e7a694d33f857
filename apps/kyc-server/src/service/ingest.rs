// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ingestion of verification results.
//!
//! Webhooks, administrative polling and the simulation worker all fold a
//! [`CanonicalWebhookEvent`] into the application the same way:
//!
//! - events for a check other than the current one, older than the newest
//!   vendor timestamp applied, or reporting a finished check as still
//!   running, are recorded as stale and change nothing else
//! - a completed check with a result scores the application and applies
//!   the outcome when the status accepts one
//! - anything else updates the check and the last-webhook record only

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use utoipa::ToSchema;

use super::{actions, KycService, RequestContext};
use crate::error::KycError;
use crate::models::{
    ApplicationStatus, CanonicalWebhookEvent, VerificationApplication, VerificationReport,
    WebhookRecord,
};
use crate::providers::{simulation, ProviderError, ProviderKind, VerificationProvider};
use crate::queue::SimulationTask;
use crate::scoring;
use crate::workflow::{self, Outcome, StatusChange};

/// Where an ingested result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Webhook,
    Poll,
    Simulation,
}

impl EventSource {
    fn event_type(self) -> &'static str {
        match self {
            EventSource::Webhook => "webhook",
            EventSource::Poll => "check.polled",
            EventSource::Simulation => "check.simulated",
        }
    }
}

/// Result of ingesting one event.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct IngestOutcome {
    pub organization_id: String,
    pub application_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,
    pub previous_status: ApplicationStatus,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_score: Option<f64>,
    /// False when the event was only recorded.
    pub applied: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Copy)]
struct Folded {
    previous_status: ApplicationStatus,
    change: Option<StatusChange>,
    applied: bool,
    stale: bool,
}

/// Fold an event into the application. Pure apart from `now`.
fn fold_event(
    app: &mut VerificationApplication,
    event: &CanonicalWebhookEvent,
    now: DateTime<Utc>,
) -> Folded {
    let previous_status = app.status;
    let current_check = app.provider_state.check_id().map(str::to_string);

    let for_current_check = match (&event.check_id, &current_check) {
        (Some(event_check), Some(current)) => event_check == current,
        (Some(_), None) => false,
        (None, _) => true,
    };
    let out_of_order = matches!(
        (event.occurred_at, app.provider_state.last_event_at),
        (Some(occurred), Some(latest)) if occurred < latest
    );
    // A finished check never reopens, whatever the event's timestamp.
    let reopens_check = event.check_id.is_some()
        && !event.status.is_terminal()
        && app
            .provider_state
            .check
            .as_ref()
            .is_some_and(|c| c.status.is_terminal());
    let stale = !for_current_check || out_of_order || reopens_check;

    let mut applied = false;
    let mut change = None;

    if !stale {
        // Applicant-level events carry no check id and never touch the check.
        let targets_check = event.check_id.is_some();
        let check = app
            .provider_state
            .check
            .as_mut()
            .filter(|_| targets_check);
        if let Some(check) = check {
            check.status = event.status;
            if event.result.is_some() {
                check.result = event.result;
            }
            if !event.breakdown.is_empty() {
                check.breakdown = event.breakdown.clone();
            }
            if event.status.is_complete() {
                check.completed_at = Some(event.occurred_at.unwrap_or(now));
            }
            // Vendor time only; receipt time is on our clock.
            if let Some(event_at) = event.occurred_at {
                app.provider_state.last_event_at = Some(match app.provider_state.last_event_at {
                    Some(latest) if latest > event_at => latest,
                    _ => event_at,
                });
            }
        }
        applied = true;

        let outcome = Outcome::from_check(event.status, event.result, &event.breakdown)
            .filter(|_| targets_check);
        if let Some(outcome) = outcome {
            if workflow::accepts_outcome(app.status) {
                app.verification_score = Some(scoring::score(&event.to_report()));
                change = workflow::apply_outcome(app, &outcome, now).ok();
            } else {
                applied = false;
            }
        }
    }

    app.provider_state.last_webhook = Some(WebhookRecord {
        event_type: event.event_type.clone(),
        status: event.status,
        result: event.result,
        received_at: event.received_at,
        occurred_at: event.occurred_at,
        applied,
        stale,
    });

    Folded {
        previous_status,
        change,
        applied,
        stale,
    }
}

/// Fill a result-less completion from the polled report.
fn merge_report(event: &mut CanonicalWebhookEvent, report: VerificationReport) {
    if event.check_id.is_none() {
        event.check_id = Some(report.check_id);
    }
    if event.applicant_id.is_none() {
        event.applicant_id = report.applicant_id;
    }
    event.result = report.result;
    if event.breakdown.is_empty() {
        event.breakdown = report.breakdown;
    }
    if event.occurred_at.is_none() {
        event.occurred_at = report.completed_at;
    }
}

impl KycService {
    /// Authenticate, parse and apply a vendor webhook.
    ///
    /// The signature is checked before any application state is read. The
    /// call returns only after the resulting update has been persisted.
    pub async fn process_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        provider_hint: Option<ProviderKind>,
    ) -> Result<IngestOutcome, KycError> {
        let adapter = self.registry.resolve(provider_hint).ok_or_else(|| {
            KycError::Configuration(format!(
                "no adapter registered for provider {}",
                provider_hint.unwrap_or(self.registry.default_kind())
            ))
        })?;
        self.authenticate(adapter.as_ref(), payload, signature)?;

        let mut event = adapter.parse_webhook(payload).map_err(|e| match e {
            ProviderError::InvalidWebhook { .. } => KycError::Validation(e.to_string()),
            other => KycError::Provider(other),
        })?;
        info!(
            provider = %adapter.kind(),
            event_type = %event.event_type,
            check_id = ?event.check_id,
            status = ?event.status,
            "Webhook received"
        );

        let app = self.locate(&event).await?;
        if app.provider_state.provider != adapter.kind() {
            return Err(KycError::validation(format!(
                "{} event does not belong to a {} application",
                adapter.kind(),
                app.provider_state.provider
            )));
        }

        if event.status.is_complete() && event.result.is_none() {
            let check_id = event
                .check_id
                .clone()
                .or_else(|| app.provider_state.check_id().map(str::to_string));
            if let Some(check_id) = check_id {
                let report = adapter.get_check(&check_id).await?;
                merge_report(&mut event, report);
            }
        }

        let ctx = RequestContext::system(&format!("webhook:{}", adapter.kind()));
        self.ingest(&app.organization_id, event, EventSource::Webhook, &ctx)
            .await
    }

    fn authenticate(
        &self,
        adapter: &dyn VerificationProvider,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<(), KycError> {
        let kind = adapter.kind();
        match adapter.webhook_secret() {
            Some(secret) => {
                let signature = signature
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        KycError::Signature(format!("missing {} header", adapter.signature_header()))
                    })?;
                if adapter.verify_webhook_signature(payload, signature, secret) {
                    Ok(())
                } else {
                    warn!(provider = %kind, "Webhook signature mismatch");
                    Err(KycError::Signature("signature mismatch".to_string()))
                }
            }
            None if self.settings.allow_unsigned_webhooks => {
                warn!(provider = %kind, "Accepting UNSIGNED webhook (insecure mode)");
                Ok(())
            }
            None => Err(KycError::Signature(format!(
                "no webhook secret configured for {kind}"
            ))),
        }
    }

    /// Find the application an event belongs to: by check id, falling back
    /// to the applicant id.
    async fn locate(
        &self,
        event: &CanonicalWebhookEvent,
    ) -> Result<VerificationApplication, KycError> {
        if event.check_id.is_none() && event.applicant_id.is_none() {
            return Err(KycError::validation(
                "event carries neither a check id nor an applicant id",
            ));
        }
        if let Some(check_id) = &event.check_id {
            if let Some(app) = self.store.find_by_check_id(check_id).await? {
                return Ok(app);
            }
        }
        if let Some(applicant_id) = &event.applicant_id {
            if let Some(app) = self.store.find_by_applicant_id(applicant_id).await? {
                return Ok(app);
            }
        }
        Err(KycError::not_found(format!(
            "application for check {}",
            event
                .check_id
                .as_deref()
                .or(event.applicant_id.as_deref())
                .unwrap_or_default()
        )))
    }

    /// Poll the vendor for a check and apply the result.
    pub async fn get_check_status(
        &self,
        check_id: &str,
        ctx: &RequestContext,
    ) -> Result<IngestOutcome, KycError> {
        let app = self
            .store
            .find_by_check_id(check_id)
            .await?
            .ok_or_else(|| KycError::not_found(format!("check {check_id}")))?;
        let adapter = self.adapter_for(&app)?;
        let mut report = adapter.get_check(check_id).await?;
        if report.applicant_id.is_none() {
            report.applicant_id = app.provider_state.applicant_id().map(str::to_string);
        }
        self.apply_report(check_id, report, EventSource::Poll, ctx)
            .await
    }

    /// Apply a polled or synthesized report to the application owning
    /// `check_id`.
    pub async fn apply_report(
        &self,
        check_id: &str,
        report: VerificationReport,
        source: EventSource,
        ctx: &RequestContext,
    ) -> Result<IngestOutcome, KycError> {
        let app = self
            .store
            .find_by_check_id(check_id)
            .await?
            .ok_or_else(|| KycError::not_found(format!("check {check_id}")))?;
        let mut event = CanonicalWebhookEvent::from_report(report, source.event_type());
        event.check_id = Some(check_id.to_string());
        self.ingest(&app.organization_id, event, source, ctx).await
    }

    /// Complete a queued simulated check.
    ///
    /// Returns `Ok(None)` when there is nothing left to do (application
    /// gone, check replaced, already finished or cancelled), so redelivered
    /// tasks are harmless.
    pub async fn complete_simulated_check(
        &self,
        task: &SimulationTask,
    ) -> Result<Option<IngestOutcome>, KycError> {
        let Some(app) = self.store.find_by_check_id(&task.check_id).await? else {
            info!(check_id = %task.check_id, "No application owns simulated check, dropping");
            return Ok(None);
        };
        if app.provider_state.provider != task.provider || !app.provider_state.simulated {
            warn!(check_id = %task.check_id, "Simulated task does not match application, dropping");
            return Ok(None);
        }
        let open = app
            .provider_state
            .check
            .as_ref()
            .is_some_and(|c| !c.status.is_terminal());
        if !open {
            info!(check_id = %task.check_id, "Simulated check already settled, skipping");
            return Ok(None);
        }

        let report = simulation::completed_report(
            &task.check_id,
            task.applicant_id.as_deref(),
            &task.check_types,
        );
        let ctx = RequestContext::system("simulation-worker");
        self.apply_report(&task.check_id, report, EventSource::Simulation, &ctx)
            .await
            .map(Some)
    }

    async fn ingest(
        &self,
        organization_id: &str,
        event: CanonicalWebhookEvent,
        source: EventSource,
        ctx: &RequestContext,
    ) -> Result<IngestOutcome, KycError> {
        let now = Utc::now();
        let (saved, folded) = self
            .modify(organization_id, |app| Ok(fold_event(app, &event, now)))
            .await?;

        if folded.stale {
            warn!(
                organization_id,
                check_id = ?event.check_id,
                occurred_at = ?event.occurred_at,
                "Stale verification event recorded without applying"
            );
        }
        if let Some(change) = folded.change {
            info!(
                organization_id,
                application_id = %saved.id,
                from = %change.from,
                to = %change.to,
                score = ?saved.verification_score,
                source = ?source,
                "Verification outcome applied"
            );
        }

        self.audit(self.audit_record(
            actions::EVENT_INGESTED,
            &saved,
            ctx,
            json!({
                "source": source,
                "provider": saved.provider_state.provider,
                "eventType": event.event_type,
                "checkId": event.check_id,
                "checkStatus": event.status,
                "result": event.result,
                "applied": folded.applied,
                "stale": folded.stale,
                "previousStatus": folded.previous_status,
                "status": saved.status,
                "score": saved.verification_score,
            }),
        ))
        .await;
        if folded.change.is_some() {
            self.notify(&saved).await;
        }

        Ok(IngestOutcome {
            organization_id: saved.organization_id.clone(),
            application_id: saved.id.clone(),
            check_id: event.check_id,
            previous_status: folded.previous_status,
            status: saved.status,
            verification_score: saved.verification_score,
            applied: folded.applied,
            stale: folded.stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::models::{
        category, BreakdownEntry, CheckResult, CheckStatus, CheckType, ProviderApplicant,
        VerificationCheck,
    };
    use crate::storage::test_fixtures::application;

    fn app_with_check(status: ApplicationStatus) -> VerificationApplication {
        let mut app = application("org-1");
        app.status = status;
        app.provider_state.applicant = Some(ProviderApplicant {
            id: "app_1".to_string(),
            href: "/applicants/app_1".to_string(),
            created_at: Utc::now(),
        });
        app.provider_state.check = Some(VerificationCheck {
            id: "chk_1".to_string(),
            status: CheckStatus::InProgress,
            check_types: vec![CheckType::Document],
            created_at: Utc::now(),
            result: None,
            breakdown: BTreeMap::new(),
            completed_at: None,
        });
        app
    }

    fn event(status: CheckStatus, result: Option<CheckResult>) -> CanonicalWebhookEvent {
        CanonicalWebhookEvent {
            event_type: "check.completed".to_string(),
            check_id: Some("chk_1".to_string()),
            applicant_id: None,
            status,
            result,
            breakdown: BTreeMap::new(),
            received_at: Utc::now(),
            occurred_at: None,
        }
    }

    #[test]
    fn clear_completion_approves_and_scores() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let folded = fold_event(
            &mut app,
            &event(CheckStatus::Complete, Some(CheckResult::Clear)),
            Utc::now(),
        );
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(app.verification_score, Some(0.9));
        assert!(folded.applied && !folded.stale);
        assert!(app.id_verified && app.address_verified && app.business_verified);
        let check = app.provider_state.check.as_ref().unwrap();
        assert_eq!(check.status, CheckStatus::Complete);
        assert!(check.completed_at.is_some());
    }

    #[test]
    fn unidentified_completion_rejects_with_reason() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let mut ev = event(CheckStatus::Complete, Some(CheckResult::Unidentified));
        ev.breakdown.insert(
            category::DOCUMENT_AUTHENTICITY.to_string(),
            BreakdownEntry::new(CheckResult::Consider, json!({})),
        );
        fold_event(&mut app, &ev, Utc::now());
        assert_eq!(app.status, ApplicationStatus::Rejected);
        assert_eq!(
            app.rejection_reason.as_deref(),
            Some("Verification failed: documentAuthenticity")
        );
    }

    #[test]
    fn consider_returns_to_documents_submitted() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        fold_event(
            &mut app,
            &event(CheckStatus::Complete, Some(CheckResult::Consider)),
            Utc::now(),
        );
        assert_eq!(app.status, ApplicationStatus::DocumentsSubmitted);
        assert_eq!(app.verification_score, Some(0.6));
    }

    #[test]
    fn in_progress_event_only_records() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let folded = fold_event(
            &mut app,
            &event(CheckStatus::AwaitingApplicant, None),
            Utc::now(),
        );
        assert_eq!(app.status, ApplicationStatus::UnderReview);
        assert!(folded.change.is_none());
        assert!(app.verification_score.is_none());
        assert_eq!(
            app.provider_state.check.as_ref().unwrap().status,
            CheckStatus::AwaitingApplicant
        );
        assert_eq!(
            app.provider_state.last_webhook.as_ref().unwrap().status,
            CheckStatus::AwaitingApplicant
        );
    }

    #[test]
    fn older_event_is_stale() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let newest = Utc::now();
        app.provider_state.last_event_at = Some(newest);

        let mut ev = event(CheckStatus::Complete, Some(CheckResult::Clear));
        ev.occurred_at = Some(newest - Duration::minutes(5));
        let folded = fold_event(&mut app, &ev, Utc::now());

        assert!(folded.stale && !folded.applied);
        assert_eq!(app.status, ApplicationStatus::UnderReview);
        assert!(app.verification_score.is_none());
        let record = app.provider_state.last_webhook.as_ref().unwrap();
        assert!(record.stale && !record.applied);
    }

    #[test]
    fn event_for_previous_check_is_stale() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let mut ev = event(CheckStatus::Complete, Some(CheckResult::Clear));
        ev.check_id = Some("chk_old".to_string());
        let folded = fold_event(&mut app, &ev, Utc::now());
        assert!(folded.stale);
        assert_eq!(app.status, ApplicationStatus::UnderReview);
    }

    #[test]
    fn late_start_does_not_reopen_finished_check() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let mut completed = event(CheckStatus::Complete, Some(CheckResult::Consider));
        completed.occurred_at = Some(Utc::now() - Duration::minutes(10));
        fold_event(&mut app, &completed, Utc::now());
        assert_eq!(app.status, ApplicationStatus::DocumentsSubmitted);

        let mut started = event(CheckStatus::InProgress, None);
        started.event_type = "check.started".to_string();
        let folded = fold_event(&mut app, &started, Utc::now());

        assert!(folded.stale && !folded.applied);
        let check = app.provider_state.check.as_ref().unwrap();
        assert_eq!(check.status, CheckStatus::Complete);
        assert_eq!(check.result, Some(CheckResult::Consider));
        assert_eq!(app.status, ApplicationStatus::DocumentsSubmitted);
    }

    #[test]
    fn receipt_time_never_orders_vendor_events() {
        let mut app = app_with_check(ApplicationStatus::UnderReview);
        let started = event(CheckStatus::InProgress, None);
        let folded = fold_event(&mut app, &started, Utc::now());
        assert!(folded.applied && !folded.stale);
        assert!(app.provider_state.last_event_at.is_none());

        let mut completed = event(CheckStatus::Complete, Some(CheckResult::Clear));
        completed.occurred_at = Some(started.received_at - Duration::seconds(2));
        let folded = fold_event(&mut app, &completed, Utc::now());

        assert!(folded.applied && !folded.stale);
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert_eq!(app.provider_state.last_event_at, completed.occurred_at);
    }

    #[test]
    fn terminal_application_records_without_transition() {
        let mut app = app_with_check(ApplicationStatus::Approved);
        let folded = fold_event(
            &mut app,
            &event(CheckStatus::Complete, Some(CheckResult::Unidentified)),
            Utc::now(),
        );
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert!(!folded.applied);
        assert!(app.verification_score.is_none());
    }

    #[test]
    fn merge_fills_missing_result() {
        let mut ev = event(CheckStatus::Complete, None);
        let mut breakdown = BTreeMap::new();
        breakdown.insert(
            category::FACE_COMPARISON.to_string(),
            BreakdownEntry::new(CheckResult::Clear, json!({})),
        );
        merge_report(
            &mut ev,
            VerificationReport {
                check_id: "chk_1".to_string(),
                applicant_id: Some("app_1".to_string()),
                status: CheckStatus::Complete,
                result: Some(CheckResult::Clear),
                breakdown,
                completed_at: None,
            },
        );
        assert_eq!(ev.result, Some(CheckResult::Clear));
        assert_eq!(ev.applicant_id.as_deref(), Some("app_1"));
        assert_eq!(ev.breakdown.len(), 1);
    }

    mod service {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        use super::*;
        use crate::config::ProvidersConfig;
        use crate::providers::ProviderRegistry;
        use crate::service::test_support::{harness_with, Harness};
        use crate::service::{ApplicationStore, ServiceSettings};

        const SECRET: &str = "whsec_unit";

        fn harness(secret: Option<&str>, allow_unsigned: bool) -> Harness {
            let mut providers = ProvidersConfig::simulated(ProviderKind::Onfido);
            providers.onfido.webhook_secret = secret.map(str::to_string);
            let registry = ProviderRegistry::from_config(&providers).unwrap();
            harness_with(
                registry,
                ServiceSettings {
                    allow_unsigned_webhooks: allow_unsigned,
                    ..ServiceSettings::default()
                },
            )
        }

        fn sign(payload: &[u8]) -> String {
            let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }

        fn onfido_payload(resource_type: &str, action: &str, object: serde_json::Value) -> Vec<u8> {
            json!({
                "payload": {"resource_type": resource_type, "action": action, "object": object}
            })
            .to_string()
            .into_bytes()
        }

        fn clear_payload(check_id: &str) -> Vec<u8> {
            onfido_payload(
                "check",
                "check.completed",
                json!({"id": check_id, "status": "complete", "result": "clear"}),
            )
        }

        #[tokio::test]
        async fn signature_is_checked_before_lookup() {
            let h = harness(Some(SECRET), false);
            let err = h
                .service
                .process_webhook(&clear_payload("chk_unknown"), Some("deadbeef"), None)
                .await
                .unwrap_err();
            assert!(matches!(err, KycError::Signature(_)));

            let err = h
                .service
                .process_webhook(&clear_payload("chk_unknown"), None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, KycError::Signature(_)));
            assert!(h.audit.records().await.is_empty());
        }

        #[tokio::test]
        async fn signed_event_is_applied_and_audited() {
            let h = harness(Some(SECRET), false);
            h.store
                .insert(&app_with_check(ApplicationStatus::UnderReview))
                .await
                .unwrap();
            let payload = clear_payload("chk_1");
            let outcome = h
                .service
                .process_webhook(&payload, Some(&sign(&payload)), Some(ProviderKind::Onfido))
                .await
                .unwrap();
            assert_eq!(outcome.previous_status, ApplicationStatus::UnderReview);
            assert_eq!(outcome.status, ApplicationStatus::Approved);
            assert!(outcome.applied && !outcome.stale);

            let stored = h.store.snapshot("org-1").await.unwrap();
            assert_eq!(stored.version, 2);
            assert_eq!(h.notifier.notices().await.len(), 1);
            let audit = h.audit.records().await;
            assert_eq!(audit.len(), 1);
            assert_eq!(audit[0].action, actions::EVENT_INGESTED);
            assert_eq!(audit[0].actor_id.as_deref(), Some("system:webhook:onfido"));
        }

        #[tokio::test]
        async fn unsigned_webhooks_need_opt_in() {
            let h = harness(None, false);
            h.store
                .insert(&app_with_check(ApplicationStatus::UnderReview))
                .await
                .unwrap();
            let err = h
                .service
                .process_webhook(&clear_payload("chk_1"), None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, KycError::Signature(_)));

            let h = harness(None, true);
            h.store
                .insert(&app_with_check(ApplicationStatus::UnderReview))
                .await
                .unwrap();
            let outcome = h
                .service
                .process_webhook(&clear_payload("chk_1"), None, None)
                .await
                .unwrap();
            assert_eq!(outcome.status, ApplicationStatus::Approved);
        }

        #[tokio::test]
        async fn applicant_event_falls_back_to_applicant_id() {
            let h = harness(Some(SECRET), false);
            h.store
                .insert(&app_with_check(ApplicationStatus::UnderReview))
                .await
                .unwrap();
            let payload = onfido_payload(
                "applicant",
                "applicant.updated",
                json!({"id": "app_1", "applicant_id": "app_1"}),
            );
            let outcome = h
                .service
                .process_webhook(&payload, Some(&sign(&payload)), None)
                .await
                .unwrap();
            assert_eq!(outcome.status, ApplicationStatus::UnderReview);
            assert!(outcome.check_id.is_none());
            let stored = h.store.snapshot("org-1").await.unwrap();
            assert_eq!(
                stored.provider_state.last_webhook.unwrap().event_type,
                "applicant.updated"
            );
        }

        #[tokio::test]
        async fn event_without_identifiers_is_invalid() {
            let h = harness(Some(SECRET), false);
            let payload = onfido_payload("check", "check.started", json!({}));
            let err = h
                .service
                .process_webhook(&payload, Some(&sign(&payload)), None)
                .await
                .unwrap_err();
            assert!(matches!(err, KycError::Validation(_)));
        }

        #[tokio::test]
        async fn event_from_other_vendor_is_refused() {
            let h = harness(Some(SECRET), false);
            let mut app = app_with_check(ApplicationStatus::UnderReview);
            app.provider_state.provider = ProviderKind::Jumio;
            h.store.insert(&app).await.unwrap();

            let payload = clear_payload("chk_1");
            let err = h
                .service
                .process_webhook(&payload, Some(&sign(&payload)), None)
                .await
                .unwrap_err();
            assert!(matches!(err, KycError::Validation(_)));
            let stored = h.store.snapshot("org-1").await.unwrap();
            assert_eq!(stored.status, ApplicationStatus::UnderReview);
        }

        #[tokio::test]
        async fn simulated_completion_is_idempotent() {
            let h = harness(None, false);
            h.store
                .insert(&app_with_check(ApplicationStatus::UnderReview))
                .await
                .unwrap();
            let task = SimulationTask {
                check_id: "chk_1".to_string(),
                organization_id: "org-1".to_string(),
                provider: ProviderKind::Onfido,
                applicant_id: Some("app_1".to_string()),
                check_types: vec![CheckType::Document],
                due_at: Utc::now(),
                attempts: 0,
                enqueued_at: Utc::now(),
            };

            let first = h.service.complete_simulated_check(&task).await.unwrap().unwrap();
            assert_eq!(first.status, ApplicationStatus::Approved);
            assert_eq!(first.verification_score, Some(0.95));

            assert!(h.service.complete_simulated_check(&task).await.unwrap().is_none());
            assert_eq!(h.notifier.notices().await.len(), 1);
        }
    }
}
