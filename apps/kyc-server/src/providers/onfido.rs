// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Onfido (API v3.6) adapter.
//!
//! Bearer-token auth; webhooks are signed with a bare hex HMAC-SHA256 in
//! `X-SHA2-Signature`. Check callbacks carry no result, so the orchestration
//! layer enriches them through [`VerificationProvider::get_check`].

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::{MultipartBody, VendorHttp};
use super::{
    parse_timestamp, simulation, split_name, verify_hmac_sha256, ApplicantProfile,
    ApplicantRecord, CheckRecord, DocumentUpload, ProviderError, ProviderKind, RetryPolicy,
    UploadedDocument, VerificationProvider,
};
use crate::models::{
    category, BreakdownEntry, CanonicalWebhookEvent, CheckResult, CheckStatus, CheckType,
    DocumentSide, DocumentType, VerificationReport,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.eu.onfido.com";
pub const SIGNATURE_HEADER: &str = "X-SHA2-Signature";
const API_PREFIX: &str = "/v3.6";

#[derive(Clone, Default)]
pub struct OnfidoSettings {
    pub api_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
}

impl fmt::Debug for OnfidoSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnfidoSettings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OnfidoSettings {
    pub fn has_credentials(&self) -> bool {
        self.api_token.is_some()
    }
}

enum Mode {
    Live { http: VendorHttp, api_token: String },
    Simulated,
}

pub struct OnfidoProvider {
    mode: Mode,
    webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApplicantResponse {
    id: String,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocumentResponse {
    id: String,
    #[serde(default)]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    applicant_id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    completed_at_iso8601: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportsResponse {
    #[serde(default)]
    reports: Vec<ReportResponse>,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    id: String,
    name: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    breakdown: Value,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    resource_type: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    object: WebhookObject,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    applicant_id: Option<String>,
    #[serde(default)]
    completed_at_iso8601: Option<String>,
}

impl OnfidoProvider {
    pub fn new(
        settings: &OnfidoSettings,
        policy: RetryPolicy,
        simulate: bool,
    ) -> Result<Self, ProviderError> {
        let mode = match (&settings.api_token, simulate) {
            (Some(token), false) => Mode::Live {
                http: VendorHttp::new(ProviderKind::Onfido, &settings.base_url, policy)?,
                api_token: token.clone(),
            },
            _ => Mode::Simulated,
        };
        Ok(Self {
            mode,
            webhook_secret: settings.webhook_secret.clone(),
        })
    }

    async fn list_reports(
        &self,
        http: &VendorHttp,
        api_token: &str,
        check_id: &str,
        operation: &'static str,
    ) -> Result<Vec<ReportResponse>, ProviderError> {
        let path = format!("{API_PREFIX}/reports?check_id={check_id}");
        let reports: ReportsResponse = http
            .send_json(operation, Method::GET, &path, |req| req.bearer_auth(api_token))
            .await?;
        Ok(reports.reports)
    }
}

#[async_trait]
impl VerificationProvider for OnfidoProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Onfido
    }

    fn is_simulated(&self) -> bool {
        matches!(self.mode, Mode::Simulated)
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    async fn create_applicant(
        &self,
        profile: &ApplicantProfile,
    ) -> Result<ApplicantRecord, ProviderError> {
        let Mode::Live { http, api_token } = &self.mode else {
            return Ok(simulation::applicant(ProviderKind::Onfido));
        };

        let (first_name, last_name) = split_name(&profile.legal_name);
        let mut body = json!({
            "first_name": first_name,
            "last_name": last_name,
            "email": profile.email,
            "location": { "country_of_residence": profile.address.as_ref().map(|a| a.country.as_str()) },
        });
        if let Some(address) = &profile.address {
            body["address"] = json!({
                "line1": address.line1,
                "line2": address.line2,
                "town": address.city,
                "state": address.region,
                "postcode": address.postal_code,
                "country": address.country,
            });
        }

        let path = format!("{API_PREFIX}/applicants");
        let created: ApplicantResponse = http
            .send_json("create_applicant", Method::POST, &path, |req| {
                req.bearer_auth(api_token).json(&body)
            })
            .await?;

        Ok(ApplicantRecord {
            href: created
                .href
                .unwrap_or_else(|| format!("{API_PREFIX}/applicants/{}", created.id)),
            created_at: created
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            id: created.id,
        })
    }

    async fn upload_document(
        &self,
        applicant_id: &str,
        document: &DocumentUpload,
    ) -> Result<UploadedDocument, ProviderError> {
        let Mode::Live { http, api_token } = &self.mode else {
            return Ok(simulation::document(ProviderKind::Onfido));
        };

        let mut form = MultipartBody::new()
            .text("applicant_id", applicant_id)
            .text("type", document_type(document.document_type));
        if let Some(side) = document.side {
            form = form.text("side", document_side(side));
        }
        let (content_type, bytes) = form
            .file(
                "file",
                &document.file_name,
                &document.content_type,
                &document.bytes,
            )
            .finish();

        let path = format!("{API_PREFIX}/documents");
        let uploaded: DocumentResponse = http
            .send_json("upload_document", Method::POST, &path, |req| {
                req.bearer_auth(api_token)
                    .header(reqwest::header::CONTENT_TYPE, &content_type)
                    .body(bytes.clone())
            })
            .await?;

        Ok(UploadedDocument {
            href: uploaded
                .href
                .unwrap_or_else(|| format!("{API_PREFIX}/documents/{}", uploaded.id)),
            id: uploaded.id,
        })
    }

    async fn create_check(
        &self,
        applicant_id: &str,
        check_types: &[CheckType],
    ) -> Result<CheckRecord, ProviderError> {
        let Mode::Live { http, api_token } = &self.mode else {
            return Ok(simulation::check());
        };

        let names: Vec<&str> = check_types
            .iter()
            .flat_map(|t| report_names(*t))
            .copied()
            .collect();
        let body = json!({
            "applicant_id": applicant_id,
            "report_names": names,
        });

        let path = format!("{API_PREFIX}/checks");
        let created: CheckResponse = http
            .send_json("create_check", Method::POST, &path, |req| {
                req.bearer_auth(api_token).json(&body)
            })
            .await?;

        Ok(CheckRecord {
            status: created
                .status
                .as_deref()
                .map(map_check_status)
                .unwrap_or(CheckStatus::Pending),
            created_at: created
                .created_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            id: created.id,
        })
    }

    async fn get_check(&self, check_id: &str) -> Result<VerificationReport, ProviderError> {
        let Mode::Live { http, api_token } = &self.mode else {
            return Ok(simulation::completed_report(
                check_id,
                None,
                &[CheckType::Document],
            ));
        };

        let path = format!("{API_PREFIX}/checks/{check_id}");
        let check: CheckResponse = http
            .send_json("get_check", Method::GET, &path, |req| {
                req.bearer_auth(api_token)
            })
            .await?;
        let reports = self
            .list_reports(http, api_token, check_id, "get_check")
            .await?;

        Ok(VerificationReport {
            check_id: check.id,
            applicant_id: check.applicant_id,
            status: check
                .status
                .as_deref()
                .map(map_check_status)
                .unwrap_or(CheckStatus::Pending),
            result: check.result.as_deref().map(map_result),
            breakdown: breakdown_from_reports(&reports),
            completed_at: check.completed_at_iso8601.as_deref().and_then(parse_timestamp),
        })
    }

    async fn cancel_check(&self, check_id: &str) -> Result<(), ProviderError> {
        let Mode::Live { http, api_token } = &self.mode else {
            return Ok(());
        };

        // Onfido cancels individual reports rather than whole checks.
        let reports = self
            .list_reports(http, api_token, check_id, "cancel_check")
            .await?;
        for report in reports {
            let path = format!("{API_PREFIX}/reports/{}/cancel", report.id);
            http.send("cancel_check", Method::POST, &path, |req| {
                req.bearer_auth(api_token)
            })
            .await?;
        }
        Ok(())
    }

    async fn document_download_url(&self, document_id: &str) -> Result<String, ProviderError> {
        match &self.mode {
            Mode::Live { http, .. } => {
                Ok(http.url(&format!("{API_PREFIX}/documents/{document_id}/download")))
            }
            Mode::Simulated => Ok(simulation::download_url(ProviderKind::Onfido, document_id)),
        }
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        verify_hmac_sha256(secret, payload, &expected)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
        let envelope: WebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::invalid_webhook(ProviderKind::Onfido, e.to_string()))?;
        let WebhookPayload {
            resource_type,
            action,
            object,
        } = envelope.payload;

        let action = action.unwrap_or_default();
        let is_check = resource_type.as_deref() == Some("check") || action.starts_with("check.");
        let status = match object.status.as_deref() {
            Some(raw) => map_check_status(raw),
            None if action == "check.completed" => CheckStatus::Complete,
            None => CheckStatus::Pending,
        };

        Ok(CanonicalWebhookEvent {
            event_type: if action.is_empty() {
                "unknown".to_string()
            } else {
                action
            },
            check_id: if is_check { object.id } else { None },
            applicant_id: object.applicant_id,
            status,
            result: object.result.as_deref().map(map_result),
            breakdown: BTreeMap::new(),
            received_at: Utc::now(),
            occurred_at: object
                .completed_at_iso8601
                .as_deref()
                .and_then(parse_timestamp),
        })
    }
}

pub fn document_type(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Passport => "passport",
        DocumentType::DrivingLicence => "driving_licence",
        DocumentType::NationalId => "national_identity_card",
        DocumentType::ProofOfAddress => "utility_bill",
    }
}

fn document_side(side: DocumentSide) -> &'static str {
    match side {
        DocumentSide::Front => "front",
        DocumentSide::Back => "back",
    }
}

fn report_names(check_type: CheckType) -> &'static [&'static str] {
    match check_type {
        CheckType::Document => &["document"],
        CheckType::Identity => &["identity_enhanced"],
        CheckType::FacialSimilarity => &["facial_similarity_photo"],
        CheckType::ProofOfAddress => &["proof_of_address"],
    }
}

fn report_category(report_name: &str) -> Option<&'static str> {
    match report_name {
        "document" => Some(category::DOCUMENT_AUTHENTICITY),
        name if name.starts_with("facial_similarity") => Some(category::FACE_COMPARISON),
        "known_faces" => Some(category::LIVENESS_CHECK),
        "proof_of_address" => Some(category::ADDRESS_VERIFICATION),
        name if name.starts_with("identity") => Some(category::IDENTITY_RECORD),
        name if name.starts_with("watchlist") => Some(category::WATCHLIST_SCREENING),
        _ => None,
    }
}

fn breakdown_from_reports(reports: &[ReportResponse]) -> BTreeMap<String, BreakdownEntry> {
    reports
        .iter()
        .filter_map(|report| {
            let name = report_category(&report.name)?;
            let result = report
                .result
                .as_deref()
                .map(map_result)
                .unwrap_or(CheckResult::Unidentified);
            Some((
                name.to_string(),
                BreakdownEntry::new(result, report.breakdown.clone()),
            ))
        })
        .collect()
}

pub fn map_check_status(raw_status: &str) -> CheckStatus {
    match raw_status.trim().to_ascii_lowercase().as_str() {
        "in_progress" | "reopened" => CheckStatus::InProgress,
        "awaiting_applicant" => CheckStatus::AwaitingApplicant,
        "complete" => CheckStatus::Complete,
        "withdrawn" => CheckStatus::Cancelled,
        _ => CheckStatus::Pending,
    }
}

pub fn map_result(raw_result: &str) -> CheckResult {
    match raw_result.trim().to_ascii_lowercase().as_str() {
        "clear" => CheckResult::Clear,
        "consider" => CheckResult::Consider,
        _ => CheckResult::Unidentified,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};

    use super::*;
    use crate::providers::hmac_sha256;
    use crate::providers::test_support::{quick_policy, serve};

    fn simulated() -> OnfidoProvider {
        OnfidoProvider::new(&OnfidoSettings::default(), RetryPolicy::default(), false).unwrap()
    }

    fn profile() -> ApplicantProfile {
        ApplicantProfile {
            external_id: "org-1".to_string(),
            legal_name: "Acme Holdings".to_string(),
            email: "ops@acme.test".to_string(),
            address: None,
        }
    }

    #[test]
    fn status_mapping_is_stable() {
        assert_eq!(map_check_status("complete"), CheckStatus::Complete);
        assert_eq!(map_check_status("IN_PROGRESS"), CheckStatus::InProgress);
        assert_eq!(
            map_check_status("awaiting_applicant"),
            CheckStatus::AwaitingApplicant
        );
        assert_eq!(map_check_status("withdrawn"), CheckStatus::Cancelled);
        assert_eq!(map_check_status("paused"), CheckStatus::Pending);
        assert_eq!(map_result("clear"), CheckResult::Clear);
        assert_eq!(map_result("consider"), CheckResult::Consider);
        assert_eq!(map_result("suspected"), CheckResult::Unidentified);
    }

    #[test]
    fn signature_accepts_bare_hex_only() {
        let provider = simulated();
        let payload = br#"{"payload":{}}"#;
        let digest = hex::encode(hmac_sha256(b"whsec", payload));

        assert!(provider.verify_webhook_signature(payload, &digest, "whsec"));
        assert!(provider.verify_webhook_signature(payload, &digest.to_uppercase(), "whsec"));
        assert!(!provider.verify_webhook_signature(payload, &format!("sha256={digest}"), "whsec"));
        assert!(!provider.verify_webhook_signature(payload, &digest, "other"));
        assert!(!provider.verify_webhook_signature(b"tampered", &digest, "whsec"));
    }

    #[test]
    fn parses_check_completed_without_result() {
        let payload = br#"{"payload":{"resource_type":"check","action":"check.completed",
            "object":{"id":"chk_1","status":"complete","completed_at_iso8601":"2026-03-01T10:00:00Z",
            "href":"https://api.eu.onfido.com/v3.6/checks/chk_1"}}}"#;
        let event = simulated().parse_webhook(payload).unwrap();

        assert_eq!(event.event_type, "check.completed");
        assert_eq!(event.check_id.as_deref(), Some("chk_1"));
        assert_eq!(event.status, CheckStatus::Complete);
        assert_eq!(event.result, None);
        assert!(event.occurred_at.is_some());
    }

    #[test]
    fn report_events_carry_no_check_id() {
        let payload = br#"{"payload":{"resource_type":"report","action":"report.completed",
            "object":{"id":"rep_1","status":"complete"}}}"#;
        let event = simulated().parse_webhook(payload).unwrap();
        assert_eq!(event.check_id, None);
    }

    #[test]
    fn tolerates_missing_fields_and_rejects_garbage() {
        let event = simulated().parse_webhook(b"{}").unwrap();
        assert_eq!(event.status, CheckStatus::Pending);
        assert!(simulated().parse_webhook(b"not json").is_err());
    }

    #[test]
    fn document_vocabulary() {
        assert_eq!(document_type(DocumentType::DrivingLicence), "driving_licence");
        assert_eq!(
            document_type(DocumentType::NationalId),
            "national_identity_card"
        );
        assert_eq!(document_type(DocumentType::ProofOfAddress), "utility_bill");
    }

    #[tokio::test]
    async fn simulated_mode_never_needs_network() {
        let provider = simulated();
        assert!(provider.is_simulated());
        let applicant = provider.create_applicant(&profile()).await.unwrap();
        assert!(simulation::is_simulated_id(&applicant.id));
        let check = provider
            .create_check(&applicant.id, &[CheckType::Document])
            .await
            .unwrap();
        let report = provider.get_check(&check.id).await.unwrap();
        assert_eq!(report.result, Some(CheckResult::Clear));
        provider.cancel_check(&check.id).await.unwrap();
        assert!(provider
            .document_download_url("sim_doc_1")
            .await
            .unwrap()
            .starts_with("simulated://"));
    }

    #[tokio::test]
    async fn live_mode_talks_to_vendor_api() {
        let router = Router::new()
            .route(
                "/v3.6/applicants",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(
                        headers.get("authorization").unwrap(),
                        "Bearer test-token"
                    );
                    assert_eq!(body["first_name"], "Acme");
                    (
                        StatusCode::CREATED,
                        Json(json!({
                            "id": "app_live_1",
                            "href": "/v3.6/applicants/app_live_1",
                            "created_at": "2026-03-01T10:00:00Z"
                        })),
                    )
                }),
            )
            .route(
                "/v3.6/checks/{id}",
                get(|Path(id): Path<String>| async move {
                    Json(json!({
                        "id": id,
                        "status": "complete",
                        "result": "consider",
                        "applicant_id": "app_live_1"
                    }))
                }),
            )
            .route(
                "/v3.6/reports",
                get(|Query(q): Query<std::collections::HashMap<String, String>>| async move {
                    assert_eq!(q.get("check_id").map(String::as_str), Some("chk_live_1"));
                    Json(json!({
                        "reports": [
                            {"id": "r1", "name": "document", "result": "clear", "breakdown": {}},
                            {"id": "r2", "name": "facial_similarity_photo", "result": "consider"}
                        ]
                    }))
                }),
            );
        let base_url = serve(router).await;
        let provider = Arc::new(
            OnfidoProvider::new(
                &OnfidoSettings {
                    api_token: Some("test-token".to_string()),
                    webhook_secret: None,
                    base_url,
                },
                quick_policy(),
                false,
            )
            .unwrap(),
        );
        assert!(!provider.is_simulated());

        let applicant = provider.create_applicant(&profile()).await.unwrap();
        assert_eq!(applicant.id, "app_live_1");

        let report = provider.get_check("chk_live_1").await.unwrap();
        assert_eq!(report.status, CheckStatus::Complete);
        assert_eq!(report.result, Some(CheckResult::Consider));
        assert_eq!(
            report.breakdown[category::DOCUMENT_AUTHENTICITY].result,
            CheckResult::Clear
        );
        assert_eq!(
            report.breakdown[category::FACE_COMPARISON].result,
            CheckResult::Consider
        );
    }

    #[tokio::test]
    async fn vendor_client_error_is_not_retried() {
        let router = Router::new().route(
            "/v3.6/checks/{id}",
            get(|| async { (StatusCode::NOT_FOUND, "{\"error\":\"no such check\"}") }),
        );
        let base_url = serve(router).await;
        let provider = OnfidoProvider::new(
            &OnfidoSettings {
                api_token: Some("t".to_string()),
                webhook_secret: None,
                base_url,
            },
            quick_policy(),
            false,
        )
        .unwrap();

        let err = provider.get_check("missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected { status: 404, .. }));
    }
}
