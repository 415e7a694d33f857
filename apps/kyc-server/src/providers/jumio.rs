// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Jumio (KYX platform) adapter.
//!
//! HTTP basic auth with the API token and secret. An applicant is a Jumio
//! *account*; a check is a *workflow execution*. Webhooks carry
//! `sha256=<hex>` in `X-Jumio-Signature`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::{MultipartBody, VendorHttp};
use super::{
    parse_timestamp, simulation, verify_hmac_sha256, ApplicantProfile, ApplicantRecord,
    CheckRecord, DocumentUpload, ProviderError, ProviderKind, RetryPolicy, UploadedDocument,
    VerificationProvider,
};
use crate::models::{
    category, BreakdownEntry, CanonicalWebhookEvent, CheckResult, CheckStatus, CheckType,
    DocumentSide, DocumentType, VerificationReport,
};

pub const DEFAULT_API_BASE_URL: &str = "https://account.amer-1.jumio.ai";
pub const SIGNATURE_HEADER: &str = "X-Jumio-Signature";
const SIGNATURE_PREFIX: &str = "sha256=";
const API_PREFIX: &str = "/api/v1";

/// Workflow definition used for business verification.
const WORKFLOW_DEFINITION_KEY: u32 = 10013;

#[derive(Clone, Default)]
pub struct JumioSettings {
    pub api_token: Option<String>,
    pub api_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
}

impl fmt::Debug for JumioSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JumioSettings")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl JumioSettings {
    pub fn has_credentials(&self) -> bool {
        self.api_token.is_some() && self.api_secret.is_some()
    }
}

enum Mode {
    Live {
        http: VendorHttp,
        api_token: String,
        api_secret: String,
    },
    Simulated,
}

pub struct JumioProvider {
    mode: Mode,
    webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    account: IdOnly,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowResponse {
    workflow_execution: WorkflowExecution,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowExecution {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    decision: Option<Decision>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Decision {
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsResponse {
    workflow: WorkflowExecution,
    #[serde(default)]
    account: Option<IdOnly>,
    #[serde(default)]
    decision: Option<Decision>,
    #[serde(default)]
    capabilities: BTreeMap<String, Value>,
    #[serde(default)]
    completed_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    #[serde(default)]
    callback_sent_at: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    workflow_execution: WorkflowExecution,
    #[serde(default)]
    account: Option<IdOnly>,
}

impl JumioProvider {
    pub fn new(
        settings: &JumioSettings,
        policy: RetryPolicy,
        simulate: bool,
    ) -> Result<Self, ProviderError> {
        let mode = match (&settings.api_token, &settings.api_secret, simulate) {
            (Some(token), Some(secret), false) => Mode::Live {
                http: VendorHttp::new(ProviderKind::Jumio, &settings.base_url, policy)?,
                api_token: token.clone(),
                api_secret: secret.clone(),
            },
            _ => Mode::Simulated,
        };
        Ok(Self {
            mode,
            webhook_secret: settings.webhook_secret.clone(),
        })
    }
}

#[async_trait]
impl VerificationProvider for JumioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Jumio
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
        let Mode::Live {
            http,
            api_token,
            api_secret,
        } = &self.mode
        else {
            return Ok(simulation::applicant(ProviderKind::Jumio));
        };

        let body = json!({
            "customerInternalReference": profile.external_id,
            "userReference": profile.email,
            "workflowDefinition": { "key": WORKFLOW_DEFINITION_KEY },
        });
        let path = format!("{API_PREFIX}/accounts");
        let created: AccountResponse = http
            .send_json("create_applicant", Method::POST, &path, |req| {
                req.basic_auth(api_token, Some(api_secret)).json(&body)
            })
            .await?;

        Ok(ApplicantRecord {
            href: http.url(&format!("{API_PREFIX}/accounts/{}", created.account.id)),
            created_at: created
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
            id: created.account.id,
        })
    }

    async fn upload_document(
        &self,
        applicant_id: &str,
        document: &DocumentUpload,
    ) -> Result<UploadedDocument, ProviderError> {
        let Mode::Live {
            http,
            api_token,
            api_secret,
        } = &self.mode
        else {
            return Ok(simulation::document(ProviderKind::Jumio));
        };

        let mut form = MultipartBody::new().text("type", document_type(document.document_type));
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

        let path = format!("{API_PREFIX}/accounts/{applicant_id}/documents");
        let uploaded: IdOnly = http
            .send_json("upload_document", Method::POST, &path, |req| {
                req.basic_auth(api_token, Some(api_secret))
                    .header(reqwest::header::CONTENT_TYPE, &content_type)
                    .body(bytes.clone())
            })
            .await?;

        Ok(UploadedDocument {
            href: http.url(&format!("{API_PREFIX}/documents/{}", uploaded.id)),
            id: uploaded.id,
        })
    }

    async fn create_check(
        &self,
        applicant_id: &str,
        check_types: &[CheckType],
    ) -> Result<CheckRecord, ProviderError> {
        let Mode::Live {
            http,
            api_token,
            api_secret,
        } = &self.mode
        else {
            return Ok(simulation::check());
        };

        let capabilities: Vec<&str> = check_types
            .iter()
            .flat_map(|t| capabilities_for(*t))
            .copied()
            .collect();
        let body = json!({
            "workflowDefinition": {
                "key": WORKFLOW_DEFINITION_KEY,
                "capabilities": capabilities,
            },
        });
        let path = format!("{API_PREFIX}/accounts/{applicant_id}/workflow-executions");
        let created: WorkflowResponse = http
            .send_json("create_check", Method::POST, &path, |req| {
                req.basic_auth(api_token, Some(api_secret)).json(&body)
            })
            .await?;

        let id = created.workflow_execution.id.ok_or_else(|| {
            ProviderError::invalid_response(
                ProviderKind::Jumio,
                "create_check",
                "missing workflowExecution.id",
            )
        })?;
        Ok(CheckRecord {
            id,
            status: created
                .workflow_execution
                .status
                .as_deref()
                .map(map_check_status)
                .unwrap_or(CheckStatus::Pending),
            created_at: created
                .timestamp
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or_else(Utc::now),
        })
    }

    async fn get_check(&self, check_id: &str) -> Result<VerificationReport, ProviderError> {
        let Mode::Live {
            http,
            api_token,
            api_secret,
        } = &self.mode
        else {
            return Ok(simulation::completed_report(
                check_id,
                None,
                &[CheckType::Document],
            ));
        };

        let path = format!("{API_PREFIX}/workflow-executions/{check_id}");
        let details: DetailsResponse = http
            .send_json("get_check", Method::GET, &path, |req| {
                req.basic_auth(api_token, Some(api_secret))
            })
            .await?;

        let decision = details
            .decision
            .or(details.workflow.decision)
            .and_then(|d| d.kind);
        Ok(VerificationReport {
            check_id: details.workflow.id.unwrap_or_else(|| check_id.to_string()),
            applicant_id: details.account.map(|a| a.id),
            status: details
                .workflow
                .status
                .as_deref()
                .map(map_check_status)
                .unwrap_or(CheckStatus::Pending),
            result: decision.as_deref().map(map_decision),
            breakdown: breakdown_from_capabilities(&details.capabilities),
            completed_at: details.completed_at.as_deref().and_then(parse_timestamp),
        })
    }

    async fn cancel_check(&self, check_id: &str) -> Result<(), ProviderError> {
        let Mode::Live {
            http,
            api_token,
            api_secret,
        } = &self.mode
        else {
            return Ok(());
        };

        let path = format!("{API_PREFIX}/workflow-executions/{check_id}");
        http.send("cancel_check", Method::DELETE, &path, |req| {
            req.basic_auth(api_token, Some(api_secret))
        })
        .await?;
        Ok(())
    }

    async fn document_download_url(&self, document_id: &str) -> Result<String, ProviderError> {
        match &self.mode {
            Mode::Live { http, .. } => {
                Ok(http.url(&format!("{API_PREFIX}/documents/{document_id}/content")))
            }
            Mode::Simulated => Ok(simulation::download_url(ProviderKind::Jumio, document_id)),
        }
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        let Some(digest) = signature.trim().strip_prefix(SIGNATURE_PREFIX) else {
            return false;
        };
        let Ok(expected) = hex::decode(digest) else {
            return false;
        };
        verify_hmac_sha256(secret, payload, &expected)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
        let parsed: WebhookPayload = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::invalid_webhook(ProviderKind::Jumio, e.to_string()))?;

        let execution = parsed.workflow_execution;
        Ok(CanonicalWebhookEvent {
            event_type: parsed
                .event_type
                .unwrap_or_else(|| "WORKFLOW_EXECUTION_UPDATED".to_string()),
            check_id: execution.id,
            applicant_id: parsed.account.map(|a| a.id),
            status: execution
                .status
                .as_deref()
                .map(map_check_status)
                .unwrap_or(CheckStatus::Pending),
            result: execution
                .decision
                .and_then(|d| d.kind)
                .as_deref()
                .map(map_decision),
            breakdown: BTreeMap::new(),
            received_at: Utc::now(),
            occurred_at: parsed.callback_sent_at.as_deref().and_then(parse_timestamp),
        })
    }
}

pub fn document_type(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Passport => "PASSPORT",
        DocumentType::DrivingLicence => "DRIVING_LICENSE",
        DocumentType::NationalId => "ID_CARD",
        DocumentType::ProofOfAddress => "PROOF_OF_RESIDENCY",
    }
}

fn document_side(side: DocumentSide) -> &'static str {
    match side {
        DocumentSide::Front => "FRONT",
        DocumentSide::Back => "BACK",
    }
}

fn capabilities_for(check_type: CheckType) -> &'static [&'static str] {
    match check_type {
        CheckType::Document => &["extraction", "authentication"],
        CheckType::Identity => &["dataChecks", "watchlistScreening"],
        CheckType::FacialSimilarity => &["similarity", "liveness"],
        CheckType::ProofOfAddress => &["proofOfResidency"],
    }
}

fn capability_category(capability: &str) -> Option<&'static str> {
    match capability {
        "authentication" => Some(category::DOCUMENT_AUTHENTICITY),
        "similarity" => Some(category::FACE_COMPARISON),
        "liveness" => Some(category::LIVENESS_CHECK),
        "proofOfResidency" => Some(category::ADDRESS_VERIFICATION),
        "dataChecks" => Some(category::IDENTITY_RECORD),
        "watchlistScreening" => Some(category::WATCHLIST_SCREENING),
        _ => None,
    }
}

/// Each capability is a list of results; the worst decision wins.
fn breakdown_from_capabilities(
    capabilities: &BTreeMap<String, Value>,
) -> BTreeMap<String, BreakdownEntry> {
    capabilities
        .iter()
        .filter_map(|(name, raw)| {
            let category = capability_category(name)?;
            let decisions: Vec<CheckResult> = match raw {
                Value::Array(items) => items.iter().filter_map(decision_of).collect(),
                other => decision_of(other).into_iter().collect(),
            };
            let result = decisions
                .into_iter()
                .max_by_key(|r| severity(*r))
                .unwrap_or(CheckResult::Unidentified);
            Some((category.to_string(), BreakdownEntry::new(result, raw.clone())))
        })
        .collect()
}

fn decision_of(value: &Value) -> Option<CheckResult> {
    value
        .pointer("/decision/type")
        .and_then(Value::as_str)
        .map(map_decision)
}

fn severity(result: CheckResult) -> u8 {
    match result {
        CheckResult::Clear => 0,
        CheckResult::Consider => 1,
        CheckResult::Unidentified => 2,
    }
}

pub fn map_check_status(raw_status: &str) -> CheckStatus {
    match raw_status.trim().to_ascii_uppercase().as_str() {
        "INITIATED" => CheckStatus::Pending,
        "ACQUIRED" => CheckStatus::InProgress,
        "PROCESSED" => CheckStatus::Complete,
        "SESSION_EXPIRED" | "TOKEN_EXPIRED" => CheckStatus::Expired,
        "CANCELLED" | "DELETED" => CheckStatus::Cancelled,
        _ => CheckStatus::Pending,
    }
}

pub fn map_decision(raw_decision: &str) -> CheckResult {
    match raw_decision.trim().to_ascii_uppercase().as_str() {
        "PASSED" => CheckResult::Clear,
        "WARNING" => CheckResult::Consider,
        _ => CheckResult::Unidentified,
    }
}
