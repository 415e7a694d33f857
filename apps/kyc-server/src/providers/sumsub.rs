// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sumsub adapter.
//!
//! Every request is signed: `X-App-Access-Sig` is the hex HMAC-SHA256 of
//! `timestamp + METHOD + path_with_query + body` under the secret key.
//! Sumsub reviews applicants rather than discrete checks, so the check id is
//! the applicant id. Webhooks carry a lowercase hex digest in
//! `X-Payload-Digest`.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use super::http::{decode_json, MultipartBody, VendorHttp};
use super::retry::RawResponse;
use super::{
    hmac_sha256, parse_timestamp, simulation, split_name, verify_hmac_sha256, ApplicantProfile,
    ApplicantRecord, CheckRecord, DocumentUpload, ProviderError, ProviderKind, RetryPolicy,
    UploadedDocument, VerificationProvider,
};
use crate::models::{
    category, BreakdownEntry, CanonicalWebhookEvent, CheckResult, CheckStatus, CheckType,
    DocumentSide, DocumentType, VerificationReport,
};

pub const DEFAULT_API_BASE_URL: &str = "https://api.sumsub.com";
pub const DEFAULT_LEVEL_NAME: &str = "basic-kyc-level";
pub const SIGNATURE_HEADER: &str = "X-Payload-Digest";

#[derive(Clone, Default)]
pub struct SumsubSettings {
    pub app_token: Option<String>,
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub level_name: String,
}

impl fmt::Debug for SumsubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SumsubSettings")
            .field("app_token", &self.app_token.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("base_url", &self.base_url)
            .field("level_name", &self.level_name)
            .finish()
    }
}

impl SumsubSettings {
    pub fn has_credentials(&self) -> bool {
        self.app_token.is_some() && self.secret_key.is_some()
    }
}

struct Live {
    http: VendorHttp,
    app_token: String,
    secret_key: String,
    level_name: String,
}

enum Mode {
    Live(Live),
    Simulated,
}

pub struct SumsubProvider {
    mode: Mode,
    webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicantResponse {
    id: String,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewResult {
    #[serde(default)]
    review_answer: Option<String>,
    #[serde(default)]
    review_reject_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    #[serde(default)]
    review_status: Option<String>,
    #[serde(default)]
    review_result: Option<ReviewResult>,
    #[serde(default)]
    review_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload {
    #[serde(default)]
    applicant_id: Option<String>,
    #[serde(default, rename = "type")]
    event_type: Option<String>,
    #[serde(default)]
    review_status: Option<String>,
    #[serde(default)]
    review_result: Option<ReviewResult>,
    #[serde(default)]
    created_at_ms: Option<String>,
}

/// Hex signature over `ts + METHOD + path + body`.
pub fn sign_request(secret: &str, ts: i64, method: &Method, path: &str, body: &[u8]) -> String {
    let mut message = Vec::with_capacity(body.len() + path.len() + 24);
    message.extend_from_slice(ts.to_string().as_bytes());
    message.extend_from_slice(method.as_str().as_bytes());
    message.extend_from_slice(path.as_bytes());
    message.extend_from_slice(body);
    hex::encode(hmac_sha256(secret.as_bytes(), &message))
}

impl Live {
    /// Send a signed request; the signature is recomputed on every attempt.
    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Vec<u8>,
    ) -> Result<RawResponse, ProviderError> {
        let sign_method = method.clone();
        self.http
            .send(operation, method, path, |req: RequestBuilder| {
                let ts = Utc::now().timestamp();
                let signature = sign_request(&self.secret_key, ts, &sign_method, path, &body);
                let mut req = req
                    .header("X-App-Token", &self.app_token)
                    .header("X-App-Access-Ts", ts.to_string())
                    .header("X-App-Access-Sig", signature);
                if let Some(content_type) = content_type {
                    req = req.header(reqwest::header::CONTENT_TYPE, content_type);
                }
                if body.is_empty() {
                    req
                } else {
                    req.body(body.clone())
                }
            })
            .await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ProviderError> {
        let (content_type, bytes) = match body {
            Some(value) => (
                Some("application/json"),
                serde_json::to_vec(value).map_err(|e| {
                    ProviderError::invalid_response(ProviderKind::Sumsub, operation, e.to_string())
                })?,
            ),
            None => (None, Vec::new()),
        };
        let response = self
            .send(operation, method, path, content_type, bytes)
            .await?;
        decode_json(ProviderKind::Sumsub, operation, &response)
    }
}

impl SumsubProvider {
    pub fn new(
        settings: &SumsubSettings,
        policy: RetryPolicy,
        simulate: bool,
    ) -> Result<Self, ProviderError> {
        let mode = match (&settings.app_token, &settings.secret_key, simulate) {
            (Some(token), Some(secret), false) => Mode::Live(Live {
                http: VendorHttp::new(ProviderKind::Sumsub, &settings.base_url, policy)?,
                app_token: token.clone(),
                secret_key: secret.clone(),
                level_name: settings.level_name.clone(),
            }),
            _ => Mode::Simulated,
        };
        Ok(Self {
            mode,
            webhook_secret: settings.webhook_secret.clone(),
        })
    }
}

#[async_trait]
impl VerificationProvider for SumsubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sumsub
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
        let Mode::Live(live) = &self.mode else {
            return Ok(simulation::applicant(ProviderKind::Sumsub));
        };

        let (first_name, last_name) = split_name(&profile.legal_name);
        let mut fixed_info = json!({ "firstName": first_name, "lastName": last_name });
        if let Some(address) = &profile.address {
            fixed_info["country"] = json!(address.country);
            fixed_info["addresses"] = json!([{
                "street": address.line1,
                "subStreet": address.line2,
                "town": address.city,
                "state": address.region,
                "postCode": address.postal_code,
                "country": address.country,
            }]);
        }
        let body = json!({
            "externalUserId": profile.external_id,
            "email": profile.email,
            "fixedInfo": fixed_info,
        });

        let level: String =
            url::form_urlencoded::byte_serialize(live.level_name.as_bytes()).collect();
        let path = format!("/resources/applicants?levelName={level}");
        let created: ApplicantResponse = live
            .send_json("create_applicant", Method::POST, &path, Some(&body))
            .await?;

        Ok(ApplicantRecord {
            href: live
                .http
                .url(&format!("/resources/applicants/{}/one", created.id)),
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
        let Mode::Live(live) = &self.mode else {
            return Ok(simulation::document(ProviderKind::Sumsub));
        };

        let mut metadata = json!({ "idDocType": document_type(document.document_type) });
        if let Some(side) = document.side {
            metadata["idDocSubType"] = json!(document_side(side));
        }
        let (content_type, bytes) = MultipartBody::new()
            .text("metadata", &metadata.to_string())
            .file(
                "content",
                &document.file_name,
                &document.content_type,
                &document.bytes,
            )
            .finish();

        let path = format!("/resources/applicants/{applicant_id}/info/idDoc");
        let response = live
            .send(
                "upload_document",
                Method::POST,
                &path,
                Some(content_type.as_str()),
                bytes,
            )
            .await?;

        let image_id = response
            .header("x-image-id")
            .map(str::to_string)
            .or_else(|| {
                serde_json::from_slice::<Value>(&response.body)
                    .ok()
                    .and_then(|v| v.get("imageId").map(value_to_id))
            })
            .ok_or_else(|| {
                ProviderError::invalid_response(
                    ProviderKind::Sumsub,
                    "upload_document",
                    "missing X-Image-Id",
                )
            })?;

        Ok(UploadedDocument {
            href: live.http.url(&format!("/resources/images/{image_id}")),
            id: image_id,
        })
    }

    async fn create_check(
        &self,
        applicant_id: &str,
        _check_types: &[CheckType],
    ) -> Result<CheckRecord, ProviderError> {
        let Mode::Live(live) = &self.mode else {
            return Ok(simulation::check());
        };

        // Check types are fixed by the applicant level; requesting review
        // starts the verification.
        let path = format!("/resources/applicants/{applicant_id}/status/pending");
        live.send("create_check", Method::POST, &path, None, Vec::new())
            .await?;

        Ok(CheckRecord {
            id: applicant_id.to_string(),
            status: CheckStatus::InProgress,
            created_at: Utc::now(),
        })
    }

    async fn get_check(&self, check_id: &str) -> Result<VerificationReport, ProviderError> {
        let Mode::Live(live) = &self.mode else {
            return Ok(simulation::completed_report(
                check_id,
                None,
                &[CheckType::Document],
            ));
        };

        let status: StatusResponse = live
            .send_json(
                "get_check",
                Method::GET,
                &format!("/resources/applicants/{check_id}/status"),
                None,
            )
            .await?;
        let docs: BTreeMap<String, Value> = live
            .send_json(
                "get_check",
                Method::GET,
                &format!("/resources/applicants/{check_id}/requiredIdDocsStatus"),
                None,
            )
            .await?;

        Ok(VerificationReport {
            check_id: check_id.to_string(),
            applicant_id: Some(check_id.to_string()),
            status: status
                .review_status
                .as_deref()
                .map(map_review_status)
                .unwrap_or(CheckStatus::Pending),
            result: status.review_result.as_ref().and_then(map_review_result),
            breakdown: breakdown_from_doc_sets(&docs),
            completed_at: status.review_date.as_deref().and_then(parse_timestamp),
        })
    }

    async fn cancel_check(&self, check_id: &str) -> Result<(), ProviderError> {
        let Mode::Live(live) = &self.mode else {
            return Ok(());
        };
        let path = format!("/resources/applicants/{check_id}/reset");
        live.send("cancel_check", Method::POST, &path, None, Vec::new())
            .await?;
        Ok(())
    }

    async fn document_download_url(&self, document_id: &str) -> Result<String, ProviderError> {
        match &self.mode {
            Mode::Live(live) => Ok(live.http.url(&format!("/resources/images/{document_id}"))),
            Mode::Simulated => Ok(simulation::download_url(ProviderKind::Sumsub, document_id)),
        }
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str, secret: &str) -> bool {
        let signature = signature.trim();
        if signature.is_empty()
            || !signature
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return false;
        }
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        verify_hmac_sha256(secret, payload, &expected)
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<CanonicalWebhookEvent, ProviderError> {
        let parsed: WebhookPayload = serde_json::from_slice(payload)
            .map_err(|e| ProviderError::invalid_webhook(ProviderKind::Sumsub, e.to_string()))?;

        let event_type = parsed.event_type.unwrap_or_else(|| "unknown".to_string());
        let status = match parsed.review_status.as_deref() {
            Some(raw) => map_review_status(raw),
            None if event_type == "applicantReviewed" => CheckStatus::Complete,
            None => CheckStatus::Pending,
        };

        Ok(CanonicalWebhookEvent {
            event_type,
            check_id: parsed.applicant_id.clone(),
            applicant_id: parsed.applicant_id,
            status,
            result: parsed.review_result.as_ref().and_then(map_review_result),
            breakdown: BTreeMap::new(),
            received_at: Utc::now(),
            occurred_at: parsed.created_at_ms.as_deref().and_then(parse_millis),
        })
    }
}

fn value_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sumsub's `createdAtMs` is a timestamp string such as `2026-03-01 10:00:00.123`.
fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(raw).or_else(|| {
        chrono::NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    })
}

pub fn document_type(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Passport => "PASSPORT",
        DocumentType::DrivingLicence => "DRIVERS",
        DocumentType::NationalId => "ID_CARD",
        DocumentType::ProofOfAddress => "UTILITY_BILL",
    }
}

fn document_side(side: DocumentSide) -> &'static str {
    match side {
        DocumentSide::Front => "FRONT_SIDE",
        DocumentSide::Back => "BACK_SIDE",
    }
}

fn doc_set_category(doc_set: &str) -> Option<&'static str> {
    match doc_set {
        "IDENTITY" => Some(category::DOCUMENT_AUTHENTICITY),
        "SELFIE" => Some(category::FACE_COMPARISON),
        "PROOF_OF_RESIDENCE" => Some(category::ADDRESS_VERIFICATION),
        "COMPANY" => Some(category::IDENTITY_RECORD),
        _ => None,
    }
}

fn breakdown_from_doc_sets(docs: &BTreeMap<String, Value>) -> BTreeMap<String, BreakdownEntry> {
    docs.iter()
        .filter_map(|(doc_set, raw)| {
            let name = doc_set_category(doc_set)?;
            let review: ReviewResult = raw
                .get("reviewResult")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            let result = map_review_result(&review).unwrap_or(CheckResult::Unidentified);
            Some((name.to_string(), BreakdownEntry::new(result, raw.clone())))
        })
        .collect()
}

pub fn map_review_status(raw_status: &str) -> CheckStatus {
    match raw_status.trim() {
        "init" => CheckStatus::Pending,
        "pending" | "queued" | "prechecked" => CheckStatus::InProgress,
        "onHold" | "awaitingUser" => CheckStatus::AwaitingApplicant,
        "completed" => CheckStatus::Complete,
        _ => CheckStatus::Pending,
    }
}

fn map_review_result(review: &ReviewResult) -> Option<CheckResult> {
    let answer = review.review_answer.as_deref()?;
    Some(map_review_answer(
        answer,
        review.review_reject_type.as_deref(),
    ))
}

pub fn map_review_answer(answer: &str, reject_type: Option<&str>) -> CheckResult {
    match (answer.trim().to_ascii_uppercase().as_str(), reject_type) {
        ("GREEN", _) => CheckResult::Clear,
        ("YELLOW", _) => CheckResult::Consider,
        ("RED", Some(t)) if t.eq_ignore_ascii_case("RETRY") => CheckResult::Consider,
        _ => CheckResult::Unidentified,
    }
}
