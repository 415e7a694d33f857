// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Verification Data Models
//!
//! Persisted record shapes for an organization's verification application
//! and the vendor-agnostic types exchanged with provider adapters.
//!
//! ## Model Categories
//!
//! - **Application**: [`VerificationApplication`] and its lifecycle status
//! - **Provider state**: the versioned, provider-scoped correlation record
//!   embedded in every application
//! - **Checks**: canonical check status/result vocabulary, breakdowns,
//!   reports and webhook events
//! - **API**: submission/review request bodies and the redacted read view

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::crypto::EncryptedField;
use crate::providers::ProviderKind;

/// Current layout version of [`ProviderState`].
pub const PROVIDER_STATE_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Application
// =============================================================================

/// Lifecycle status of a verification application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    NotStarted,
    DocumentsSubmitted,
    UnderReview,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    /// Every status value, in lifecycle order.
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::NotStarted,
        ApplicationStatus::DocumentsSubmitted,
        ApplicationStatus::UnderReview,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    /// Terminal statuses are retained for audit; no outcome moves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::DocumentsSubmitted => "DOCUMENTS_SUBMITTED",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of tax identifier the organization submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdType {
    Ein,
    Ssn,
    Itin,
    Vat,
    CompanyRegistration,
}

/// Postal address of the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PostalAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-3 country code.
    pub country: String,
}

/// Sensitive scalars, stored only in encrypted form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<EncryptedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<EncryptedField>,
}

/// One organization's verification application.
///
/// At most one record exists per organization; terminal records are kept
/// and reused on resubmission rather than deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationApplication {
    pub id: String,
    pub organization_id: String,
    pub id_type: IdType,
    pub status: ApplicationStatus,
    pub legal_name: String,
    pub contact_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<PostalAddress>,
    #[serde(default)]
    pub sensitive: SensitiveFields,
    /// Set only after at least one completed check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_score: Option<f64>,
    pub id_verified: bool,
    pub address_verified: bool,
    pub business_verified: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Set only when the application becomes `APPROVED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub provider_state: ProviderState,
    /// Optimistic concurrency counter, bumped by every persisted update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Provider State
// =============================================================================

/// Vendor-side correlation record for the applicant. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderApplicant {
    pub id: String,
    pub href: String,
    pub created_at: DateTime<Utc>,
}

/// Versioned, provider-scoped correlation state of an application.
///
/// Every id recorded here belongs to `provider`; events from any other
/// provider are refused rather than folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderState {
    pub schema_version: u32,
    pub provider: ProviderKind,
    /// True when the adapter ran without vendor access. Decisions made in
    /// this mode are synthetic.
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant: Option<ProviderApplicant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<VerificationCheck>,
    #[serde(default)]
    pub documents: Vec<SubmittedDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_webhook: Option<WebhookRecord>,
    /// Vendor timestamp of the newest event applied to this application,
    /// or the time of the latest manual review decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ProviderState {
    pub fn new(provider: ProviderKind, simulated: bool) -> Self {
        Self {
            schema_version: PROVIDER_STATE_SCHEMA_VERSION,
            provider,
            simulated,
            applicant: None,
            check: None,
            documents: Vec::new(),
            last_webhook: None,
            last_event_at: None,
        }
    }

    pub fn applicant_id(&self) -> Option<&str> {
        self.applicant.as_ref().map(|a| a.id.as_str())
    }

    pub fn check_id(&self) -> Option<&str> {
        self.check.as_ref().map(|c| c.id.as_str())
    }

    pub fn has_address_document(&self) -> bool {
        self.documents
            .iter()
            .any(|doc| doc.document_type == DocumentType::ProofOfAddress)
    }
}

/// One verification attempt tracked by the vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerificationCheck {
    pub id: String,
    pub status: CheckStatus,
    pub check_types: Vec<CheckType>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckResult>,
    #[serde(default)]
    pub breakdown: BTreeMap<String, BreakdownEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A document uploaded to the vendor. Both identifiers are encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedDocument {
    pub document_type: DocumentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<DocumentSide>,
    pub file_name: String,
    pub content_type: String,
    pub vendor_document_id: EncryptedField,
    pub storage_key: EncryptedField,
    pub uploaded_at: DateTime<Utc>,
}

/// Summary of the most recent webhook folded into the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebhookRecord {
    pub event_type: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckResult>,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
    /// False when the event was recorded without touching `status`.
    pub applied: bool,
    /// True when the event was older than the newest applied event.
    #[serde(default)]
    pub stale: bool,
}

// =============================================================================
// Documents and Checks
// =============================================================================

/// Closed set of document types accepted by every vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Passport,
    DrivingLicence,
    NationalId,
    ProofOfAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentSide {
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckType {
    Document,
    Identity,
    FacialSimilarity,
    ProofOfAddress,
}

/// Canonical check status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pending,
    InProgress,
    AwaitingApplicant,
    Complete,
    Cancelled,
    Expired,
}

impl CheckStatus {
    pub fn is_complete(self) -> bool {
        self == Self::Complete
    }

    /// The vendor will not move the check any further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Expired)
    }
}

/// Canonical check (or breakdown category) result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckResult {
    Clear,
    Consider,
    Unidentified,
}

impl CheckResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::Consider => "CONSIDER",
            Self::Unidentified => "UNIDENTIFIED",
        }
    }
}

/// Breakdown category keys shared by all adapters.
pub mod category {
    pub const DOCUMENT_AUTHENTICITY: &str = "documentAuthenticity";
    pub const FACE_COMPARISON: &str = "faceComparison";
    pub const LIVENESS_CHECK: &str = "livenessCheck";
    pub const ADDRESS_VERIFICATION: &str = "addressVerification";
    pub const IDENTITY_RECORD: &str = "identityRecord";
    pub const WATCHLIST_SCREENING: &str = "watchlistScreening";
}

/// One category of a check breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BreakdownEntry {
    pub result: CheckResult,
    /// Vendor payload for the category, kept verbatim.
    #[schema(value_type = Object)]
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl BreakdownEntry {
    pub fn new(result: CheckResult, raw: serde_json::Value) -> Self {
        Self { result, raw }
    }
}

/// Normalized result of polling a vendor check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub check_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_id: Option<String>,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckResult>,
    #[serde(default)]
    pub breakdown: BTreeMap<String, BreakdownEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Vendor-agnostic asynchronous verification update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalWebhookEvent {
    /// Raw vendor event name, kept for the audit trail.
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_id: Option<String>,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CheckResult>,
    #[serde(default)]
    pub breakdown: BTreeMap<String, BreakdownEntry>,
    pub received_at: DateTime<Utc>,
    /// The vendor's own timestamp, used to order events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl CanonicalWebhookEvent {
    /// Wrap a polled report so it can share the webhook ingestion path.
    pub fn from_report(report: VerificationReport, event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            check_id: Some(report.check_id),
            applicant_id: report.applicant_id,
            status: report.status,
            result: report.result,
            breakdown: report.breakdown,
            received_at: Utc::now(),
            occurred_at: report.completed_at,
        }
    }

    /// Same event as a report, for scoring.
    pub fn to_report(&self) -> VerificationReport {
        VerificationReport {
            check_id: self.check_id.clone().unwrap_or_default(),
            applicant_id: self.applicant_id.clone(),
            status: self.status,
            result: self.result,
            breakdown: self.breakdown.clone(),
            completed_at: self.occurred_at,
        }
    }
}

// =============================================================================
// API Models
// =============================================================================

/// Request body for submitting (or resubmitting) an application.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ApplicationSubmission {
    pub id_type: IdType,
    pub legal_name: String,
    pub contact_email: String,
    #[serde(default)]
    pub address: Option<PostalAddress>,
    /// Cleartext tax identifier; encrypted before it is stored.
    pub tax_id: String,
    #[serde(default)]
    pub registration_number: Option<String>,
}

/// Manual reviewer decision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
    RequestMoreInfo,
}

/// Redacted read model of an application. Sensitive values are masked.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApplicationView {
    pub id: String,
    pub organization_id: String,
    pub id_type: IdType,
    pub status: ApplicationStatus,
    pub legal_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_score: Option<f64>,
    pub id_verified: bool,
    pub address_verified: bool,
    pub business_verified: bool,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub provider: ProviderKind,
    pub simulated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant: Option<ProviderApplicant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<VerificationCheck>,
    pub documents: Vec<DocumentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id_masked: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_number_masked: Option<String>,
}

/// Submitted document as exposed to readers (no identifiers).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DocumentView {
    pub document_type: DocumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<DocumentSide>,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&SubmittedDocument> for DocumentView {
    fn from(doc: &SubmittedDocument) -> Self {
        Self {
            document_type: doc.document_type,
            side: doc.side,
            file_name: doc.file_name.clone(),
            uploaded_at: doc.uploaded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&ApplicationStatus::DocumentsSubmitted).unwrap();
        assert_eq!(json, "\"DOCUMENTS_SUBMITTED\"");
        let parsed: ApplicationStatus = serde_json::from_str("\"UNDER_REVIEW\"").unwrap();
        assert_eq!(parsed, ApplicationStatus::UnderReview);
    }

    #[test]
    fn status_display_matches_wire_name() {
        for status in ApplicationStatus::ALL {
            let wire = serde_json::to_string(&status).unwrap();
            assert_eq!(wire.trim_matches('"'), status.to_string());
        }
    }

    #[test]
    fn provider_state_reports_address_document() {
        let mut state = ProviderState::new(ProviderKind::Onfido, true);
        assert!(!state.has_address_document());
        state.documents.push(SubmittedDocument {
            document_type: DocumentType::ProofOfAddress,
            side: None,
            file_name: "bill.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            vendor_document_id: EncryptedField::default(),
            storage_key: EncryptedField::default(),
            uploaded_at: Utc::now(),
        });
        assert!(state.has_address_document());
    }

    #[test]
    fn review_decision_parses_tagged_json() {
        let decision: ReviewDecision =
            serde_json::from_str(r#"{"decision":"reject","reason":"blurry"}"#).unwrap();
        assert_eq!(
            decision,
            ReviewDecision::Reject {
                reason: "blurry".to_string()
            }
        );
        let decision: ReviewDecision =
            serde_json::from_str(r#"{"decision":"request_more_info"}"#).unwrap();
        assert_eq!(decision, ReviewDecision::RequestMoreInfo);
    }

    #[test]
    fn event_round_trips_through_report() {
        let report = VerificationReport {
            check_id: "chk_1".to_string(),
            applicant_id: Some("app_1".to_string()),
            status: CheckStatus::Complete,
            result: Some(CheckResult::Clear),
            breakdown: BTreeMap::new(),
            completed_at: None,
        };
        let event = CanonicalWebhookEvent::from_report(report.clone(), "check.polled");
        assert_eq!(event.to_report(), report);
    }
}
